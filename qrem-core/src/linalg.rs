//! Dense linear-algebra kernels for calibration inversion
//!
//! Assignment matrices are small by construction (`2^n x 2^n` for the
//! complete model, `2^{|g|} x 2^{|g|}` per group for the tensored model),
//! so the routines here are direct dense implementations with no BLAS or
//! LAPACK dependency.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

/// Pivot magnitude below which a matrix is treated as exactly singular.
pub const SINGULARITY_THRESHOLD: f64 = 1e-12;

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// Returns `None` when a pivot falls below [`SINGULARITY_THRESHOLD`];
/// callers decide between failing and switching to a regularized
/// pseudo-inverse.
pub fn invert(matrix: ArrayView2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    debug_assert_eq!(n, matrix.ncols());

    // Augmented [A | I]
    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    aug.slice_mut(s![.., ..n]).assign(&matrix);
    for i in 0..n {
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if aug[[row, col]].abs() > aug[[pivot_row, col]].abs() {
                pivot_row = row;
            }
        }
        if aug[[pivot_row, col]].abs() < SINGULARITY_THRESHOLD {
            return None;
        }
        if pivot_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..2 * n {
                aug[[row, j]] -= factor * aug[[col, j]];
            }
        }
    }

    Some(aug.slice(s![.., n..]).to_owned())
}

/// Tikhonov-regularized pseudo-inverse `(AᵀA + λI)⁻¹ Aᵀ`.
///
/// Used as the fallback when `A` is exactly singular; for invertible `A`
/// and λ → 0 it coincides with `A⁻¹`. The normal matrix is positive
/// definite for λ > 0, so this only returns `None` in pathological
/// floating-point corner cases.
pub fn ridge_pseudo_inverse(matrix: ArrayView2<f64>, lambda: f64) -> Option<Array2<f64>> {
    let transpose = matrix.t();
    let mut normal = transpose.dot(&matrix);
    for i in 0..normal.nrows() {
        normal[[i, i]] += lambda;
    }
    let inverse = invert(normal.view())?;
    Some(inverse.dot(&transpose))
}

/// Apply one Kronecker factor to a joint vector.
///
/// The joint index space factors as `dim_left x d x dim_right` with the
/// `d x d` factor acting on the middle axis:
/// `index = (left * d + mid) * dim_right + right`. Applying every factor of
/// `A_1 ⊗ … ⊗ A_m` in sequence realizes the full product in
/// O(dim * Σ 2^{|g|}) work without ever materializing it.
pub fn apply_factor(
    vector: ArrayView1<f64>,
    matrix: ArrayView2<f64>,
    dim_left: usize,
    dim_right: usize,
) -> Array1<f64> {
    let d = matrix.nrows();
    debug_assert_eq!(vector.len(), dim_left * d * dim_right);

    let mut out = Array1::zeros(vector.len());
    let mut slice = vec![0.0; d];
    for left in 0..dim_left {
        let block = left * d * dim_right;
        for right in 0..dim_right {
            let base = block + right;
            for k in 0..d {
                slice[k] = vector[base + k * dim_right];
            }
            for i in 0..d {
                let row = matrix.row(i);
                let mut acc = 0.0;
                for k in 0..d {
                    acc += row[k] * slice[k];
                }
                out[base + i * dim_right] = acc;
            }
        }
    }
    out
}

/// Maximum absolute column sum.
pub fn one_norm(matrix: ArrayView2<f64>) -> f64 {
    let mut norm = 0.0f64;
    for col in matrix.columns() {
        let sum: f64 = col.iter().map(|v| v.abs()).sum();
        norm = norm.max(sum);
    }
    norm
}

/// Maximum absolute row sum.
pub fn inf_norm(matrix: ArrayView2<f64>) -> f64 {
    let mut norm = 0.0f64;
    for row in matrix.rows() {
        let sum: f64 = row.iter().map(|v| v.abs()).sum();
        norm = norm.max(sum);
    }
    norm
}

/// Euclidean projection onto the scaled simplex `{x : x >= 0, Σx = total}`.
///
/// Sort-and-threshold rule: with entries sorted descending, the projection
/// is `max(x_i - θ, 0)` for the unique shift θ that makes the result sum to
/// `total`.
pub fn project_onto_scaled_simplex(vector: ArrayView1<f64>, total: f64) -> Array1<f64> {
    if total <= 0.0 {
        return Array1::zeros(vector.len());
    }

    let mut sorted: Vec<f64> = vector.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (j, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - total) / (j + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }

    vector.mapv(|x| (x - theta).max(0.0))
}
