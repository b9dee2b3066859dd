//! Correction filter: map raw counts to a corrected estimate
//!
//! Applies a previously fitted assignment-error model to observed counts
//! with one of two methods:
//!
//! - pseudo-inverse, `P_est = A⁻¹ · P̃`: exact for invertible noiseless
//!   calibration, may produce negative entries under statistical noise
//! - constrained least-squares, `argmin ‖P̃ − A·P‖₂` over `P ≥ 0` with
//!   `ΣP` fixed to the raw total: always physical
//!
//! For tensored models both methods work factor by factor and never
//! materialize the Kronecker-product matrix.

use crate::counts::{self, Counts};
use crate::error::{MitigationError, Result};
use crate::linalg;
use crate::model::{FittedModel, MitigationWarning};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Ridge parameter of the regularized fallback used when a calibration
/// matrix is exactly singular
pub const PINV_RIDGE_LAMBDA: f64 = 1e-10;

/// Default iteration cap for the least-squares solver
pub const DEFAULT_LSQ_MAX_ITERATIONS: usize = 10_000;

/// Default convergence tolerance on the least-squares objective change
pub const DEFAULT_LSQ_TOLERANCE: f64 = 1e-10;

// =============================================================================
// Method Selection
// =============================================================================

/// Correction method, selectable per call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionMethod {
    /// Exact (or regularized) inversion; preserves negative entries
    PseudoInverse,
    /// Projected-gradient solve of the constrained problem; always
    /// returns a non-negative vector with the input's total
    ConstrainedLeastSquares,
}

impl CorrectionMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CorrectionMethod::PseudoInverse => "pseudo_inverse",
            CorrectionMethod::ConstrainedLeastSquares => "least_squares",
        }
    }
}

/// Tuning knobs for the constrained least-squares solver
#[derive(Debug, Clone, Copy)]
pub struct LeastSquaresConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for LeastSquaresConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_LSQ_MAX_ITERATIONS,
            tolerance: DEFAULT_LSQ_TOLERANCE,
        }
    }
}

impl LeastSquaresConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

// =============================================================================
// Correction Filter
// =============================================================================

/// Cached inverse of one calibration factor.
///
/// `exact` records whether plain inversion succeeded; when it did not, the
/// matrix holds the ridge-regularized pseudo-inverse instead.
#[derive(Debug, Clone)]
struct FactorInverse {
    exact: bool,
    matrix: Option<Array2<f64>>,
}

fn invert_factor(matrix: &Array2<f64>) -> FactorInverse {
    match linalg::invert(matrix.view()) {
        Some(inverse) => FactorInverse {
            exact: true,
            matrix: Some(inverse),
        },
        None => FactorInverse {
            exact: false,
            matrix: linalg::ridge_pseudo_inverse(matrix.view(), PINV_RIDGE_LAMBDA),
        },
    }
}

#[derive(Debug, Clone)]
enum InverseCache {
    Complete(FactorInverse),
    Tensored(Vec<FactorInverse>),
}

/// Corrects observed counts through a fitted model
#[derive(Debug)]
pub struct CorrectionFilter<'m> {
    model: &'m FittedModel,
    pinv_fallback: bool,
    lsq: LeastSquaresConfig,
    inverses: InverseCache,
}

impl<'m> CorrectionFilter<'m> {
    /// Build a filter over a fitted model, precomputing factor inverses.
    ///
    /// Singular factors do not fail here; the pseudo-inverse path reports
    /// them at apply time unless the regularized fallback (on by default)
    /// covers them.
    pub fn new(model: &'m FittedModel) -> Self {
        let inverses = match model {
            FittedModel::Complete(cal) => InverseCache::Complete(invert_factor(cal.matrix())),
            FittedModel::Tensored(cal) => InverseCache::Tensored(
                cal.groups()
                    .iter()
                    .map(|group| invert_factor(group.matrix()))
                    .collect(),
            ),
        };
        Self {
            model,
            pinv_fallback: true,
            lsq: LeastSquaresConfig::default(),
            inverses,
        }
    }

    /// Enable or disable the ridge fallback for singular calibration on the
    /// pseudo-inverse path
    pub fn with_pseudo_inverse_fallback(mut self, enabled: bool) -> Self {
        self.pinv_fallback = enabled;
        self
    }

    pub fn with_least_squares_config(mut self, config: LeastSquaresConfig) -> Self {
        self.lsq = config;
        self
    }

    /// The fitted model this filter corrects against
    pub fn model(&self) -> &FittedModel {
        self.model
    }

    /// Correct a counts mapping.
    ///
    /// Fails with [`MitigationError::DimensionMismatch`] when the labels'
    /// width (in qubits) differs from the model's.
    pub fn apply(&self, raw: &Counts, method: CorrectionMethod) -> Result<MitigationResult> {
        if let Some(width) = counts::infer_width(raw)? {
            if width != self.model.n_qubits() {
                return Err(MitigationError::DimensionMismatch {
                    expected: self.model.n_qubits(),
                    actual: width,
                });
            }
        }
        let vector = counts::counts_to_vector(raw, self.model.n_qubits())?;
        self.apply_vector(vector.view(), method)
    }

    /// Correct a dense counts vector indexed by basis-state value.
    ///
    /// Fails with [`MitigationError::DimensionMismatch`] when the vector
    /// length differs from the model's basis dimension.
    pub fn apply_vector(
        &self,
        raw: ArrayView1<f64>,
        method: CorrectionMethod,
    ) -> Result<MitigationResult> {
        if raw.len() != self.model.dimension() {
            return Err(MitigationError::DimensionMismatch {
                expected: self.model.dimension(),
                actual: raw.len(),
            });
        }
        let total = raw.sum();
        match method {
            CorrectionMethod::PseudoInverse => self.apply_pseudo_inverse(raw, total),
            CorrectionMethod::ConstrainedLeastSquares => self.apply_least_squares(raw, total),
        }
    }

    /// Correct a batch of experiments in parallel.
    ///
    /// Results come back in input order; an error aborts the batch.
    pub fn apply_batch(
        &self,
        batch: &[Counts],
        method: CorrectionMethod,
    ) -> Result<Vec<MitigationResult>> {
        batch.par_iter().map(|raw| self.apply(raw, method)).collect()
    }

    // ===== pseudo-inverse path =====

    fn apply_pseudo_inverse(&self, raw: ArrayView1<f64>, total: f64) -> Result<MitigationResult> {
        let corrected = match &self.inverses {
            InverseCache::Complete(factor) => {
                let inverse = self.usable_inverse(factor, "complete model")?;
                inverse.dot(&raw)
            }
            InverseCache::Tensored(factors) => {
                // apply each group's inverse on its own axis of the joint
                // index space; the full product matrix never exists
                let dim = self.model.dimension();
                let mut vector = raw.to_owned();
                let mut dim_left = 1;
                for (g, factor) in factors.iter().enumerate() {
                    let inverse = self.usable_inverse(factor, &format!("group {g}"))?;
                    let d = inverse.nrows();
                    let dim_right = dim / (dim_left * d);
                    vector =
                        linalg::apply_factor(vector.view(), inverse.view(), dim_left, dim_right);
                    dim_left *= d;
                }
                vector
            }
        };
        Ok(self.finish(
            corrected,
            CorrectionMethod::PseudoInverse,
            total,
            None,
            None,
            None,
        ))
    }

    fn usable_inverse<'a>(
        &'a self,
        factor: &'a FactorInverse,
        what: &str,
    ) -> Result<&'a Array2<f64>> {
        if !factor.exact && !self.pinv_fallback {
            return Err(MitigationError::SingularCalibration(format!(
                "{what} is not invertible and the regularized fallback is disabled"
            )));
        }
        factor.matrix.as_ref().ok_or_else(|| {
            MitigationError::SingularCalibration(format!("{what} admits no regularized inverse"))
        })
    }

    // ===== constrained least-squares path =====

    /// Projected gradient descent on the scaled probability simplex.
    ///
    /// Solved in probability space (`b = raw / total`) with step `1/L`,
    /// `L = ‖A‖₁‖A‖∞ ≥ λ_max(AᵀA)`, projecting onto `{x ≥ 0, Σx = 1}`
    /// after every step. Converges when the objective change drops below
    /// the configured tolerance; otherwise the best feasible iterate seen
    /// is returned with an iteration-cap warning.
    fn apply_least_squares(&self, raw: ArrayView1<f64>, total: f64) -> Result<MitigationResult> {
        if total <= 0.0 {
            // no observations to redistribute
            let corrected = Array1::zeros(raw.len());
            return Ok(self.finish(
                corrected,
                CorrectionMethod::ConstrainedLeastSquares,
                total,
                Some(0.0),
                Some(0),
                Some(true),
            ));
        }

        let operator = self.operator();
        let b = raw.mapv(|v| v / total);
        let lipschitz = operator.lipschitz();
        let step = if lipschitz > 0.0 { 1.0 / lipschitz } else { 0.0 };

        let mut x = linalg::project_onto_scaled_simplex(b.view(), 1.0);
        let mut residual = &operator.forward(x.view()) - &b;
        let mut objective = 0.5 * residual.dot(&residual);
        let mut best_objective = objective;
        let mut best_x = x.clone();
        let mut iterations = 0;
        let mut converged = false;

        for iteration in 1..=self.lsq.max_iterations {
            iterations = iteration;
            let gradient = operator.adjoint(residual.view());
            let stepped = &x - &(&gradient * step);
            x = linalg::project_onto_scaled_simplex(stepped.view(), 1.0);
            residual = &operator.forward(x.view()) - &b;
            let new_objective = 0.5 * residual.dot(&residual);
            if new_objective < best_objective {
                best_objective = new_objective;
                best_x.assign(&x);
            }
            if (objective - new_objective).abs() < self.lsq.tolerance {
                converged = true;
                break;
            }
            objective = new_objective;
        }

        let corrected = best_x.mapv(|v| v * total);
        let residual_norm = (2.0 * best_objective).sqrt() * total;
        let mut result = self.finish(
            corrected,
            CorrectionMethod::ConstrainedLeastSquares,
            total,
            Some(residual_norm),
            Some(iterations),
            Some(converged),
        );
        if !converged {
            result
                .warnings
                .push(MitigationWarning::IterationCap { iterations });
        }
        Ok(result)
    }

    fn operator(&self) -> Operator<'_> {
        match self.model {
            FittedModel::Complete(cal) => Operator::Dense(cal.matrix()),
            FittedModel::Tensored(cal) => Operator::Factors(
                cal.groups().iter().map(|group| group.matrix()).collect(),
            ),
        }
    }

    fn finish(
        &self,
        vector: Array1<f64>,
        method: CorrectionMethod,
        total: f64,
        residual_norm: Option<f64>,
        iterations: Option<usize>,
        converged: Option<bool>,
    ) -> MitigationResult {
        let n_qubits = self.model.n_qubits();
        MitigationResult {
            counts: counts::vector_to_counts(vector.view(), n_qubits),
            negative_values: vector.iter().any(|&v| v < 0.0),
            vector,
            n_qubits,
            method,
            total,
            residual_norm,
            iterations,
            converged,
            warnings: self.model.warnings().to_vec(),
        }
    }
}

// =============================================================================
// Implicit Kronecker Operator
// =============================================================================

/// The fitted assignment matrix as a linear operator, dense for the
/// complete model and as a factor list for the tensored model
enum Operator<'a> {
    Dense(&'a Array2<f64>),
    Factors(Vec<&'a Array2<f64>>),
}

impl Operator<'_> {
    fn forward(&self, x: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Operator::Dense(a) => a.dot(&x),
            Operator::Factors(factors) => apply_factors(factors, x, false),
        }
    }

    fn adjoint(&self, x: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Operator::Dense(a) => a.t().dot(&x),
            Operator::Factors(factors) => apply_factors(factors, x, true),
        }
    }

    /// Upper bound on the largest eigenvalue of `AᵀA`; both norms multiply
    /// across Kronecker factors
    fn lipschitz(&self) -> f64 {
        match self {
            Operator::Dense(a) => linalg::one_norm(a.view()) * linalg::inf_norm(a.view()),
            Operator::Factors(factors) => factors
                .iter()
                .map(|a| linalg::one_norm(a.view()) * linalg::inf_norm(a.view()))
                .product(),
        }
    }
}

fn apply_factors(factors: &[&Array2<f64>], x: ArrayView1<f64>, transpose: bool) -> Array1<f64> {
    let dim = x.len();
    let mut vector = x.to_owned();
    let mut dim_left = 1;
    for a in factors {
        let d = a.nrows();
        let dim_right = dim / (dim_left * d);
        let view: ArrayView2<f64> = if transpose { a.t() } else { a.view() };
        vector = linalg::apply_factor(vector.view(), view, dim_left, dim_right);
        dim_left *= d;
    }
    vector
}

// =============================================================================
// Mitigation Result
// =============================================================================

/// Corrected estimate of an ideal counts distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationResult {
    /// Corrected counts keyed by basis label; exactly-zero entries are
    /// dropped, negative entries are kept
    pub counts: Counts,
    /// Dense corrected counts indexed by basis-state value
    pub vector: Array1<f64>,
    /// Width of the corrected register
    pub n_qubits: usize,
    /// Method that produced this estimate
    pub method: CorrectionMethod,
    /// Total observations in the raw input
    pub total: f64,
    /// Whether any corrected entry is negative
    pub negative_values: bool,
    /// ‖P̃ − A·P‖₂ in counts units; least-squares only
    pub residual_norm: Option<f64>,
    /// Solver iterations performed; least-squares only
    pub iterations: Option<usize>,
    /// Whether the solver met its tolerance; least-squares only
    pub converged: Option<bool>,
    /// Warnings carried over from model fitting plus any solver warnings
    pub warnings: Vec<MitigationWarning>,
}

impl MitigationResult {
    /// Corrected probability of a basis state
    pub fn probability(&self, state: usize) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        self.vector.get(state).copied().unwrap_or(0.0) / self.total
    }

    /// Most probable state after correction, with its probability
    pub fn most_likely_state(&self) -> (usize, f64) {
        self.vector
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(state, _)| (state, self.probability(state)))
            .unwrap_or((0, 0.0))
    }

    /// Expectation value of a diagonal observable over the corrected
    /// distribution
    pub fn expectation(&self, observable_fn: impl Fn(usize) -> f64) -> f64 {
        (0..self.vector.len())
            .map(|state| observable_fn(state) * self.probability(state))
            .sum()
    }

    /// ⟨Z⟩ of one qubit, `position` counted from the left of the label
    pub fn z_expectation(&self, position: usize) -> f64 {
        debug_assert!(position < self.n_qubits);
        let shift = self.n_qubits - 1 - position;
        self.expectation(|state| if (state >> shift) & 1 == 0 { 1.0 } else { -1.0 })
    }

    /// Total magnitude of negative corrected counts
    pub fn negative_mass(&self) -> f64 {
        self.vector
            .iter()
            .filter(|&&v| v < 0.0)
            .map(|&v| v.abs())
            .sum()
    }
}
