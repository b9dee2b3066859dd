//! Tensored calibration: per-group assignment matrices
//!
//! Assumes assignment error factorizes across disjoint qubit groups, so the
//! full `2^n x 2^n` matrix is the Kronecker product `A_1 (x) ... (x) A_m`
//! and is never materialized. Fitting needs `2^max_group_size` experiments
//! and `sum(4^group_size)` matrix entries instead of `4^n`.

use crate::counts::{self, Counts};
use crate::error::{MitigationError, Result};
use crate::model::MitigationWarning;
use ndarray::Array2;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Relative tolerance for the per-group column shot-balance check
pub const COLUMN_SUM_TOLERANCE: f64 = 1e-6;

/// One factor of the tensored model: the qubits it covers and its local
/// assignment matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCalibration {
    qubits: Vec<usize>,
    matrix: Array2<f64>,
}

impl GroupCalibration {
    /// Qubit indices this group covers, in label order
    pub fn qubits(&self) -> &[usize] {
        &self.qubits
    }

    pub fn n_qubits(&self) -> usize {
        self.qubits.len()
    }

    /// Dimension of the local basis, `2^group_size`
    pub fn dimension(&self) -> usize {
        1usize << self.qubits.len()
    }

    /// Local assignment matrix; column `j` is the observed marginal
    /// distribution when the group was prepared in local state `j`
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Mean of the local matrix diagonal
    pub fn assignment_fidelity(&self) -> f64 {
        self.matrix.diag().mean().unwrap_or(0.0)
    }
}

/// Fitted tensored assignment-error model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensoredCalibration {
    n_qubits: usize,
    groups: Vec<GroupCalibration>,
    warnings: Vec<MitigationWarning>,
}

impl TensoredCalibration {
    /// Build per-group assignment matrices from joint calibration counts.
    ///
    /// `pattern` partitions the calibrated qubits into disjoint groups;
    /// group order is label order, so group 0 owns the leftmost characters
    /// of every label. Each calibration experiment prepares one joint basis
    /// state; the column a group extracts from it is indexed by the group's
    /// own slice of the prepared label, and the observed marginal comes
    /// from summing the joint counts over all other groups.
    ///
    /// Local columns that receive no shots are left zero and recorded as
    /// [`MitigationWarning::ZeroShotColumn`]. A column whose accumulated
    /// shot total drifts from its group's mean by more than
    /// [`COLUMN_SUM_TOLERANCE`] (relative) still normalizes but is recorded
    /// as [`MitigationWarning::ColumnSumDeviation`], since its entries carry
    /// a different statistical weight than its neighbors'.
    pub fn from_counts(
        pattern: &[Vec<usize>],
        labels: &[String],
        counts_by_label: &HashMap<String, Counts>,
    ) -> Result<Self> {
        let n_qubits = validate_pattern(pattern)?;
        if labels.is_empty() {
            return Err(MitigationError::CalibrationData(
                "empty calibration label set".into(),
            ));
        }

        // char offset of each group's slice within a joint label
        let mut offsets = Vec::with_capacity(pattern.len());
        let mut offset = 0;
        for group in pattern {
            offsets.push(offset);
            offset += group.len();
        }

        let mut accumulators: Vec<Array2<f64>> = pattern
            .iter()
            .map(|group| Array2::zeros((1 << group.len(), 1 << group.len())))
            .collect();

        let mut prepared: FxHashSet<&str> = FxHashSet::default();
        for label in labels {
            counts::validate_label(label, n_qubits)?;
            if !prepared.insert(label.as_str()) {
                return Err(MitigationError::CalibrationData(format!(
                    "duplicate prepared label '{label}'"
                )));
            }
            let Some(observed) = counts_by_label.get(label) else {
                continue;
            };
            let prepared_bytes = label.as_bytes();
            for (observed_label, &count) in observed {
                counts::validate_label(observed_label, n_qubits)?;
                let observed_bytes = observed_label.as_bytes();
                for (g, group) in pattern.iter().enumerate() {
                    let column = counts::span_index(prepared_bytes, offsets[g], group.len());
                    let row = counts::span_index(observed_bytes, offsets[g], group.len());
                    accumulators[g][[row, column]] += count;
                }
            }
        }

        let mut warnings = Vec::new();
        let mut groups = Vec::with_capacity(pattern.len());
        for (g, (group, mut matrix)) in pattern.iter().zip(accumulators).enumerate() {
            let dim = 1usize << group.len();
            let totals: Vec<f64> = (0..dim).map(|column| matrix.column(column).sum()).collect();
            let populated = totals.iter().filter(|&&total| total > 0.0).count();
            let mean = totals.iter().filter(|&&total| total > 0.0).sum::<f64>()
                / populated.max(1) as f64;
            for (column, &total) in totals.iter().enumerate() {
                if total <= 0.0 {
                    warnings.push(MitigationWarning::ZeroShotColumn {
                        group: Some(g),
                        label: counts::index_to_label(column, group.len()),
                    });
                    continue;
                }
                let ratio = total / mean;
                if (ratio - 1.0).abs() > COLUMN_SUM_TOLERANCE {
                    warnings.push(MitigationWarning::ColumnSumDeviation { group: g, column, ratio });
                }
                matrix.column_mut(column).mapv_inplace(|count| count / total);
            }
            groups.push(GroupCalibration {
                qubits: group.clone(),
                matrix,
            });
        }

        Ok(Self {
            n_qubits,
            groups,
            warnings,
        })
    }

    /// Total number of calibrated qubits
    pub fn n_qubits(&self) -> usize {
        self.n_qubits
    }

    /// Dimension of the joint basis, `2^n`
    pub fn dimension(&self) -> usize {
        1usize << self.n_qubits
    }

    /// The fitted groups, in label order
    pub fn groups(&self) -> &[GroupCalibration] {
        &self.groups
    }

    /// Warnings recorded while fitting
    pub fn warnings(&self) -> &[MitigationWarning] {
        &self.warnings
    }

    /// Restrict the model to a subset of its qubits by selecting whole
    /// groups.
    ///
    /// Every requested qubit must belong to this model and every group
    /// touched by the request must be requested in full; the factorized
    /// model carries no information with which to split a group. Selected
    /// groups keep their relative order, and fit warnings that refer to a
    /// selected group are carried over with the group index remapped.
    pub fn select(&self, qubits: &[usize]) -> Result<TensoredCalibration> {
        let requested: FxHashSet<usize> = qubits.iter().copied().collect();
        if requested.len() != qubits.len() {
            return Err(MitigationError::InvalidPartition(
                "duplicate qubit in selection".into(),
            ));
        }

        let mut kept = Vec::new();
        let mut covered = 0usize;
        for (g, group) in self.groups.iter().enumerate() {
            let hits = group
                .qubits
                .iter()
                .filter(|q| requested.contains(*q))
                .count();
            if hits == 0 {
                continue;
            }
            if hits != group.qubits.len() {
                return Err(MitigationError::InvalidPartition(format!(
                    "selection splits group {g}; tensored models can only be \
                     restricted to whole groups"
                )));
            }
            covered += hits;
            kept.push(g);
        }
        if covered != qubits.len() {
            return Err(MitigationError::InvalidPartition(
                "selection contains qubits outside the fitted model".into(),
            ));
        }

        let groups: Vec<GroupCalibration> = kept.iter().map(|&g| self.groups[g].clone()).collect();
        let warnings = self
            .warnings
            .iter()
            .filter_map(|warning| match warning {
                MitigationWarning::ZeroShotColumn {
                    group: Some(g),
                    label,
                } => kept.iter().position(|&k| k == *g).map(|new_g| {
                    MitigationWarning::ZeroShotColumn {
                        group: Some(new_g),
                        label: label.clone(),
                    }
                }),
                MitigationWarning::ColumnSumDeviation { group, column, ratio } => kept
                    .iter()
                    .position(|&k| k == *group)
                    .map(|new_g| MitigationWarning::ColumnSumDeviation {
                        group: new_g,
                        column: *column,
                        ratio: *ratio,
                    }),
                _ => None,
            })
            .collect();

        Ok(TensoredCalibration {
            n_qubits: groups.iter().map(GroupCalibration::n_qubits).sum(),
            groups,
            warnings,
        })
    }

    /// Per-group assignment fidelities, in group order
    pub fn group_fidelities(&self) -> Vec<f64> {
        self.groups
            .iter()
            .map(GroupCalibration::assignment_fidelity)
            .collect()
    }

    /// Average assignment fidelity over the joint basis.
    ///
    /// The diagonal of a Kronecker product factorizes, so this is the
    /// product of the group fidelities.
    pub fn assignment_fidelity(&self) -> f64 {
        self.groups
            .iter()
            .map(GroupCalibration::assignment_fidelity)
            .product()
    }
}

/// Check that `pattern` is a valid partition and return the qubit total
fn validate_pattern(pattern: &[Vec<usize>]) -> Result<usize> {
    if pattern.is_empty() {
        return Err(MitigationError::InvalidPartition(
            "partition has no groups".into(),
        ));
    }
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    let mut n_qubits = 0;
    for (g, group) in pattern.iter().enumerate() {
        if group.is_empty() {
            return Err(MitigationError::InvalidPartition(format!(
                "group {g} is empty"
            )));
        }
        for &qubit in group {
            if !seen.insert(qubit) {
                return Err(MitigationError::InvalidPartition(format!(
                    "qubit {qubit} appears in more than one group"
                )));
            }
        }
        n_qubits += group.len();
    }
    Ok(n_qubits)
}
