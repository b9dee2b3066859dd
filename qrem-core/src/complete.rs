//! Complete calibration: the full `2^n x 2^n` assignment matrix
//!
//! Built from one calibration experiment per basis state. Column `j` of the
//! matrix is the normalized distribution observed when the device was
//! prepared in the basis state of value `j`, so the matrix maps ideal
//! preparation probabilities to observed measurement probabilities.

use crate::counts::{self, Counts};
use crate::error::{MitigationError, Result};
use crate::model::MitigationWarning;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fitted complete assignment-error model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteCalibration {
    n_qubits: usize,
    matrix: Array2<f64>,
    warnings: Vec<MitigationWarning>,
}

impl CompleteCalibration {
    /// Build the assignment matrix from calibration measurement counts.
    ///
    /// `labels` enumerates the prepared basis states (any fixed order); the
    /// counts observed for each label become the column at that label's
    /// value, normalized to sum 1. An experiment that is absent (from
    /// either argument) or reported zero shots leaves a zero column and a
    /// [`MitigationWarning::ZeroShotColumn`] on the model.
    pub fn from_counts(
        labels: &[String],
        counts_by_label: &HashMap<String, Counts>,
    ) -> Result<Self> {
        let Some(first) = labels.first() else {
            return Err(MitigationError::CalibrationData(
                "empty calibration label set".into(),
            ));
        };
        let n_qubits = first.len();
        let dim = 1usize << n_qubits;

        let mut prepared = vec![false; dim];
        for label in labels {
            counts::validate_label(label, n_qubits)?;
            let index = counts::label_to_index(label)?;
            if prepared[index] {
                return Err(MitigationError::CalibrationData(format!(
                    "duplicate prepared label '{label}'"
                )));
            }
            prepared[index] = true;
        }

        let mut matrix = Array2::zeros((dim, dim));
        let mut warnings = Vec::new();
        for label in labels {
            let column = counts::label_to_index(label)?;
            let observed = match counts_by_label.get(label) {
                Some(observed) => counts::counts_to_vector(observed, n_qubits)?,
                None => {
                    warnings.push(MitigationWarning::ZeroShotColumn {
                        group: None,
                        label: label.clone(),
                    });
                    continue;
                }
            };
            let total = observed.sum();
            if total <= 0.0 {
                warnings.push(MitigationWarning::ZeroShotColumn {
                    group: None,
                    label: label.clone(),
                });
                continue;
            }
            matrix
                .column_mut(column)
                .assign(&observed.mapv(|count| count / total));
        }

        // basis states never prepared at all also yield zero columns
        for (index, &seen) in prepared.iter().enumerate() {
            if !seen {
                warnings.push(MitigationWarning::ZeroShotColumn {
                    group: None,
                    label: counts::index_to_label(index, n_qubits),
                });
            }
        }

        Ok(Self {
            n_qubits,
            matrix,
            warnings,
        })
    }

    pub fn n_qubits(&self) -> usize {
        self.n_qubits
    }

    /// Dimension of the basis, `2^n`
    pub fn dimension(&self) -> usize {
        1usize << self.n_qubits
    }

    /// The assignment matrix; column `j` is the observed distribution for
    /// prepared state `j`
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Warnings recorded while fitting
    pub fn warnings(&self) -> &[MitigationWarning] {
        &self.warnings
    }

    /// Probability that basis state `state` is read out as itself
    pub fn readout_fidelity(&self, state: usize) -> f64 {
        self.matrix.get((state, state)).copied().unwrap_or(0.0)
    }

    /// Average assignment fidelity: mean of the diagonal
    pub fn assignment_fidelity(&self) -> f64 {
        self.matrix.diag().mean().unwrap_or(0.0)
    }
}
