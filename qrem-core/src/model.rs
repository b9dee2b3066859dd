//! Fitted calibration models and warning values
//!
//! A fitted model is an immutable value object created once from
//! calibration counts and shared (by reference) across any number of
//! correction calls. Calibration-quality issues are attached to the model
//! as [`MitigationWarning`] values rather than raised.

use crate::complete::CompleteCalibration;
use crate::tensored::TensoredCalibration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-fatal quality flags from calibration fitting and correction solves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MitigationWarning {
    /// A prepared-state column received no shots and was left as zero
    ZeroShotColumn {
        /// Group index for tensored models, `None` for complete models
        group: Option<usize>,
        /// Prepared label of the empty column (local label for groups)
        label: String,
    },
    /// A calibration column's accumulated shot total deviates from its
    /// group's mean, so the group's columns carry unequal statistical weight
    ColumnSumDeviation {
        group: usize,
        column: usize,
        /// Column total relative to the group mean
        ratio: f64,
    },
    /// The constrained least-squares solver stopped at its iteration cap;
    /// the best feasible point found was returned
    IterationCap { iterations: usize },
}

impl fmt::Display for MitigationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MitigationWarning::ZeroShotColumn { group, label } => match group {
                Some(g) => write!(f, "no calibration shots for prepared state '{label}' in group {g}"),
                None => write!(f, "no calibration shots for prepared state '{label}'"),
            },
            MitigationWarning::ColumnSumDeviation { group, column, ratio } => write!(
                f,
                "calibration column {column} of group {group} accumulated {ratio}x the group's mean shots"
            ),
            MitigationWarning::IterationCap { iterations } => write!(
                f,
                "least-squares solver reached its cap of {iterations} iterations without converging"
            ),
        }
    }
}

/// A fitted assignment-error model: a full matrix or a tensored factor list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedModel {
    Complete(CompleteCalibration),
    Tensored(TensoredCalibration),
}

impl FittedModel {
    /// Number of qubits the model was calibrated over
    pub fn n_qubits(&self) -> usize {
        match self {
            FittedModel::Complete(cal) => cal.n_qubits(),
            FittedModel::Tensored(cal) => cal.n_qubits(),
        }
    }

    /// Dimension of the joint basis, `2^n`
    pub fn dimension(&self) -> usize {
        match self {
            FittedModel::Complete(cal) => cal.dimension(),
            FittedModel::Tensored(cal) => cal.dimension(),
        }
    }

    /// Warnings recorded while fitting
    pub fn warnings(&self) -> &[MitigationWarning] {
        match self {
            FittedModel::Complete(cal) => cal.warnings(),
            FittedModel::Tensored(cal) => cal.warnings(),
        }
    }

    /// Mean diagonal of the (implied) assignment matrix
    pub fn assignment_fidelity(&self) -> f64 {
        match self {
            FittedModel::Complete(cal) => cal.assignment_fidelity(),
            FittedModel::Tensored(cal) => cal.assignment_fidelity(),
        }
    }
}

impl From<CompleteCalibration> for FittedModel {
    fn from(cal: CompleteCalibration) -> Self {
        FittedModel::Complete(cal)
    }
}

impl From<TensoredCalibration> for FittedModel {
    fn from(cal: TensoredCalibration) -> Self {
        FittedModel::Tensored(cal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let warning = MitigationWarning::ZeroShotColumn {
            group: None,
            label: "01".into(),
        };
        assert_eq!(
            warning.to_string(),
            "no calibration shots for prepared state '01'"
        );

        let warning = MitigationWarning::ZeroShotColumn {
            group: Some(2),
            label: "1".into(),
        };
        assert_eq!(
            warning.to_string(),
            "no calibration shots for prepared state '1' in group 2"
        );

        let warning = MitigationWarning::ColumnSumDeviation {
            group: 1,
            column: 3,
            ratio: 0.9,
        };
        assert_eq!(
            warning.to_string(),
            "calibration column 3 of group 1 accumulated 0.9x the group's mean shots"
        );

        let warning = MitigationWarning::IterationCap { iterations: 500 };
        assert!(warning.to_string().contains("500"));
    }
}
