//! Error types for readout-error mitigation
//!
//! Structural and input errors are raised at the boundary of the offending
//! call. Numerical anomalies (negative corrected counts, solver iteration
//! caps, zero-shot calibration columns) are data, not errors; they are
//! surfaced as [`crate::model::MitigationWarning`] values on fitted models
//! and mitigation results instead.

use thiserror::Error;

/// Result type alias for mitigation operations
pub type Result<T> = std::result::Result<T, MitigationError>;

/// Errors raised by calibration fitting and correction filtering
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MitigationError {
    /// Basis label with the wrong length or a non-binary character
    #[error("malformed basis label '{label}': expected {expected} binary digits")]
    MalformedLabel { label: String, expected: usize },

    /// Mitigation pattern whose qubit groups are malformed (empty or overlapping)
    /// or do not line up with the fitted model
    #[error("invalid mitigation pattern: {0}")]
    InvalidPartition(String),

    /// Query width does not match the fitted model
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Exactly singular calibration matrix on the inversion path with no
    /// usable fallback
    #[error("singular calibration matrix: {0}")]
    SingularCalibration(String),

    /// Structurally inconsistent calibration input (duplicate or empty
    /// prepared-label set)
    #[error("inconsistent calibration data: {0}")]
    CalibrationData(String),
}
