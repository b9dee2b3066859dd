//! # QREM-Core: Quantum Readout-Error Mitigation
//!
//! Builds measurement assignment-error models from calibration experiment
//! counts and corrects observed counts through them.
//!
//! ## Features
//!
//! - **Complete calibration**: full `2^n x 2^n` assignment matrix fitted
//!   from one experiment per basis state
//! - **Tensored calibration**: Kronecker-factorized model over disjoint
//!   qubit groups, fitted from `2^max_group_size` experiments and never
//!   materialized
//! - **Correction filter**: pseudo-inverse or constrained least-squares
//!   correction, selectable per call, matrix-free on the tensored path
//! - **Synthetic channel**: seeded readout-error model for tests and
//!   benchmarks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qrem_core::{CompleteCalibration, CorrectionFilter, CorrectionMethod, FittedModel};
//!
//! // Fit a model from calibration experiment counts
//! let model: FittedModel =
//!     CompleteCalibration::from_counts(&labels, &counts_by_label)?.into();
//!
//! // Correct an observed experiment through it
//! let filter = CorrectionFilter::new(&model);
//! let corrected = filter.apply(&raw_counts, CorrectionMethod::ConstrainedLeastSquares)?;
//! println!("p(00) = {}", corrected.probability(0));
//! ```

pub mod complete;
pub mod counts;
pub mod error;
pub mod filter;
pub mod linalg; // dense inversion, Kronecker-factor application, simplex projection
pub mod model;
pub mod sim; // synthetic readout-error channel (test/bench support)
pub mod tensored;

// Re-exports
pub use complete::CompleteCalibration;
pub use counts::{
    counts_to_vector, index_to_label, infer_width, label_to_index, total_counts, vector_to_counts,
    Counts,
};
pub use error::{MitigationError, Result};
pub use filter::{
    CorrectionFilter, CorrectionMethod, LeastSquaresConfig, MitigationResult,
    DEFAULT_LSQ_MAX_ITERATIONS, DEFAULT_LSQ_TOLERANCE, PINV_RIDGE_LAMBDA,
};
pub use model::{FittedModel, MitigationWarning};
pub use sim::{QubitReadoutError, ReadoutErrorModel, ShotSampler};
pub use tensored::{GroupCalibration, TensoredCalibration, COLUMN_SUM_TOLERANCE};
