//! Error types for the reconocer crate
//!
//! Construction-time validation (matrix shapes, quantization setup) reports
//! failures through [`ReconocerError`]. The matrix-vector kernels themselves
//! are infallible: their preconditions are validated by the safe wrappers
//! before any kernel runs.

use thiserror::Error;

/// Error type for reconocer operations
#[derive(Debug, Error)]
pub enum ReconocerError {
    /// Shape validation failed
    #[error("Invalid shape: {reason}")]
    InvalidShape {
        /// Description of the shape mismatch
        reason: String,
    },
}

/// Result type alias for reconocer operations
pub type Result<T> = std::result::Result<T, ReconocerError>;
