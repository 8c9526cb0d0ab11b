//! Error types for mlstm_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the core types.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Wrong number of dimensions.
    #[error("Dimension error: expected {expected} dimensions, got {got}")]
    DimensionError {
        /// Expected number of dimensions.
        expected: usize,
        /// Actual number of dimensions.
        got: usize,
    },

    /// Shape mismatch between two arrays.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
