//! Error types for mlstm_models.

use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while validating or building a network.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Invalid configuration value.
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    /// A convolution leaves no time steps.
    #[error("Layer {layer}: kernel {kernel} (stride {stride}) leaves no output steps from an input of {input_len}")]
    ShapeCollapse {
        /// Name of the offending layer.
        layer: String,
        /// Time steps entering the layer.
        input_len: usize,
        /// Kernel size.
        kernel: usize,
        /// Stride.
        stride: usize,
    },

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] mlstm_core::CoreError),
}
