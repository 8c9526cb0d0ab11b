//! Error types for training and evaluation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training or evaluation.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid training configuration.
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    /// Invalid learning rate.
    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(f64),

    /// The monitored quantity diverged.
    #[error("Loss is not finite at epoch {epoch}")]
    NonFiniteLoss {
        /// Epoch (0-indexed) at which the loss diverged.
        epoch: usize,
    },

    /// No checkpoint exists for the requested prefix and fold.
    #[error("Checkpoint {} not found; train the model first", path.display())]
    CheckpointNotFound {
        /// The expected weights file.
        path: PathBuf,
    },

    /// Data error.
    #[error("Data error: {0}")]
    Data(#[from] mlstm_data::DataError),

    /// Model error.
    #[error("Model error: {0}")]
    Model(#[from] mlstm_models::ModelError),

    /// Checkpoint error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(mlstm_models::CheckpointError),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] mlstm_core::CoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<mlstm_models::CheckpointError> for TrainError {
    fn from(err: mlstm_models::CheckpointError) -> Self {
        match err {
            mlstm_models::CheckpointError::NotFound { path } => Self::CheckpointNotFound { path },
            other => Self::Checkpoint(other),
        }
    }
}
