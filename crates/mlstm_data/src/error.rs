//! Error types for mlstm_data.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while preparing or loading datasets.
#[derive(Error, Debug)]
pub enum DataError {
    /// An input file does not exist.
    #[error("File {} not found!", path.display())]
    FileNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// Invalid data shape.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// A sample is longer than the requested fixed length.
    #[error("Sample {index} has {length} time steps, more than the fixed length {max_len}")]
    SequenceTooLong {
        /// Index of the offending sample.
        index: usize,
        /// True length of the sample.
        length: usize,
        /// The fixed length that was requested.
        max_len: usize,
    },

    /// Empty dataset.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Index out of bounds.
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the collection.
        length: usize,
    },

    /// A label was not seen when the encoder was fitted.
    #[error("Label {0} was not present in the training labels")]
    UnknownLabel(i64),

    /// Cutoff choice other than `pre` or `post`.
    #[error("Cutoff parameter value must be either \"pre\" or \"post\", got {0:?}")]
    InvalidCutoff(String),

    /// Data is longer than the model input and no cutoff was given.
    #[error("Sequence length {got} exceeds the expected {expected}; a cutoff (pre/post) is required")]
    CutoffRequired {
        /// Length expected by the model.
        expected: usize,
        /// Length of the loaded data.
        got: usize,
    },

    /// Invalid batch size.
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    /// Split error.
    #[error("Split error: {0}")]
    SplitError(String),

    /// Malformed file contents.
    #[error("File format error: {0}")]
    Format(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] mlstm_core::CoreError),
}
