//! Model checkpointing.
//!
//! Weights are stored as named MessagePack records through burn's recorder,
//! next to a JSON sidecar holding the model configuration, so a checkpoint
//! can be reloaded without any other input.
//!
//! # Example
//!
//! ```rust,ignore
//! use mlstm_models::checkpoint::{save_checkpoint, load_checkpoint, CheckpointPaths};
//!
//! let paths = CheckpointPaths::new("weights", "arabic_voice_", None);
//! save_checkpoint(&model, &paths, &CheckpointMetadata::new(config.clone()))?;
//! let (model, metadata) = load_checkpoint::<B>(&paths, &device)?;
//! ```

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MlstmFcnConfig;
use crate::error::ModelError;
use crate::mlstm_fcn::MlstmFcn;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// No weights at the expected location.
    #[error("Checkpoint {} not found", path.display())]
    NotFound {
        /// The missing weights file.
        path: PathBuf,
    },

    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Metadata serialization error.
    #[error("Checkpoint metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored configuration cannot build a model.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

/// Weights and metadata locations for one dataset prefix and fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    /// Weights record (`.mpk`).
    pub weights: PathBuf,
    /// Metadata sidecar (`.json`).
    pub metadata: PathBuf,
}

impl CheckpointPaths {
    /// `{dir}/{prefix}_weights` or `{dir}/{prefix}_fold_{fold}_weights`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, prefix: &str, fold: Option<usize>) -> Self {
        let stem = match fold {
            Some(fold) => format!("{}_fold_{}_weights", prefix, fold),
            None => format!("{}_weights", prefix),
        };
        let dir = dir.as_ref();
        Self {
            weights: dir.join(format!("{}.mpk", stem)),
            metadata: dir.join(format!("{}.json", stem)),
        }
    }

    /// Whether the weights file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.weights.exists()
    }
}

/// Metadata stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Configuration the weights belong to.
    pub config: MlstmFcnConfig,
    /// Original labels, indexed by encoded class.
    pub classes: Vec<i64>,
    /// Epoch at which the weights were saved.
    pub epoch: Option<usize>,
    /// Name of the monitored quantity.
    pub monitor: Option<String>,
    /// Value of the monitored quantity.
    pub value: Option<f64>,
}

impl CheckpointMetadata {
    /// Metadata for a configuration.
    pub fn new(config: MlstmFcnConfig) -> Self {
        Self {
            config,
            classes: Vec::new(),
            epoch: None,
            monitor: None,
            value: None,
        }
    }

    /// Set the class labels.
    #[must_use]
    pub fn with_classes(mut self, classes: Vec<i64>) -> Self {
        self.classes = classes;
        self
    }

    /// Set the epoch and monitored value.
    #[must_use]
    pub fn with_monitor(mut self, epoch: usize, monitor: impl Into<String>, value: f64) -> Self {
        self.epoch = Some(epoch);
        self.monitor = Some(monitor.into());
        self.value = Some(value);
        self
    }

    /// Save metadata to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Save a module's record to `path` (which should end in `.mpk`).
///
/// # Errors
///
/// Returns [`CheckpointError::Save`] when the recorder fails.
pub fn save_record<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
        .record(module.clone().into_record(), path.to_path_buf())
        .map_err(|e| CheckpointError::Save(e.to_string()))
}

/// Load a module record from `path`.
///
/// # Errors
///
/// Returns [`CheckpointError::NotFound`] or [`CheckpointError::Load`].
pub fn load_record<B: Backend, M: Module<B>>(path: &Path, device: &B::Device) -> Result<M::Record> {
    if !path.exists() {
        return Err(CheckpointError::NotFound {
            path: path.to_path_buf(),
        });
    }
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
        .load(path.to_path_buf(), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Save model weights and metadata.
///
/// # Errors
///
/// Returns a save, I/O or serialization error.
pub fn save_checkpoint<B: Backend>(
    model: &MlstmFcn<B>,
    paths: &CheckpointPaths,
    metadata: &CheckpointMetadata,
) -> Result<()> {
    save_record::<B, _>(model, &paths.weights)?;
    metadata.save(&paths.metadata)?;
    debug!(path = %paths.weights.display(), "saved checkpoint");
    Ok(())
}

/// Rebuild a model from the metadata sidecar and load its weights.
///
/// # Errors
///
/// Returns [`CheckpointError::NotFound`] when the weights are missing, or a
/// load, metadata or model error.
pub fn load_checkpoint<B: Backend>(
    paths: &CheckpointPaths,
    device: &B::Device,
) -> Result<(MlstmFcn<B>, CheckpointMetadata)> {
    if !paths.exists() {
        return Err(CheckpointError::NotFound {
            path: paths.weights.clone(),
        });
    }
    let metadata = CheckpointMetadata::load(&paths.metadata)?;
    let model = load_weights(metadata.config.init::<B>(device)?, &paths.weights, device)?;
    Ok((model, metadata))
}

/// Load weights from `path` into an already built model.
///
/// # Errors
///
/// Returns [`CheckpointError::NotFound`] or [`CheckpointError::Load`].
pub fn load_weights<B: Backend>(
    model: MlstmFcn<B>,
    path: &Path,
    device: &B::Device,
) -> Result<MlstmFcn<B>> {
    let record = load_record::<B, MlstmFcn<B>>(path, device)?;
    Ok(model.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn config() -> MlstmFcnConfig {
        MlstmFcnConfig::new(2, 16, 3)
            .with_lstm_cells(4)
            .with_conv_filters(vec![8, 8])
            .with_conv_kernels(vec![3, 3])
            .with_squeeze_ratio(2)
    }

    #[test]
    fn test_paths() {
        let plain = CheckpointPaths::new("weights", "arabic_", None);
        assert_eq!(plain.weights, Path::new("weights/arabic__weights.mpk"));
        assert_eq!(plain.metadata, Path::new("weights/arabic__weights.json"));

        let fold = CheckpointPaths::new("weights", "arabic_", Some(3));
        assert_eq!(fold.weights, Path::new("weights/arabic__fold_3_weights.mpk"));
    }

    #[test]
    fn test_round_trip_preserves_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let paths = CheckpointPaths::new(dir.path().join("weights"), "toy", None);

        let model = config().init::<B>(&device).unwrap();
        let metadata = CheckpointMetadata::new(config())
            .with_classes(vec![1, 2, 3])
            .with_monitor(4, "loss", 0.5);
        save_checkpoint(&model, &paths, &metadata).unwrap();

        let (loaded, loaded_meta) = load_checkpoint::<B>(&paths, &device).unwrap();
        assert_eq!(loaded_meta, metadata);

        let x = Tensor::<B, 3>::random([2, 2, 16], Distribution::Normal(0.0, 1.0), &device);
        let a: Vec<f32> = model.forward(x.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.forward(x).into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dotted_prefix_keeps_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let paths = CheckpointPaths::new(dir.path(), "run.v2", Some(1));
        assert_eq!(paths.weights, dir.path().join("run.v2_fold_1_weights.mpk"));

        let model = config().init::<B>(&device).unwrap();
        save_checkpoint(&model, &paths, &CheckpointMetadata::new(config())).unwrap();

        assert!(paths.weights.is_file());
        assert!(!dir.path().join("run.mpk").exists());
        assert!(load_checkpoint::<B>(&paths, &device).is_ok());
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let device: <B as Backend>::Device = Default::default();
        let paths = CheckpointPaths::new(dir.path(), "missing", Some(0));
        assert!(matches!(
            load_checkpoint::<B>(&paths, &device),
            Err(CheckpointError::NotFound { .. })
        ));
    }
}
