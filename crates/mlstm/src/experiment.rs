//! End-to-end experiment stages driven by one JSON configuration.
//!
//! ```json
//! {
//!   "data": { "source": "arabic_voice.npz", "dir": "data/arabic_voice" },
//!   "model": { "lstm_cells": 8, "attention": true },
//!   "train": { "epochs": 1000, "dataset_prefix": "arabic_voice_" }
//! }
//! ```

use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::info;

use mlstm_data::{
    load_dataset, prepare, read_collection, DatasetContext, DatasetPaths, LoadOptions,
    PrepareConfig, PreparedDataset,
};
use mlstm_models::{MlstmFcnConfig, NetworkGraph};
use mlstm_train::{evaluate, EvaluationResult, TrainConfig, Trainer, TrainingReport};

/// Errors raised by the experiment stages.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    /// The configuration is incomplete for the requested stage.
    #[error("Invalid experiment configuration: {0}")]
    InvalidConfig(String),

    /// Data error.
    #[error(transparent)]
    Data(#[from] mlstm_data::DataError),

    /// Model error.
    #[error(transparent)]
    Model(#[from] mlstm_models::ModelError),

    /// Training or evaluation error.
    #[error(transparent)]
    Train(#[from] mlstm_train::TrainError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for experiment stages.
pub type Result<T> = std::result::Result<T, ExperimentError>;

/// Dataset locations and preparation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Raw `.ts` or `.npz` collection read by the prepare stage.
    pub source: Option<PathBuf>,
    /// Directory holding the prepared arrays.
    pub dir: PathBuf,
    /// Preparation options.
    pub prepare: PrepareConfig,
    /// Load options.
    pub load: LoadOptions,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: None,
            dir: PathBuf::from("data"),
            prepare: PrepareConfig::default(),
            load: LoadOptions::default(),
        }
    }
}

/// Data, model and training configuration of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Dataset configuration.
    pub data: DataConfig,
    /// Network configuration.
    pub model: MlstmFcnConfig,
    /// Take variable count, class count and length from the data.
    pub infer_shape: bool,
    /// Training configuration.
    pub train: TrainConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            model: MlstmFcnConfig::default(),
            infer_shape: true,
            train: TrainConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Read a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O or parse error.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Paths of the prepared arrays.
    pub fn dataset_paths(&self) -> DatasetPaths {
        DatasetPaths::in_dir(&self.data.dir)
    }

    /// Model configuration for `data`.
    ///
    /// With `infer_shape`, the variable count, class count and sequence
    /// length come from the dataset.
    pub fn model_for(&self, data: &DatasetContext) -> MlstmFcnConfig {
        if !self.infer_shape {
            return self.model.clone();
        }
        let mut model = self.model.clone();
        model.n_vars = data.n_vars();
        model.n_classes = data.n_classes();
        model.seq_len = data.seq_len();
        model
    }
}

/// Read the raw collection, prepare it and write the arrays.
///
/// # Errors
///
/// Returns [`ExperimentError::InvalidConfig`] without a source and
/// propagates data errors.
pub fn run_prepare(config: &ExperimentConfig) -> Result<PreparedDataset> {
    let source = config
        .data
        .source
        .as_deref()
        .ok_or_else(|| ExperimentError::InvalidConfig("data.source is not set".into()))?;
    let raw = read_collection(source)?;
    info!(
        source = %source.display(),
        samples = raw.len(),
        n_vars = raw.n_vars(),
        "read raw collection"
    );
    let prepared = prepare(&raw, &config.data.prepare)?;
    prepared.save(&config.data.dir)?;
    Ok(prepared)
}

/// Load the prepared arrays.
///
/// # Errors
///
/// Propagates file-not-found and format errors.
pub fn load_context(config: &ExperimentConfig) -> Result<DatasetContext> {
    Ok(load_dataset(&config.dataset_paths(), &config.data.load)?)
}

/// Train a model on the prepared dataset.
///
/// # Errors
///
/// Propagates data, model and training errors.
pub fn run_train<B: AutodiffBackend>(
    config: &ExperimentConfig,
    device: &B::Device,
) -> Result<TrainingReport> {
    let data = load_context(config)?;
    let model = config.model_for(&data);
    let trainer = Trainer::<B>::new(config.train.clone(), device.clone());
    let output = trainer.fit(&model, &data)?;
    Ok(output.report)
}

/// Evaluate the best checkpoint on the prepared test split.
///
/// Predictions are reported with the labels recorded by the prepare stage
/// when `dataset.json` is present, as [`load_context`] reads them.
///
/// # Errors
///
/// Returns the checkpoint-not-found error when no model was trained for the
/// configured prefix and fold.
pub fn run_eval<B: Backend>(
    config: &ExperimentConfig,
    device: &B::Device,
) -> Result<EvaluationResult> {
    let data = load_context(config)?;
    let model = config.model_for(&data);
    Ok(evaluate::<B>(&model, &data, &config.train, device)?)
}

/// Layer table of the configured model.
///
/// When the prepared arrays exist and `infer_shape` is set, the shape comes
/// from the data; otherwise from the model configuration.
///
/// # Errors
///
/// Returns a model error when the configuration cannot be built.
pub fn summary(config: &ExperimentConfig) -> Result<String> {
    let model = if config.infer_shape && config.dataset_paths().x_train.exists() {
        config.model_for(&load_context(config)?)
    } else {
        config.model.clone()
    };
    Ok(NetworkGraph::build(&model)?.summary())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_partial_json() {
        let config: ExperimentConfig = serde_json::from_str(
            r#"{"model": {"lstm_cells": 64, "attention": true}, "train": {"epochs": 2}}"#,
        )
        .unwrap();
        assert!(config.infer_shape);
        assert_eq!(config.model.lstm_cells, 64);
        assert!(config.model.attention);
        assert_eq!(config.model.conv_filters, vec![128, 256, 128]);
        assert_eq!(config.train.epochs, 2);
        assert_eq!(config.train.batch_size, 128);
        assert_eq!(config.data.dir, PathBuf::from("data"));
    }

    #[test]
    fn test_prepare_requires_source() {
        let err = run_prepare(&ExperimentConfig::default()).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidConfig(_)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        let mut config = ExperimentConfig::default();
        config.train.dataset_prefix = "arabic_".into();
        config.save(&path).unwrap();
        assert_eq!(ExperimentConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_summary_without_data() {
        let mut config = ExperimentConfig::default();
        config.data.dir = PathBuf::from("does/not/exist");
        config.model = MlstmFcnConfig::new(13, 93, 88);
        let table = summary(&config).unwrap();
        assert!(table.contains("lstm"));
    }
}
