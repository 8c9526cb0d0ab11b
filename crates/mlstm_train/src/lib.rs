//! # mlstm_train
//!
//! Training and evaluation driver for MLSTM-FCN models.
//!
//! - [`Trainer`]: Adam on a sample-weighted categorical cross-entropy, with
//!   per-epoch validation
//! - [`ModelCheckpoint`]: best-only weight persistence on a monitored quantity
//! - [`ReduceLROnPlateau`]: learning-rate reduction when the monitored
//!   quantity stalls
//! - [`evaluate`]: reload the best checkpoint and report metrics
//!
//! ## Example
//!
//! ```rust,ignore
//! use mlstm_train::{Trainer, TrainConfig};
//!
//! let config = TrainConfig::default().with_dataset_prefix("arabic_voice_");
//! let trainer = Trainer::<TrainBackend>::new(config.clone(), device);
//! let output = trainer.fit(&model_config, &data)?;
//! let result = mlstm_train::evaluate::<CpuBackend>(&model_config, &data, &config, &device)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback;
mod error;
pub mod evaluation;
pub mod loss;
pub mod scheduler;
pub mod trainer;

pub use callback::{Direction, ModelCheckpoint, Monitor, MonitorMode};
pub use error::{Result, TrainError};
pub use evaluation::{evaluate, evaluate_model, ConfusionMatrix, EvaluationResult};
pub use loss::WeightedCrossEntropy;
pub use scheduler::{plateau_factor, ReduceLROnPlateau, DEFAULT_FACTOR, TIMESERIES_FACTOR};
pub use trainer::{
    prepare_data, EpochRecord, TrainConfig, Trainer, TrainingOutput, TrainingReport,
};
