//! # mlstm
//!
//! Multivariate LSTM fully convolutional networks (MLSTM-FCN) for time series
//! classification.
//!
//! - **Data**: variable-length `.ts`/`.npz` collections, padding, z-score
//!   normalization, label encoding, class weights and splits
//! - **Models**: the MLSTM-FCN network with optional attention and
//!   squeeze-excite gates, described by a layer graph
//! - **Training**: weighted cross-entropy, best-only checkpoints, plateau
//!   learning-rate reduction and evaluation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mlstm::prelude::*;
//!
//! let raw = read_collection("arabic_voice.npz".as_ref())?;
//! prepare(&raw, &PrepareConfig::default())?.save("data".as_ref())?;
//!
//! let data = load_dataset(&DatasetPaths::in_dir("data".as_ref()), &LoadOptions::default())?;
//! let model = MlstmFcnConfig::new(data.n_vars(), data.seq_len(), data.n_classes());
//! let config = TrainConfig::default().with_dataset_prefix("arabic_voice_");
//!
//! Trainer::<TrainBackend>::new(config.clone(), device).fit(&model, &data)?;
//! let result = evaluate::<CpuBackend>(&model, &data, &config, &device)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod experiment;

pub use mlstm_core as core;
pub use mlstm_data as data;
pub use mlstm_models as models;
pub use mlstm_train as train;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use mlstm::prelude::*;
/// ```
pub mod prelude {
    pub use mlstm_core::backend::{CpuBackend, TrainBackend};
    pub use mlstm_core::{DatasetShape, Seed};

    pub use mlstm_data::{
        load_dataset, pad_collection, prepare, read_collection, ClassWeights, Cutoff,
        DataLoader, DatasetContext, DatasetPaths, LabelEncoder, LoadOptions, NormScope,
        NormStats, PrepareConfig, RawCollection, SplitPlan,
    };

    pub use mlstm_models::{
        load_checkpoint, save_checkpoint, Activation, CheckpointPaths, MlstmFcn, MlstmFcnConfig,
        NetworkGraph, OutputActivation,
    };

    pub use mlstm_train::{
        evaluate, ConfusionMatrix, EvaluationResult, ModelCheckpoint, Monitor, MonitorMode,
        ReduceLROnPlateau, TrainConfig, Trainer, WeightedCrossEntropy,
    };

    pub use crate::experiment::{ExperimentConfig, ExperimentError};
}
