//! # mlstm_models
//!
//! The MLSTM-FCN network for multivariate time series classification.
//!
//! - [`MlstmFcnConfig`]: serde configuration with `with_*` builders
//! - [`NetworkGraph`]: the layer DAG with shape inference, parameter counts
//!   and a printable summary
//! - [`MlstmFcn`]: the burn module, built from a validated graph
//! - [`checkpoint`]: weights and metadata persistence

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod activation;
mod blocks;
pub mod checkpoint;
mod config;
mod error;
mod graph;
mod mlstm_fcn;
mod recurrent;

pub use activation::{Activation, ConvPadding, KernelInit, OutputActivation};
pub use blocks::{ConvBlock, ConvStage, SqueezeExcite};
pub use checkpoint::{
    load_checkpoint, load_weights, save_checkpoint, CheckpointError, CheckpointMetadata,
    CheckpointPaths,
};
pub use config::MlstmFcnConfig;
pub use error::{ModelError, Result};
pub use graph::{LayerKind, LayerNode, NetworkGraph, RecurrentShape};
pub use mlstm_fcn::MlstmFcn;
pub use recurrent::{timestep_mask, MaskedLstm, StepAttention};
