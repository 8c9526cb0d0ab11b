//! # mlstm_data
//!
//! Dataset preparation and loading for MLSTM-FCN classifiers.
//!
//! This crate provides:
//! - [`RawCollection`] for labeled variable-length samples read from `.ts`
//!   or `.npz` files
//! - [`pad_collection`], [`NormStats`], [`LabelEncoder`] and [`ClassWeights`]
//!   for turning them into rectangular, normalized, label-encoded arrays
//! - [`prepare`] and [`load_dataset`], the two file-backed stages
//! - [`DataLoader`] for batched iteration with seeded shuffling
//!
//! ## Example
//!
//! ```rust,ignore
//! use mlstm_data::{prepare, read_collection, PrepareConfig};
//!
//! let raw = read_collection("arabic_voice.npz".as_ref())?;
//! let prepared = prepare(&raw, &PrepareConfig::default())?;
//! prepared.save("data/arabic_voice".as_ref())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod cutoff;
mod dataset;
mod error;
mod io;
mod labels;
mod loader;
mod normalize;
mod pad;
mod prepare;
mod raw;
mod split;

pub use cutoff::{cutoff_sequence, pad_sequences, Cutoff};
pub use dataset::{load_dataset, DatasetContext, DatasetPaths, LoadOptions, SequenceDataset};
pub use error::{DataError, Result};
pub use io::{
    ensure_exists, read_collection, read_features, read_labels, read_npz_collection, read_ts,
    write_npy,
};
pub use labels::{ClassWeights, LabelEncoder};
pub use loader::{to_tensor, Batch, DataLoader, DataLoaderBuilder, DataLoaderIter};
pub use normalize::{mean_std, NormScope, NormStats, DEFAULT_EPSILON};
pub use pad::{pad_collection, PaddedDataset};
pub use prepare::{prepare, DatasetMetadata, PrepareConfig, PreparedDataset, METADATA_FILE};
pub use raw::{LengthStats, RawCollection};
pub use split::{SplitIndices, SplitPlan};
