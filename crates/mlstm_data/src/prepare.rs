//! The preparation stage: raw collection in, four `.npy` artifacts out.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::DatasetPaths;
use crate::error::Result;
use crate::io::write_npy;
use crate::labels::LabelEncoder;
use crate::normalize::{mean_std, NormScope, NormStats, DEFAULT_EPSILON};
use crate::pad::pad_collection;
use crate::raw::RawCollection;
use crate::split::SplitPlan;
use mlstm_core::DatasetShape;

/// Name of the metadata file written next to the arrays.
pub const METADATA_FILE: &str = "dataset.json";

/// Options for [`prepare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    /// How to split the collection.
    pub split: SplitPlan,
    /// Which cells share normalization statistics.
    pub norm_scope: NormScope,
    /// Added to the standard deviation.
    pub epsilon: f64,
    /// Keep padding cells at exactly zero after normalization.
    pub preserve_padding: bool,
    /// Fixed time-axis length; the longest training sample when `None`.
    pub max_len: Option<usize>,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            split: SplitPlan::default(),
            norm_scope: NormScope::PerChannel,
            epsilon: DEFAULT_EPSILON,
            preserve_padding: true,
            max_len: None,
        }
    }
}

impl PrepareConfig {
    /// Set the split plan.
    #[must_use]
    pub fn with_split(mut self, split: SplitPlan) -> Self {
        self.split = split;
        self
    }

    /// Set the normalization scope.
    #[must_use]
    pub fn with_norm_scope(mut self, norm_scope: NormScope) -> Self {
        self.norm_scope = norm_scope;
        self
    }

    /// Set epsilon.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set padding preservation.
    #[must_use]
    pub fn with_preserve_padding(mut self, preserve_padding: bool) -> Self {
        self.preserve_padding = preserve_padding;
        self
    }

    /// Set a fixed time-axis length.
    #[must_use]
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

/// Metadata persisted as `dataset.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Original labels, indexed by encoded class.
    pub classes: Vec<i64>,
    /// Variables per sample.
    pub n_vars: usize,
    /// Fixed time-axis length.
    pub seq_len: usize,
    /// True lengths of the training samples.
    pub train_lengths: Vec<usize>,
    /// True lengths of the test samples.
    pub test_lengths: Vec<usize>,
    /// Statistics fitted on the training split.
    pub normalization: NormStats,
}

impl DatasetMetadata {
    /// Read metadata from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error.
    pub fn load(path: &Path) -> Result<Self> {
        crate::io::ensure_exists(path)?;
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Padded, normalized, label-encoded train and test splits.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    x_train: Array3<f32>,
    y_train: Vec<usize>,
    x_test: Array3<f32>,
    y_test: Vec<usize>,
    encoder: LabelEncoder,
    metadata: DatasetMetadata,
}

impl PreparedDataset {
    /// Training features `(N, V, L)`.
    #[must_use]
    pub fn x_train(&self) -> &Array3<f32> {
        &self.x_train
    }

    /// Encoded training labels.
    #[must_use]
    pub fn y_train(&self) -> &[usize] {
        &self.y_train
    }

    /// Test features `(N, V, L)`.
    #[must_use]
    pub fn x_test(&self) -> &Array3<f32> {
        &self.x_test
    }

    /// Encoded test labels.
    #[must_use]
    pub fn y_test(&self) -> &[usize] {
        &self.y_test
    }

    /// The fitted label encoder.
    #[must_use]
    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    /// Metadata written alongside the arrays.
    #[must_use]
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Write `X_train.npy`, `y_train.npy`, `X_test.npy`, `y_test.npy` and
    /// `dataset.json` into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O, format or serialization error.
    pub fn save(&self, dir: &Path) -> Result<DatasetPaths> {
        fs::create_dir_all(dir)?;
        let paths = DatasetPaths::in_dir(dir);

        write_npy(&paths.x_train, &self.x_train)?;
        write_npy(&paths.y_train, &to_label_array(&self.y_train))?;
        write_npy(&paths.x_test, &self.x_test)?;
        write_npy(&paths.y_test, &to_label_array(&self.y_test))?;

        let file = fs::File::create(&paths.metadata)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &self.metadata)?;

        info!(dir = %dir.display(), "saved prepared dataset");
        Ok(paths)
    }
}

fn to_label_array(labels: &[usize]) -> Array1<i64> {
    labels.iter().map(|&l| l as i64).collect()
}

/// Split, pad, normalize and label-encode a raw collection.
///
/// The test split is padded to the training length and normalized with the
/// training statistics. A test sample longer than every training sample is
/// an error, as is a test label absent from the training split.
///
/// # Errors
///
/// Propagates split, padding, normalization and label errors.
pub fn prepare(raw: &RawCollection, config: &PrepareConfig) -> Result<PreparedDataset> {
    let stats = raw.length_stats();
    info!(max = stats.max, min = stats.min, "sequence lengths");

    let split = config.split.indices(raw.labels())?;
    let train_raw = raw.select(&split.train)?;
    let test_raw = raw.select(&split.test)?;

    let train_padded = pad_collection(&train_raw, config.max_len)?;
    let test_padded = pad_collection(&test_raw, Some(train_padded.max_len()))?;

    let norm = NormStats::fit(&train_padded, config.norm_scope, config.epsilon)?
        .with_preserve_padding(config.preserve_padding);
    let train_norm = norm.apply(&train_padded)?;
    let test_norm = norm.apply(&test_padded)?;

    let encoder = LabelEncoder::fit(train_raw.labels())?;
    let y_train = encoder.transform(train_raw.labels())?;
    let y_test = encoder.transform(test_raw.labels())?;

    let train_shape: DatasetShape = train_norm.shape();
    let test_shape: DatasetShape = test_norm.shape();
    let (train_mean, train_std) = mean_std(train_norm.x());
    let (test_mean, test_std) = mean_std(test_norm.x());
    info!(train = %train_shape, test = %test_shape, "prepared shapes");
    info!(train_mean, train_std, test_mean, test_std, "normalized statistics");
    info!(n_classes = encoder.n_classes(), "classes");

    let metadata = DatasetMetadata {
        classes: encoder.classes().to_vec(),
        n_vars: train_shape.vars(),
        seq_len: train_shape.steps(),
        train_lengths: train_norm.lengths().to_vec(),
        test_lengths: test_norm.lengths().to_vec(),
        normalization: norm,
    };

    Ok(PreparedDataset {
        x_train: train_norm.into_array(),
        y_train,
        x_test: test_norm.into_array(),
        y_test,
        encoder,
        metadata,
    })
}
