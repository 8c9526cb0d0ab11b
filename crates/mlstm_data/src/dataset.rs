//! Loading prepared datasets.

use std::path::{Path, PathBuf};

use ndarray::{s, Array3, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cutoff::{cutoff_sequence, pad_sequences, Cutoff};
use crate::error::{DataError, Result};
use crate::io::{ensure_exists, read_features, read_labels};
use crate::labels::{ClassWeights, LabelEncoder};
use crate::normalize::{NormScope, NormStats};
use crate::pad::PaddedDataset;
use crate::prepare::{DatasetMetadata, METADATA_FILE};
use mlstm_core::DatasetShape;

/// A labeled set of fixed-length samples with optional per-sample weights.
///
/// Stores features in `(N, V, L)` format.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    x: Array3<f32>,
    y: Vec<usize>,
    weights: Option<Vec<f32>>,
}

impl SequenceDataset {
    /// Create a dataset from features and encoded labels.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] if the sample counts differ.
    pub fn new(x: Array3<f32>, y: Vec<usize>) -> Result<Self> {
        if x.shape()[0] != y.len() {
            return Err(DataError::InvalidShape(format!(
                "x has {} samples but y has {} labels",
                x.shape()[0],
                y.len()
            )));
        }
        Ok(Self { x, y, weights: None })
    }

    /// Attach per-sample weights.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] on a length mismatch.
    pub fn with_weights(mut self, weights: Vec<f32>) -> Result<Self> {
        if weights.len() != self.len() {
            return Err(DataError::InvalidShape(format!(
                "Expected {} weights but got {}",
                self.len(),
                weights.len()
            )));
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Whether the dataset has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Number of variables.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.x.shape()[1]
    }

    /// Sequence length.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.x.shape()[2]
    }

    /// Features.
    #[must_use]
    pub fn x(&self) -> &Array3<f32> {
        &self.x
    }

    /// Encoded labels.
    #[must_use]
    pub fn y(&self) -> &[usize] {
        &self.y
    }

    /// Per-sample weights, if attached.
    #[must_use]
    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }
}

/// Locations of the four prepared arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPaths {
    /// Training features.
    pub x_train: PathBuf,
    /// Training labels.
    pub y_train: PathBuf,
    /// Test features.
    pub x_test: PathBuf,
    /// Test labels.
    pub y_test: PathBuf,
    /// `dataset.json` written by the prepare stage; optional.
    #[serde(default)]
    pub metadata: PathBuf,
}

impl DatasetPaths {
    /// The standard file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            x_train: dir.join("X_train.npy"),
            y_train: dir.join("y_train.npy"),
            x_test: dir.join("X_test.npy"),
            y_test: dir.join("y_test.npy"),
            metadata: dir.join(METADATA_FILE),
        }
    }

    fn all(&self) -> [&Path; 4] {
        [&self.x_train, &self.y_train, &self.x_test, &self.y_test]
    }
}

/// Options for [`load_dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Whether the features are time series.
    pub is_timeseries: bool,
    /// Apply global z-score normalization with training statistics.
    pub normalize_timeseries: bool,
    /// Added to the standard deviation when normalizing.
    pub x_tol: f64,
    /// Keep trailing all-zero steps at zero when normalizing, so the
    /// model's timestep mask still sees them as padding.
    pub preserve_padding: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            is_timeseries: true,
            normalize_timeseries: false,
            x_tol: 1e-8,
            preserve_padding: true,
        }
    }
}

/// Train and test splits ready for a model.
#[derive(Debug, Clone)]
pub struct DatasetContext {
    x_train: Array3<f32>,
    y_train: Vec<usize>,
    x_test: Array3<f32>,
    y_test: Vec<usize>,
    encoder: LabelEncoder,
    is_timeseries: bool,
}

/// Load the four prepared arrays.
///
/// Every file is checked for existence before any is read. When the prepare
/// stage's `dataset.json` sits next to the arrays, the stored labels are
/// already class indices and the recorded classes become the encoder;
/// otherwise an encoder is fitted on the training labels. With
/// `normalize_timeseries`, both splits are normalized by the global
/// training mean and std.
///
/// # Errors
///
/// Returns [`DataError::FileNotFound`] naming the first missing file,
/// format errors from reading, and [`DataError::UnknownLabel`] for test
/// labels absent from training.
pub fn load_dataset(paths: &DatasetPaths, options: &LoadOptions) -> Result<DatasetContext> {
    for path in paths.all() {
        ensure_exists(path)?;
    }
    info!(train = %paths.x_train.display(), test = %paths.x_test.display(), "loading dataset");

    let mut x_train = read_features(&paths.x_train)?;
    let train_labels = read_labels(&paths.y_train)?;
    let mut x_test = read_features(&paths.x_test)?;
    let test_labels = read_labels(&paths.y_test)?;

    let train_shape = DatasetShape::from_dims(x_train.shape())?;
    let test_shape = DatasetShape::from_dims(x_test.shape())?;
    train_shape.ensure_same_layout(&test_shape)?;
    check_counts(train_shape.samples(), train_labels.len(), "train")?;
    check_counts(test_shape.samples(), test_labels.len(), "test")?;

    let recorded = if paths.metadata.is_file() {
        Some(DatasetMetadata::load(&paths.metadata)?)
    } else {
        None
    };

    let (encoder, y_train, y_test) = match &recorded {
        Some(metadata) => {
            let encoder = LabelEncoder::from_classes(metadata.classes.clone())?;
            let y_train = class_indices(&train_labels, encoder.n_classes(), &paths.y_train)?;
            let y_test = class_indices(&test_labels, encoder.n_classes(), &paths.y_test)?;
            info!(classes = ?encoder.classes(), "using classes recorded by the prepare stage");
            (encoder, y_train, y_test)
        }
        None => {
            let encoder = LabelEncoder::fit(&train_labels)?;
            let y_train = encoder.transform(&train_labels)?;
            let y_test = encoder.transform(&test_labels)?;
            (encoder, y_train, y_test)
        }
    };

    if options.is_timeseries && options.normalize_timeseries {
        if recorded.is_some() {
            warn!("arrays were already normalized by the prepare stage; normalizing again");
        }
        let wrap = |x: Array3<f32>| {
            if options.preserve_padding {
                PaddedDataset::from_trailing_zeros(x)
            } else {
                PaddedDataset::from_array(x)
            }
        };
        let train = wrap(x_train);
        let stats = NormStats::fit(&train, NormScope::Global, options.x_tol)?
            .with_preserve_padding(options.preserve_padding);
        x_train = stats.apply(&train)?.into_array();
        x_test = stats.apply(&wrap(x_test))?.into_array();
    }

    info!(
        train_samples = train_shape.samples(),
        test_samples = test_shape.samples(),
        n_classes = encoder.n_classes(),
        seq_len = train_shape.steps(),
        "dataset loaded"
    );

    Ok(DatasetContext {
        x_train,
        y_train,
        x_test,
        y_test,
        encoder,
        is_timeseries: options.is_timeseries,
    })
}

/// Stored labels that must already be indices below `n_classes`.
fn class_indices(labels: &[i64], n_classes: usize, path: &Path) -> Result<Vec<usize>> {
    labels
        .iter()
        .map(|&label| match usize::try_from(label) {
            Ok(index) if index < n_classes => Ok(index),
            _ => Err(DataError::Format(format!(
                "{} holds label {}, but {} records {} classes",
                path.display(),
                label,
                METADATA_FILE,
                n_classes
            ))),
        })
        .collect()
}

fn check_counts(samples: usize, labels: usize, split: &str) -> Result<()> {
    if samples != labels {
        return Err(DataError::InvalidShape(format!(
            "{} split has {} samples but {} labels",
            split, samples, labels
        )));
    }
    Ok(())
}

impl DatasetContext {
    /// Build a context from in-memory arrays and original labels.
    ///
    /// # Errors
    ///
    /// Returns shape or label errors as [`load_dataset`] does.
    pub fn from_arrays(
        x_train: Array3<f32>,
        train_labels: &[i64],
        x_test: Array3<f32>,
        test_labels: &[i64],
    ) -> Result<Self> {
        let train_shape = DatasetShape::from_dims(x_train.shape())?;
        train_shape.ensure_same_layout(&DatasetShape::from_dims(x_test.shape())?)?;
        check_counts(train_shape.samples(), train_labels.len(), "train")?;
        check_counts(x_test.shape()[0], test_labels.len(), "test")?;

        let encoder = LabelEncoder::fit(train_labels)?;
        Ok(Self {
            y_train: encoder.transform(train_labels)?,
            y_test: encoder.transform(test_labels)?,
            x_train,
            x_test,
            encoder,
            is_timeseries: true,
        })
    }

    /// Training features.
    #[must_use]
    pub fn x_train(&self) -> &Array3<f32> {
        &self.x_train
    }

    /// Encoded training labels.
    #[must_use]
    pub fn y_train(&self) -> &[usize] {
        &self.y_train
    }

    /// Test features.
    #[must_use]
    pub fn x_test(&self) -> &Array3<f32> {
        &self.x_test
    }

    /// Encoded test labels.
    #[must_use]
    pub fn y_test(&self) -> &[usize] {
        &self.y_test
    }

    /// The label encoder fitted on the training labels.
    #[must_use]
    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    /// Original labels, indexed by encoded class.
    #[must_use]
    pub fn classes(&self) -> &[i64] {
        self.encoder.classes()
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.encoder.n_classes()
    }

    /// Variables per sample.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.x_train.shape()[1]
    }

    /// Time steps per sample.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.x_train.shape()[2]
    }

    /// Whether the features are time series.
    #[must_use]
    pub fn is_timeseries(&self) -> bool {
        self.is_timeseries
    }

    /// Balanced or uniform class weights from the training labels.
    ///
    /// # Errors
    ///
    /// Propagates [`ClassWeights::balanced`] errors.
    pub fn class_weights(&self, balanced: bool) -> Result<ClassWeights> {
        if balanced {
            ClassWeights::balanced(&self.y_train, self.n_classes())
        } else {
            Ok(ClassWeights::uniform(self.n_classes()))
        }
    }

    /// Training split as a [`SequenceDataset`] with per-sample weights.
    ///
    /// # Errors
    ///
    /// Propagates weight lookup errors.
    pub fn train_dataset(&self, weights: &ClassWeights) -> Result<SequenceDataset> {
        SequenceDataset::new(self.x_train.clone(), self.y_train.clone())?
            .with_weights(weights.per_sample(&self.y_train)?)
    }

    /// Test split as a [`SequenceDataset`].
    ///
    /// # Errors
    ///
    /// Never fails for a consistent context.
    pub fn test_dataset(&self) -> Result<SequenceDataset> {
        SequenceDataset::new(self.x_test.clone(), self.y_test.clone())
    }

    /// Make both splits `target_len` steps long.
    ///
    /// Longer data is trimmed according to `cutoff`; shorter data is
    /// right-padded with zeros.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::CutoffRequired`] when the data is longer than
    /// `target_len` and no cutoff is given.
    pub fn fit_to_length(&self, target_len: usize, cutoff: Option<Cutoff>) -> Result<Self> {
        let len = self.seq_len();
        let reshape = |x: &Array3<f32>| -> Result<Array3<f32>> {
            if len > target_len {
                let cutoff = cutoff.ok_or(DataError::CutoffRequired {
                    expected: target_len,
                    got: len,
                })?;
                Ok(cutoff_sequence(x, target_len, cutoff))
            } else {
                pad_sequences(x, target_len)
            }
        };

        if len != target_len {
            info!(from = len, to = target_len, ?cutoff, "fitting sequence length");
        }
        Ok(Self {
            x_train: reshape(&self.x_train)?,
            x_test: reshape(&self.x_test)?,
            ..self.clone()
        })
    }

    /// Keep only the first `n` test samples.
    #[must_use]
    pub fn subset_test(&self, n: usize) -> Self {
        let n = n.min(self.y_test.len());
        Self {
            x_test: self.x_test.slice(s![..n, .., ..]).to_owned(),
            y_test: self.y_test[..n].to_vec(),
            ..self.clone()
        }
    }

    /// Number of test samples.
    #[must_use]
    pub fn n_test(&self) -> usize {
        self.x_test.len_of(Axis(0))
    }
}
