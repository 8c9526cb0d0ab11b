//! Train/test splitting.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use mlstm_core::Seed;

/// Strategy for dividing a collection into train and test indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitPlan {
    /// Contiguous blocks of `block_size` samples (one block per class in
    /// class-sorted recordings). Each block gives its first
    /// `train_per_block` samples to train and the next `test_per_block` to
    /// test.
    Blocked {
        /// Samples per block.
        block_size: usize,
        /// Leading samples of each block assigned to train.
        train_per_block: usize,
        /// Following samples of each block assigned to test.
        test_per_block: usize,
    },
    /// Per-class seeded shuffle keeping the class distribution.
    Stratified {
        /// Fraction of each class assigned to test.
        test_ratio: f32,
        /// Master seed; the split stream is derived with key `"split"`.
        seed: Seed,
    },
    /// Explicit index lists.
    Provided {
        /// Train indices.
        train: Vec<usize>,
        /// Test indices.
        test: Vec<usize>,
    },
}

impl Default for SplitPlan {
    fn default() -> Self {
        Self::Stratified {
            test_ratio: 0.25,
            seed: Seed::default(),
        }
    }
}

/// Train and test indices produced by a [`SplitPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    /// Indices of training samples.
    pub train: Vec<usize>,
    /// Indices of test samples.
    pub test: Vec<usize>,
}

impl SplitPlan {
    /// Compute the split for a collection with the given labels.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::SplitError`] when the plan does not fit the
    /// collection.
    pub fn indices(&self, labels: &[i64]) -> Result<SplitIndices> {
        let n = labels.len();
        if n == 0 {
            return Err(DataError::EmptyDataset);
        }

        let split = match self {
            Self::Blocked {
                block_size,
                train_per_block,
                test_per_block,
            } => blocked(n, *block_size, *train_per_block, *test_per_block)?,
            Self::Stratified { test_ratio, seed } => stratified(labels, *test_ratio, *seed)?,
            Self::Provided { train, test } => provided(n, train, test)?,
        };

        if split.train.is_empty() || split.test.is_empty() {
            return Err(DataError::SplitError(format!(
                "split produced {} train and {} test samples",
                split.train.len(),
                split.test.len()
            )));
        }
        Ok(split)
    }
}

fn blocked(
    n: usize,
    block_size: usize,
    train_per_block: usize,
    test_per_block: usize,
) -> Result<SplitIndices> {
    if block_size == 0 {
        return Err(DataError::SplitError("block_size must be > 0".to_string()));
    }
    if train_per_block + test_per_block > block_size {
        return Err(DataError::SplitError(format!(
            "{} train + {} test samples do not fit a block of {}",
            train_per_block, test_per_block, block_size
        )));
    }
    if n % block_size != 0 {
        return Err(DataError::SplitError(format!(
            "{} samples are not a whole number of blocks of {}",
            n, block_size
        )));
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for start in (0..n).step_by(block_size) {
        train.extend(start..start + train_per_block);
        test.extend(start + train_per_block..start + train_per_block + test_per_block);
    }
    Ok(SplitIndices { train, test })
}

fn stratified(labels: &[i64], test_ratio: f32, seed: Seed) -> Result<SplitIndices> {
    if test_ratio <= 0.0 || test_ratio >= 1.0 {
        return Err(DataError::SplitError(format!(
            "test_ratio must be between 0 and 1, got {}",
            test_ratio
        )));
    }

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(index);
    }

    let mut rng = seed.derive("split").to_rng();
    let mut train = Vec::new();
    let mut test = Vec::new();
    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        let len = indices.len();
        if len < 2 {
            train.extend_from_slice(indices);
            continue;
        }
        let n_test = ((len as f32 * test_ratio).round() as usize).clamp(1, len - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(SplitIndices { train, test })
}

fn provided(n: usize, train: &[usize], test: &[usize]) -> Result<SplitIndices> {
    let mut seen = vec![false; n];
    for &index in train.iter().chain(test) {
        let slot = seen.get_mut(index).ok_or(DataError::IndexOutOfBounds { index, length: n })?;
        if *slot {
            return Err(DataError::SplitError(format!(
                "index {} appears more than once",
                index
            )));
        }
        *slot = true;
    }
    Ok(SplitIndices {
        train: train.to_vec(),
        test: test.to_vec(),
    })
}
