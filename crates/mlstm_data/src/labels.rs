//! Label encoding and class weights.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DataError, Result};

/// Maps an arbitrary integer label space onto `0..n_classes`.
///
/// Classes are the sorted distinct training labels, so the mapping is
/// monotonic.
///
/// # Example
///
/// ```rust
/// use mlstm_data::LabelEncoder;
///
/// let encoder = LabelEncoder::fit(&[7, 3, 7, 11]).unwrap();
/// assert_eq!(encoder.classes(), &[3, 7, 11]);
/// assert_eq!(encoder.transform(&[11, 3]).unwrap(), vec![2, 0]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<i64>,
}

impl LabelEncoder {
    /// Fit on a label sequence.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptyDataset`] when `labels` is empty.
    pub fn fit(labels: &[i64]) -> Result<Self> {
        if labels.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        let classes = labels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(Self { classes })
    }

    /// Rebuild an encoder from previously recorded classes.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptyDataset`] for no classes and
    /// [`DataError::Format`] unless `classes` is strictly increasing.
    pub fn from_classes(classes: Vec<i64>) -> Result<Self> {
        if classes.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        if classes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(DataError::Format(format!(
                "recorded classes {:?} are not sorted and distinct",
                classes
            )));
        }
        Ok(Self { classes })
    }

    /// Sorted distinct labels.
    #[must_use]
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Encode a single label.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnknownLabel`] for labels not seen during fitting.
    pub fn encode(&self, label: i64) -> Result<usize> {
        self.classes
            .binary_search(&label)
            .map_err(|_| DataError::UnknownLabel(label))
    }

    /// Encode a label sequence.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnknownLabel`] for labels not seen during fitting.
    pub fn transform(&self, labels: &[i64]) -> Result<Vec<usize>> {
        labels.iter().map(|&label| self.encode(label)).collect()
    }

    /// Map encoded classes back to the original labels.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexOutOfBounds`] for an encoded value outside
    /// `0..n_classes`.
    pub fn inverse_transform(&self, encoded: &[usize]) -> Result<Vec<i64>> {
        encoded
            .iter()
            .map(|&index| {
                self.classes
                    .get(index)
                    .copied()
                    .ok_or(DataError::IndexOutOfBounds {
                        index,
                        length: self.classes.len(),
                    })
            })
            .collect()
    }
}

/// Per-class loss weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    weights: Vec<f32>,
}

impl ClassWeights {
    /// Inverse-frequency weights: `n_samples / (n_classes * count[c])`.
    ///
    /// Classes absent from `encoded` get weight zero.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptyDataset`] for empty input and
    /// [`DataError::IndexOutOfBounds`] for a class index `>= n_classes`.
    pub fn balanced(encoded: &[usize], n_classes: usize) -> Result<Self> {
        if encoded.is_empty() || n_classes == 0 {
            return Err(DataError::EmptyDataset);
        }

        let mut counts = vec![0_usize; n_classes];
        for &class in encoded {
            let count = counts.get_mut(class).ok_or(DataError::IndexOutOfBounds {
                index: class,
                length: n_classes,
            })?;
            *count += 1;
        }

        let n = encoded.len() as f64;
        let weights = counts
            .iter()
            .enumerate()
            .map(|(class, &count)| {
                if count == 0 {
                    warn!(class, "class has no training samples, weight set to 0");
                    0.0
                } else {
                    (n / (n_classes as f64 * count as f64)) as f32
                }
            })
            .collect();

        Ok(Self { weights })
    }

    /// All-ones weights.
    #[must_use]
    pub fn uniform(n_classes: usize) -> Self {
        Self {
            weights: vec![1.0; n_classes],
        }
    }

    /// Weight of each class.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.weights.len()
    }

    /// Weight of each sample, looked up by its class.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexOutOfBounds`] for an unknown class.
    pub fn per_sample(&self, encoded: &[usize]) -> Result<Vec<f32>> {
        encoded
            .iter()
            .map(|&class| {
                self.weights
                    .get(class)
                    .copied()
                    .ok_or(DataError::IndexOutOfBounds {
                        index: class,
                        length: self.weights.len(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_and_equal_weights() {
        let labels = [1, 1, 2, 2, 3, 3];
        let encoder = LabelEncoder::fit(&labels).unwrap();
        let encoded = encoder.transform(&labels).unwrap();
        assert_eq!(encoded, vec![0, 0, 1, 1, 2, 2]);

        let weights = ClassWeights::balanced(&encoded, encoder.n_classes()).unwrap();
        assert_eq!(weights.weights(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_monotonic_bijection() {
        let labels = [40, -3, 12, 40, 7, -3];
        let encoder = LabelEncoder::fit(&labels).unwrap();
        assert_eq!(encoder.classes(), &[-3, 7, 12, 40]);

        let encoded = encoder.transform(&labels).unwrap();
        assert_eq!(encoder.inverse_transform(&encoded).unwrap(), labels.to_vec());
        for pair in encoder.classes().windows(2) {
            assert!(encoder.encode(pair[0]).unwrap() < encoder.encode(pair[1]).unwrap());
        }
    }

    #[test]
    fn test_from_classes() {
        let encoder = LabelEncoder::from_classes(vec![3, 7, 11]).unwrap();
        assert_eq!(encoder, LabelEncoder::fit(&[11, 3, 7, 3]).unwrap());
        assert!(matches!(
            LabelEncoder::from_classes(vec![7, 3]),
            Err(DataError::Format(_))
        ));
        assert!(LabelEncoder::from_classes(Vec::new()).is_err());
    }

    #[test]
    fn test_unknown_label() {
        let encoder = LabelEncoder::fit(&[0, 1]).unwrap();
        assert!(matches!(encoder.encode(5), Err(DataError::UnknownLabel(5))));
        assert!(encoder.inverse_transform(&[2]).is_err());
    }

    #[test]
    fn test_balanced_weights_inverse_frequency() {
        let encoded = [0, 0, 0, 1];
        let weights = ClassWeights::balanced(&encoded, 2).unwrap();
        assert!((weights.weights()[0] - 4.0 / 6.0).abs() < 1e-6);
        assert!((weights.weights()[1] - 2.0).abs() < 1e-6);

        let total: f32 = [3.0, 1.0]
            .iter()
            .zip(weights.weights())
            .map(|(count, w)| count * w)
            .sum();
        assert!((total - encoded.len() as f32).abs() < 1e-5);
    }

    #[test]
    fn test_per_sample_and_uniform() {
        let weights = ClassWeights::balanced(&[0, 1, 1, 1], 2).unwrap();
        let per_sample = weights.per_sample(&[1, 0]).unwrap();
        assert_eq!(per_sample, vec![weights.weights()[1], weights.weights()[0]]);
        assert_eq!(ClassWeights::uniform(3).weights(), &[1.0, 1.0, 1.0]);
        assert!(weights.per_sample(&[2]).is_err());
    }

    #[test]
    fn test_absent_class_gets_zero() {
        let weights = ClassWeights::balanced(&[0, 0], 2).unwrap();
        assert_eq!(weights.weights()[1], 0.0);
    }
}
