//! Raw, variable-length sample collections.

use ndarray::{Array2, Axis};

use crate::error::{DataError, Result};

/// Minimum and maximum time-axis length over a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthStats {
    /// Shortest sample.
    pub min: usize,
    /// Longest sample.
    pub max: usize,
}

/// A labeled collection of variable-length multivariate samples.
///
/// Each sample is a `(V, T_i)` array: all samples share the variable count
/// `V`, the time axis length `T_i` varies per sample.
#[derive(Debug, Clone)]
pub struct RawCollection {
    samples: Vec<Array2<f32>>,
    labels: Vec<i64>,
    n_vars: usize,
}

impl RawCollection {
    /// Build a collection, checking that labels and variable counts line up.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptyDataset`] for an empty collection and
    /// [`DataError::InvalidShape`] when the label count differs from the
    /// sample count or a sample has a different number of variables.
    pub fn new(samples: Vec<Array2<f32>>, labels: Vec<i64>) -> Result<Self> {
        let first = samples.first().ok_or(DataError::EmptyDataset)?;
        if samples.len() != labels.len() {
            return Err(DataError::InvalidShape(format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            )));
        }

        let n_vars = first.nrows();
        if let Some((index, sample)) = samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.nrows() != n_vars)
        {
            return Err(DataError::InvalidShape(format!(
                "sample {} has {} variables, expected {}",
                index,
                sample.nrows(),
                n_vars
            )));
        }

        Ok(Self {
            samples,
            labels,
            n_vars,
        })
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the collection has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of variables per sample.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    /// The samples.
    #[must_use]
    pub fn samples(&self) -> &[Array2<f32>] {
        &self.samples
    }

    /// The labels, parallel to [`samples`](Self::samples).
    #[must_use]
    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    /// True time-axis length of every sample.
    #[must_use]
    pub fn lengths(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.len_of(Axis(1))).collect()
    }

    /// Shortest and longest time-axis length.
    #[must_use]
    pub fn length_stats(&self) -> LengthStats {
        let lengths = self.lengths();
        LengthStats {
            min: lengths.iter().copied().min().unwrap_or(0),
            max: lengths.iter().copied().max().unwrap_or(0),
        }
    }

    /// Sub-collection containing the given indices, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexOutOfBounds`] for an invalid index and
    /// [`DataError::EmptyDataset`] when `indices` is empty.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let mut samples = Vec::with_capacity(indices.len());
        let mut labels = Vec::with_capacity(indices.len());
        for &index in indices {
            let sample = self.samples.get(index).ok_or(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            })?;
            samples.push(sample.clone());
            labels.push(self.labels[index]);
        }
        Self::new(samples, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(vars: usize, steps: usize, fill: f32) -> Array2<f32> {
        Array2::from_elem((vars, steps), fill)
    }

    #[test]
    fn test_length_stats() {
        let raw = RawCollection::new(
            vec![sample(2, 3, 1.0), sample(2, 5, 2.0), sample(2, 4, 3.0)],
            vec![1, 2, 3],
        )
        .unwrap();
        assert_eq!(raw.lengths(), vec![3, 5, 4]);
        assert_eq!(raw.length_stats(), LengthStats { min: 3, max: 5 });
        assert_eq!(raw.n_vars(), 2);
    }

    #[test]
    fn test_rejects_mismatched_labels() {
        let err = RawCollection::new(vec![sample(2, 3, 0.0)], vec![1, 2]).unwrap_err();
        assert!(matches!(err, DataError::InvalidShape(_)));
    }

    #[test]
    fn test_rejects_mismatched_vars() {
        let err =
            RawCollection::new(vec![sample(2, 3, 0.0), sample(3, 3, 0.0)], vec![1, 2]).unwrap_err();
        assert!(err.to_string().contains("sample 1 has 3 variables"));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            RawCollection::new(Vec::new(), Vec::new()),
            Err(DataError::EmptyDataset)
        ));
    }

    #[test]
    fn test_select() {
        let raw = RawCollection::new(
            vec![sample(1, 1, 0.0), sample(1, 2, 1.0), sample(1, 3, 2.0)],
            vec![10, 20, 30],
        )
        .unwrap();
        let sub = raw.select(&[2, 0]).unwrap();
        assert_eq!(sub.labels(), &[30, 10]);
        assert_eq!(sub.lengths(), vec![3, 1]);
        assert!(raw.select(&[3]).is_err());
    }
}
