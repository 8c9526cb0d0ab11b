//! Z-score normalization fitted on a training split.

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::pad::PaddedDataset;

/// Default epsilon added to the standard deviation.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Which cells share one mean/std pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormScope {
    /// One pair per variable.
    #[default]
    PerChannel,
    /// One pair over the whole array.
    Global,
    /// One pair per `(variable, step)` cell, computed across samples.
    PerPosition,
}

/// Fitted normalization statistics.
///
/// Statistics are population mean/std over real (unpadded) values. `mean` and
/// `std` are stored row-major with shape `(rows, cols)`: `(1, 1)` for
/// [`NormScope::Global`], `(V, 1)` for [`NormScope::PerChannel`] and `(V, L)`
/// for [`NormScope::PerPosition`].
///
/// # Example
///
/// ```rust
/// use mlstm_data::{NormScope, NormStats, PaddedDataset};
/// use ndarray::Array3;
///
/// let train = PaddedDataset::from_array(Array3::from_shape_fn((4, 2, 3), |(i, v, t)| {
///     (i + v * 10 + t) as f32
/// }));
/// let stats = NormStats::fit(&train, NormScope::PerChannel, 1e-8).unwrap();
/// let normalized = stats.apply(&train).unwrap();
/// assert_eq!(normalized.x().shape(), &[4, 2, 3]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormStats {
    scope: NormScope,
    epsilon: f64,
    preserve_padding: bool,
    rows: usize,
    cols: usize,
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl NormStats {
    /// Fit statistics on the real values of `padded`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptyDataset`] when the dataset holds no real
    /// values at all.
    pub fn fit(padded: &PaddedDataset, scope: NormScope, epsilon: f64) -> Result<Self> {
        let dims = padded.x().shape();
        let (n_vars, max_len) = (dims[1], dims[2]);
        let (rows, cols) = match scope {
            NormScope::Global => (1, 1),
            NormScope::PerChannel => (n_vars, 1),
            NormScope::PerPosition => (n_vars, max_len),
        };

        let mut sums = vec![0.0_f64; rows * cols];
        let mut counts = vec![0_usize; rows * cols];
        for_each_real(padded, |v, t, value| {
            let slot = slot(scope, cols, v, t);
            sums[slot] += f64::from(value);
            counts[slot] += 1;
        });

        if counts.iter().all(|&c| c == 0) {
            return Err(DataError::EmptyDataset);
        }

        let mean: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
            .collect();

        let mut squares = vec![0.0_f64; rows * cols];
        for_each_real(padded, |v, t, value| {
            let slot = slot(scope, cols, v, t);
            let diff = f64::from(value) - mean[slot];
            squares[slot] += diff * diff;
        });

        let std = squares
            .iter()
            .zip(&counts)
            .map(|(&sq, &c)| if c == 0 { 0.0 } else { (sq / c as f64).sqrt() })
            .collect();

        Ok(Self {
            scope,
            epsilon,
            preserve_padding: true,
            rows,
            cols,
            mean,
            std,
        })
    }

    /// Whether padding cells are left at exactly zero by [`apply`](Self::apply).
    #[must_use]
    pub fn with_preserve_padding(mut self, preserve_padding: bool) -> Self {
        self.preserve_padding = preserve_padding;
        self
    }

    /// Normalize `padded` with these statistics: `(x - mean) / (std + epsilon)`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] when `padded` does not match the
    /// layout the statistics were fitted on.
    pub fn apply(&self, padded: &PaddedDataset) -> Result<PaddedDataset> {
        let dims = padded.x().shape();
        let (n_vars, max_len) = (dims[1], dims[2]);
        let compatible = match self.scope {
            NormScope::Global => true,
            NormScope::PerChannel => n_vars == self.rows,
            NormScope::PerPosition => n_vars == self.rows && max_len == self.cols,
        };
        if !compatible {
            return Err(DataError::InvalidShape(format!(
                "{:?} statistics fitted on ({}, {}) cannot normalize data with {} variables and {} steps",
                self.scope, self.rows, self.cols, n_vars, max_len
            )));
        }

        let mut out = padded.clone();
        let lengths = padded.lengths().to_vec();
        for ((i, v, t), value) in out.x_mut().indexed_iter_mut() {
            if self.preserve_padding && t >= lengths[i] {
                continue;
            }
            let slot = slot(self.scope, self.cols, v, t);
            let scaled = (f64::from(*value) - self.mean[slot]) / (self.std[slot] + self.epsilon);
            *value = scaled as f32;
        }
        Ok(out)
    }

    /// The normalization scope.
    #[must_use]
    pub fn scope(&self) -> NormScope {
        self.scope
    }

    /// Epsilon added to the standard deviation.
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Fitted means, row-major `(rows, cols)`.
    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Fitted standard deviations, row-major `(rows, cols)`.
    #[must_use]
    pub fn std(&self) -> &[f64] {
        &self.std
    }
}

/// Mean and population standard deviation over every cell of `x`.
#[must_use]
pub fn mean_std(x: &Array3<f32>) -> (f64, f64) {
    let n = x.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = x.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let var = x
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    (mean, var.sqrt())
}

fn slot(scope: NormScope, cols: usize, v: usize, t: usize) -> usize {
    match scope {
        NormScope::Global => 0,
        NormScope::PerChannel => v,
        NormScope::PerPosition => v * cols + t,
    }
}

fn for_each_real(padded: &PaddedDataset, mut f: impl FnMut(usize, usize, f32)) {
    let x = padded.x();
    for (i, &length) in padded.lengths().iter().enumerate() {
        for v in 0..x.shape()[1] {
            for t in 0..length {
                f(v, t, x[[i, v, t]]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::pad_collection;
    use crate::raw::RawCollection;
    use ndarray::{s, Array2};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_per_channel_zero_mean_unit_std() {
        let x = Array3::from_shape_fn((5, 2, 4), |(i, v, t)| (i * 4 + t) as f32 + v as f32 * 100.0);
        let train = PaddedDataset::from_array(x);
        let stats = NormStats::fit(&train, NormScope::PerChannel, DEFAULT_EPSILON).unwrap();
        let out = stats.apply(&train).unwrap();

        for v in 0..2 {
            let channel = out.x().slice(s![.., v, ..]).to_owned();
            let n = channel.len() as f64;
            let mean = channel.iter().map(|&x| f64::from(x)).sum::<f64>() / n;
            let var = channel
                .iter()
                .map(|&x| (f64::from(x) - mean).powi(2))
                .sum::<f64>()
                / n;
            assert!(approx(mean, 0.0));
            assert!(approx(var.sqrt(), 1.0));
        }
    }

    #[test]
    fn test_test_split_uses_train_statistics() {
        let train = PaddedDataset::from_array(Array3::from_elem((2, 1, 2), 2.0));
        let mut train_x = train.x().clone();
        train_x[[1, 0, 1]] = 4.0;
        let train = PaddedDataset::from_array(train_x);
        let stats = NormStats::fit(&train, NormScope::Global, DEFAULT_EPSILON).unwrap();

        let test = PaddedDataset::from_array(Array3::from_elem((1, 1, 2), 10.0));
        let out = stats.apply(&test).unwrap();

        // train values [2, 2, 2, 4]: mean 2.5, std sqrt(0.75)
        let expected = (10.0 - 2.5) / (0.75_f64.sqrt() + DEFAULT_EPSILON);
        assert!(approx(f64::from(out.x()[[0, 0, 0]]), expected));
        assert!(approx(stats.mean()[0], 2.5));
    }

    #[test]
    fn test_zero_variance_maps_to_zero() {
        let train = PaddedDataset::from_array(Array3::from_elem((3, 2, 2), 7.0));
        let stats = NormStats::fit(&train, NormScope::PerChannel, DEFAULT_EPSILON).unwrap();
        let out = stats.apply(&train).unwrap();
        assert!(out.x().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_padding_stays_zero_and_is_ignored() {
        let raw = RawCollection::new(
            vec![Array2::from_elem((1, 2), 1.0), Array2::from_elem((1, 4), 3.0)],
            vec![0, 1],
        )
        .unwrap();
        let padded = pad_collection(&raw, None).unwrap();
        let stats = NormStats::fit(&padded, NormScope::PerChannel, DEFAULT_EPSILON).unwrap();

        // real values: [1, 1, 3, 3, 3, 3]
        assert!(approx(stats.mean()[0], 14.0 / 6.0));
        let out = stats.apply(&padded).unwrap();
        assert_eq!(out.x()[[0, 0, 2]], 0.0);
        assert_eq!(out.x()[[0, 0, 3]], 0.0);
        assert!(out.x()[[0, 0, 0]] < 0.0);

        let unpreserved = stats.with_preserve_padding(false).apply(&padded).unwrap();
        assert!(unpreserved.x()[[0, 0, 3]] < 0.0);
    }

    #[test]
    fn test_per_position_shape_check() {
        let train = PaddedDataset::from_array(Array3::from_shape_fn((3, 2, 4), |(i, _, _)| i as f32));
        let stats = NormStats::fit(&train, NormScope::PerPosition, DEFAULT_EPSILON).unwrap();
        assert_eq!(stats.mean().len(), 8);
        assert!(stats.mean().iter().all(|&m| approx(m, 1.0)));

        let shorter = PaddedDataset::from_array(Array3::zeros((1, 2, 3)));
        assert!(matches!(
            stats.apply(&shorter),
            Err(DataError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_mean_std() {
        let x = Array3::from_shape_vec((1, 1, 4), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let (mean, std) = mean_std(&x);
        assert!(approx(mean, 2.5));
        assert!(approx(std, 1.25_f64.sqrt()));
    }
}
