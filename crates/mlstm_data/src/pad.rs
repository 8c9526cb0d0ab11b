//! Right zero-padding of variable-length samples into a rectangular array.

use ndarray::{s, Array3};

use crate::error::{DataError, Result};
use crate::raw::RawCollection;
use mlstm_core::DatasetShape;

/// A `(N, V, L)` array of right-padded samples and their true lengths.
///
/// Invariant: `lengths[i] <= L` and `x[[i, v, t]] == 0.0` for every
/// `t >= lengths[i]` until the array is normalized without
/// `preserve_padding`.
#[derive(Debug, Clone)]
pub struct PaddedDataset {
    x: Array3<f32>,
    lengths: Vec<usize>,
}

impl PaddedDataset {
    /// Wrap an already rectangular array, treating every step as real.
    #[must_use]
    pub fn from_array(x: Array3<f32>) -> Self {
        let lengths = vec![x.shape()[2]; x.shape()[0]];
        Self { x, lengths }
    }

    /// Wrap an already rectangular array, inferring each true length from
    /// its trailing steps whose features are all exactly zero.
    #[must_use]
    pub fn from_trailing_zeros(x: Array3<f32>) -> Self {
        let lengths = x
            .outer_iter()
            .map(|sample| {
                let steps = sample.shape()[1];
                (0..steps)
                    .rev()
                    .find(|&t| sample.column(t).iter().any(|&v| v != 0.0))
                    .map_or(0, |t| t + 1)
            })
            .collect();
        Self { x, lengths }
    }

    /// Wrap an array together with known true lengths.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidShape`] when the length count differs from
    /// the sample count or a length exceeds the time axis.
    pub fn from_parts(x: Array3<f32>, lengths: Vec<usize>) -> Result<Self> {
        let (n, max_len) = (x.shape()[0], x.shape()[2]);
        if lengths.len() != n {
            return Err(DataError::InvalidShape(format!(
                "{} lengths for {} samples",
                lengths.len(),
                n
            )));
        }
        if let Some(&length) = lengths.iter().find(|&&l| l > max_len) {
            return Err(DataError::InvalidShape(format!(
                "length {} exceeds the time axis {}",
                length, max_len
            )));
        }
        Ok(Self { x, lengths })
    }

    /// The padded array.
    #[must_use]
    pub fn x(&self) -> &Array3<f32> {
        &self.x
    }

    /// Mutable access for in-place normalization.
    pub(crate) fn x_mut(&mut self) -> &mut Array3<f32> {
        &mut self.x
    }

    /// Consume into the padded array.
    #[must_use]
    pub fn into_array(self) -> Array3<f32> {
        self.x
    }

    /// True (unpadded) length of each sample.
    #[must_use]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Fixed time-axis length.
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.x.shape()[2]
    }

    /// Shape metadata.
    #[must_use]
    pub fn shape(&self) -> DatasetShape {
        let dims = self.x.shape();
        DatasetShape::new(dims[0], dims[1], dims[2])
    }
}

/// Pad every sample of `raw` at the tail of its time axis.
///
/// Allocates a zero-filled `(N, V, max_len)` array and copies each sample
/// into the left-aligned prefix of its row. `max_len` defaults to the
/// longest sample. Samples are never truncated and never left-padded.
///
/// # Errors
///
/// Returns [`DataError::SequenceTooLong`] when a sample is longer than an
/// explicitly requested `max_len`.
///
/// # Example
///
/// ```rust
/// use mlstm_data::{pad_collection, RawCollection};
/// use ndarray::Array2;
///
/// let raw = RawCollection::new(
///     vec![Array2::ones((2, 3)), Array2::ones((2, 5))],
///     vec![0, 1],
/// ).unwrap();
/// let padded = pad_collection(&raw, None).unwrap();
/// assert_eq!(padded.x().shape(), &[2, 2, 5]);
/// assert_eq!(padded.x()[[0, 1, 4]], 0.0);
/// ```
pub fn pad_collection(raw: &RawCollection, max_len: Option<usize>) -> Result<PaddedDataset> {
    let lengths = raw.lengths();
    let observed = lengths.iter().copied().max().unwrap_or(0);
    let max_len = max_len.unwrap_or(observed);

    if let Some((index, &length)) = lengths.iter().enumerate().find(|(_, &l)| l > max_len) {
        return Err(DataError::SequenceTooLong {
            index,
            length,
            max_len,
        });
    }

    let mut x = Array3::<f32>::zeros((raw.len(), raw.n_vars(), max_len));
    for (i, (sample, &length)) in raw.samples().iter().zip(&lengths).enumerate() {
        x.slice_mut(s![i, .., ..length]).assign(sample);
    }

    Ok(PaddedDataset { x, lengths })
}
