//! Batched iteration over a [`SequenceDataset`].

use burn::prelude::*;
use burn::tensor::TensorData;
use ndarray::{Array3, Axis};
use rand::seq::SliceRandom;

use crate::dataset::SequenceDataset;
use crate::error::{DataError, Result};
use mlstm_core::Seed;

/// One mini-batch.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    /// Features `[batch, vars, steps]`.
    pub x: Tensor<B, 3>,
    /// Encoded class targets `[batch]`.
    pub targets: Tensor<B, 1, Int>,
    /// Per-sample loss weights `[batch]`; ones when the dataset has none.
    pub weights: Tensor<B, 1>,
    /// Encoded class targets on the host.
    pub labels: Vec<usize>,
}

impl<B: Backend> Batch<B> {
    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Convert an `(N, V, L)` array into a tensor on `device`.
#[must_use]
pub fn to_tensor<B: Backend>(x: &Array3<f32>, device: &B::Device) -> Tensor<B, 3> {
    let shape = [x.shape()[0], x.shape()[1], x.shape()[2]];
    let data: Vec<f32> = x.iter().copied().collect();
    Tensor::from_data(TensorData::new(data, shape), device)
}

/// A dataloader producing [`Batch`]es from a dataset.
///
/// # Example
///
/// ```rust,ignore
/// use mlstm_data::DataLoader;
/// use mlstm_core::Seed;
///
/// let loader = DataLoader::builder(train)
///     .batch_size(128)
///     .shuffle(true)
///     .seed(Seed::new(42))
///     .build()?;
///
/// for batch in loader.iter::<B>(&device, epoch) {
///     let batch = batch?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: SequenceDataset,
    batch_size: usize,
    shuffle: bool,
    seed: Seed,
}

impl DataLoader {
    /// Create a new dataloader builder.
    #[must_use]
    pub fn builder(dataset: SequenceDataset) -> DataLoaderBuilder {
        DataLoaderBuilder::new(dataset)
    }

    /// The dataset.
    #[must_use]
    pub fn dataset(&self) -> &SequenceDataset {
        &self.dataset
    }

    /// Batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches, counting a final partial batch.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the loader is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Iterate over the batches of one epoch.
    ///
    /// With shuffling enabled, the order is drawn from a stream derived from
    /// the seed and `epoch`, so every epoch sees a different but reproducible
    /// order.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device, epoch: usize) -> DataLoaderIter<'_, B> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = self.seed.derive(&format!("epoch-{}", epoch)).to_rng();
            indices.shuffle(&mut rng);
        }
        DataLoaderIter {
            loader: self,
            device: device.clone(),
            indices,
            current_batch: 0,
        }
    }
}

/// Builder for [`DataLoader`].
#[derive(Debug, Clone)]
pub struct DataLoaderBuilder {
    dataset: SequenceDataset,
    batch_size: usize,
    shuffle: bool,
    seed: Seed,
}

impl DataLoaderBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(dataset: SequenceDataset) -> Self {
        Self {
            dataset,
            batch_size: 128,
            shuffle: false,
            seed: Seed::default(),
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the shuffle seed.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Build the dataloader.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero batch size or an empty dataset.
    pub fn build(self) -> Result<DataLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        Ok(DataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            seed: self.seed,
        })
    }
}

/// Iterator over the batches of one epoch.
pub struct DataLoaderIter<'a, B: Backend> {
    loader: &'a DataLoader,
    device: B::Device,
    indices: Vec<usize>,
    current_batch: usize,
}

impl<'a, B: Backend> Iterator for DataLoaderIter<'a, B> {
    type Item = Result<Batch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_batch >= self.loader.n_batches() {
            return None;
        }
        let start = self.current_batch * self.loader.batch_size;
        let end = (start + self.loader.batch_size).min(self.indices.len());
        self.current_batch += 1;
        Some(self.create_batch(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.loader.n_batches() - self.current_batch;
        (remaining, Some(remaining))
    }
}

impl<'a, B: Backend> ExactSizeIterator for DataLoaderIter<'a, B> {}

impl<'a, B: Backend> DataLoaderIter<'a, B> {
    fn create_batch(&self, start: usize, end: usize) -> Result<Batch<B>> {
        let dataset = &self.loader.dataset;
        let indices = &self.indices[start..end];

        let x = dataset.x().select(Axis(0), indices);
        let labels: Vec<usize> = indices.iter().map(|&i| dataset.y()[i]).collect();
        let weights: Vec<f32> = match dataset.weights() {
            Some(w) => indices.iter().map(|&i| w[i]).collect(),
            None => vec![1.0; indices.len()],
        };
        if labels.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let n = labels.len();
        let targets: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
        Ok(Batch {
            x: to_tensor(&x, &self.device),
            targets: Tensor::from_data(TensorData::new(targets, [n]), &self.device),
            weights: Tensor::from_data(TensorData::new(weights, [n]), &self.device),
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn dataset(n: usize) -> SequenceDataset {
        let x = Array3::from_shape_fn((n, 2, 3), |(i, v, t)| (i * 100 + v * 10 + t) as f32);
        SequenceDataset::new(x, (0..n).map(|i| i % 2).collect()).unwrap()
    }

    #[test]
    fn test_batches_cover_dataset() {
        let loader = DataLoader::builder(dataset(10)).batch_size(4).build().unwrap();
        assert_eq!(loader.n_batches(), 3);

        let device = Default::default();
        let sizes: Vec<usize> = loader
            .iter::<B>(&device, 0)
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_batch_contents_in_order() {
        let loader = DataLoader::builder(dataset(3)).batch_size(3).build().unwrap();
        let device = Default::default();
        let batch = loader.iter::<B>(&device, 0).next().unwrap().unwrap();

        assert_eq!(batch.x.dims(), [3, 2, 3]);
        assert_eq!(batch.labels, vec![0, 1, 0]);
        let x: Vec<f32> = batch.x.into_data().to_vec().unwrap();
        assert_eq!(x[6], 100.0);
        let w: Vec<f32> = batch.weights.into_data().to_vec().unwrap();
        assert_eq!(w, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible_per_epoch() {
        let build = || {
            DataLoader::builder(dataset(20))
                .batch_size(20)
                .shuffle(true)
                .seed(Seed::new(9))
                .build()
                .unwrap()
        };
        let device = Default::default();
        let first = |loader: &DataLoader, epoch| {
            let x: Vec<f32> = loader
                .iter::<B>(&device, epoch)
                .next()
                .unwrap()
                .unwrap()
                .x
                .into_data()
                .to_vec()
                .unwrap();
            x
        };
        let (a, b) = (build(), build());
        assert_eq!(first(&a, 0), first(&b, 0));
        assert_ne!(first(&a, 0), first(&a, 1));
    }

    #[test]
    fn test_weights_are_carried() {
        let ds = dataset(2).with_weights(vec![0.5, 2.0]).unwrap();
        let loader = DataLoader::builder(ds).batch_size(2).build().unwrap();
        let device = Default::default();
        let batch = loader.iter::<B>(&device, 0).next().unwrap().unwrap();
        let w: Vec<f32> = batch.weights.into_data().to_vec().unwrap();
        assert_eq!(w, vec![0.5, 2.0]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            DataLoader::builder(dataset(2)).batch_size(0).build(),
            Err(DataError::InvalidBatchSize(_))
        ));
    }
}
