//! Data loader

use std::collections::HashSet;

use burn::tensor::{Int, Tensor, TensorData, backend::Backend};
use rand::{SeedableRng, seq::SliceRandom};
use rand_pcg::Pcg64Mcg;
use thiserror::Error;

use crate::datasets::Sample;

/// Errors for the dataloader
#[derive(Debug, Error)]
pub enum DataLoaderError {
    #[error(
        "All input vectors must have the same dimension. Received different sizes: {input_dims:?}"
    )]
    InputDimensionMismatch { input_dims: HashSet<usize> },
    #[error("Batch size must be positive")]
    ZeroBatchSize,
    #[error("Cannot load batches from an empty partition")]
    Empty,
}

/// Order in which samples are visited within an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Sequential,
    /// A fresh permutation per epoch, fully determined by `seed` and the epoch index
    Shuffled { seed: u64 },
}

/// Data loader, returns batches of samples in sequential or seeded shuffled order
/// Takes inspiration from the PyTorch DataLoader
/// <https://pytorch.org/docs/stable/data.html#torch.utils.data.DataLoader>
pub struct DataLoader<'a> {
    samples: &'a [Sample],
    batch_size: usize,
    order: Order,
}

impl<'a> DataLoader<'a> {
    pub fn new(samples: &'a [Sample], batch_size: usize, order: Order) -> Result<Self, DataLoaderError> {
        if batch_size == 0 {
            return Err(DataLoaderError::ZeroBatchSize);
        }
        if samples.is_empty() {
            return Err(DataLoaderError::Empty);
        }
        let input_dims = samples
            .iter()
            .map(|s| s.features.len())
            .collect::<HashSet<_>>();
        if input_dims.len() > 1 {
            return Err(DataLoaderError::InputDimensionMismatch { input_dims });
        }
        Ok(Self {
            samples,
            batch_size,
            order,
        })
    }

    /// Number of batches per epoch, the last one possibly partial
    pub fn n_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    /// Starts a pass over the samples. Calling it again with the same epoch replays the same batches.
    pub fn iter(&self, epoch: usize) -> DataLoaderIterator<'a> {
        let mut indices = (0..self.samples.len()).collect::<Vec<_>>();
        if let Order::Shuffled { seed } = self.order {
            let mut rng = Pcg64Mcg::seed_from_u64(seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }
        DataLoaderIterator {
            samples: self.samples,
            batch_size: self.batch_size,
            indices,
            curr_iter: 0,
        }
    }
}

/// An iterator which returns mini batches of samples until the end of the partition
pub struct DataLoaderIterator<'a> {
    samples: &'a [Sample],
    batch_size: usize,
    // optionally shuffled indices
    indices: Vec<usize>,
    curr_iter: usize,
}

impl<'a> Iterator for DataLoaderIterator<'a> {
    type Item = Vec<&'a Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.curr_iter >= self.indices.len() {
            return None;
        }
        let end = (self.curr_iter + self.batch_size).min(self.indices.len());
        let batch = self.indices[self.curr_iter..end]
            .iter()
            .map(|&i| &self.samples[i])
            .collect::<Vec<_>>();
        self.curr_iter = end;
        Some(batch)
    }
}

/// A batch of samples laid out as tensors on a device
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    /// `[batch, features]`
    pub features: Tensor<B, 2>,
    /// `[batch]`
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batch<B> {
    pub fn from_samples(samples: &[&Sample], device: &B::Device) -> Self {
        let width = samples.first().map_or(0, |s| s.features.len());
        let features = samples
            .iter()
            .flat_map(|s| s.features.iter().copied())
            .collect::<Vec<f32>>();
        let targets = samples.iter().map(|s| s.label as i64).collect::<Vec<_>>();

        Self {
            features: Tensor::from_data(TensorData::new(features, [samples.len(), width]), device),
            targets: Tensor::from_data(TensorData::new(targets, [samples.len()]), device),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
