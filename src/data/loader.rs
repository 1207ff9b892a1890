//! Shuffled mini-batch iteration over a dataset view.

use crate::core::error::{Error, Result};
use crate::data::dataset::Dataset;
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;

/// Restartable batch loader. Every epoch reshuffles the view and walks
/// it once in fixed-size batches; the last batch may run short.
#[derive(Clone, Debug)]
pub struct BatchLoader {
    dataset: Dataset,
    batch_size: usize,
}

impl BatchLoader {
    /// Wrap a dataset with a batch size.
    pub fn new(dataset: Dataset, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        Ok(Self {
            dataset,
            batch_size,
        })
    }

    /// The dataset behind this loader.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Samples visible per epoch.
    pub fn nsamples(&self) -> usize {
        self.dataset.len()
    }

    /// Batches per epoch, counting a ragged tail batch.
    pub fn nbatches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Start one shuffled pass over the data.
    pub fn epoch<'a, R: Rng>(&'a self, rng: &'a mut R) -> Epoch<'a, R> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        order.shuffle(rng);
        Epoch {
            loader: self,
            order,
            cursor: 0,
            rng,
        }
    }
}

/// One in-progress pass over a loader's data.
pub struct Epoch<'a, R: Rng> {
    loader: &'a BatchLoader,
    order: Vec<usize>,
    cursor: usize,
    rng: &'a mut R,
}

impl<'a, R: Rng> Iterator for Epoch<'a, R> {
    type Item = (Array2<f32>, Vec<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let chunk = &self.order[self.cursor..end];
        self.cursor = end;

        let dataset = &self.loader.dataset;
        let mut features = Array2::zeros((chunk.len(), dataset.feature_dim()));
        let mut labels = Vec::with_capacity(chunk.len());
        for (row, &pos) in chunk.iter().enumerate() {
            dataset.fill_row(pos, features.row_mut(row), self.rng);
            labels.push(dataset.label(pos));
        }
        Some((features, labels))
    }
}
