//! In-memory labeled datasets with shared storage and index views.
//!
//! A `Dataset` never copies its feature matrix: shards produced by the
//! partitioner are index views over the same storage, and corruption is
//! applied at access time so a corrupted view costs nothing to create.

use crate::core::error::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayViewMut1};
use rand::Rng;
use rand_distr::StandardNormal;
use std::sync::Arc;

/// Channel-major geometry of flattened image features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageShape {
    /// Number of channels
    pub channels: usize,
    /// Image height in pixels
    pub height: usize,
    /// Image width in pixels
    pub width: usize,
}

impl ImageShape {
    /// Flattened feature count for this geometry.
    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Whether the geometry holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input corruption applied every time a sample is read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Corruption {
    /// Additive gaussian noise, redrawn on every access.
    Noise {
        /// Mean of the added noise
        mean: f32,
        /// Standard deviation of the added noise
        std: f32,
    },
    /// Mean filter over a square in-bounds window, per channel.
    MeanFilter {
        /// Side length of the averaging window
        size: usize,
    },
}

/// A labeled feature matrix, optionally restricted to an index view.
#[derive(Clone, Debug)]
pub struct Dataset {
    features: Arc<Array2<f32>>,
    labels: Arc<Vec<usize>>,
    image: Option<ImageShape>,
    view: Option<Arc<Vec<usize>>>,
    corruption: Option<Corruption>,
}

impl Dataset {
    /// Wrap a feature matrix and its labels.
    pub fn new(features: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} feature rows vs {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self {
            features: Arc::new(features),
            labels: Arc::new(labels),
            image: None,
            view: None,
            corruption: None,
        })
    }

    /// Attach image geometry to the flattened features.
    pub fn with_image_shape(mut self, shape: ImageShape) -> Result<Self> {
        if shape.len() != self.feature_dim() {
            return Err(Error::ShapeMismatch(format!(
                "geometry {}x{}x{} does not cover {} features",
                shape.channels,
                shape.height,
                shape.width,
                self.feature_dim()
            )));
        }
        self.image = Some(shape);
        Ok(self)
    }

    /// Image geometry, when known.
    pub fn image_shape(&self) -> Option<ImageShape> {
        self.image
    }

    /// Number of samples visible through the view.
    pub fn len(&self) -> usize {
        match &self.view {
            Some(view) => view.len(),
            None => self.features.nrows(),
        }
    }

    /// Whether the view holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of one feature row.
    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    /// One past the largest label visible through the view.
    pub fn nclasses(&self) -> usize {
        (0..self.len())
            .map(|pos| self.label(pos))
            .max()
            .map_or(0, |m| m + 1)
    }

    fn resolve(&self, pos: usize) -> usize {
        match &self.view {
            Some(view) => view[pos],
            None => pos,
        }
    }

    /// Label of the sample at a view position.
    pub fn label(&self, pos: usize) -> usize {
        self.labels[self.resolve(pos)]
    }

    /// View positions holding the given label, in ascending order.
    pub fn label_positions(&self, label: usize) -> Vec<usize> {
        (0..self.len())
            .filter(|&pos| self.label(pos) == label)
            .collect()
    }

    /// Absolute storage indices behind the view, in view order.
    pub fn absolute_indices(&self) -> Vec<usize> {
        (0..self.len()).map(|pos| self.resolve(pos)).collect()
    }

    /// Restrict to the given view positions. Positions may repeat.
    pub fn subset(&self, positions: Vec<usize>) -> Result<Dataset> {
        let len = self.len();
        let mut absolute = Vec::with_capacity(positions.len());
        for pos in positions {
            if pos >= len {
                return Err(Error::ShapeMismatch(format!(
                    "subset position {pos} out of bounds for {len} samples"
                )));
            }
            absolute.push(self.resolve(pos));
        }
        let mut out = self.clone();
        out.view = Some(Arc::new(absolute));
        Ok(out)
    }

    /// Same view with a corruption applied on every access.
    pub fn corrupted(&self, corruption: Corruption) -> Result<Dataset> {
        match corruption {
            Corruption::Noise { std, .. } => {
                if !std.is_finite() || std < 0.0 {
                    return Err(Error::Config(format!(
                        "noise std must be non-negative, got {std}"
                    )));
                }
            }
            Corruption::MeanFilter { size } => {
                if size == 0 {
                    return Err(Error::Config("filter size must be at least 1".into()));
                }
                if self.image.is_none() {
                    return Err(Error::Config(
                        "mean filter needs image geometry; call with_image_shape first".into(),
                    ));
                }
            }
        }
        let mut out = self.clone();
        out.corruption = Some(corruption);
        Ok(out)
    }

    /// Write the (possibly corrupted) features of one sample into `out`.
    pub(crate) fn fill_row<R: Rng + ?Sized>(
        &self,
        pos: usize,
        mut out: ArrayViewMut1<'_, f32>,
        rng: &mut R,
    ) {
        let row = self.features.row(self.resolve(pos));
        match self.corruption {
            None => out.assign(&row),
            Some(Corruption::Noise { mean, std }) => {
                for (dst, &src) in out.iter_mut().zip(row.iter()) {
                    let draw: f32 = rng.sample(StandardNormal);
                    *dst = src + mean + std * draw;
                }
            }
            Some(Corruption::MeanFilter { size }) => {
                // geometry checked when the corruption was attached
                if let Some(shape) = self.image {
                    mean_filter_row(&row, &mut out, shape, size);
                } else {
                    out.assign(&row);
                }
            }
        }
    }
}

/// Average each pixel over the in-bounds part of a size x size window.
fn mean_filter_row(
    row: &ArrayView1<'_, f32>,
    out: &mut ArrayViewMut1<'_, f32>,
    shape: ImageShape,
    size: usize,
) {
    let (h, w) = (shape.height, shape.width);
    let lo = (size - 1) / 2;
    let hi = size / 2;
    for c in 0..shape.channels {
        let base = c * h * w;
        for i in 0..h {
            let top = i.saturating_sub(lo);
            let bottom = (i + hi).min(h - 1);
            for j in 0..w {
                let left = j.saturating_sub(lo);
                let right = (j + hi).min(w - 1);
                let mut sum = 0.0f32;
                for y in top..=bottom {
                    for x in left..=right {
                        sum += row[base + y * w + x];
                    }
                }
                let count = ((bottom - top + 1) * (right - left + 1)) as f32;
                out[base + i * w + j] = sum / count;
            }
        }
    }
}
