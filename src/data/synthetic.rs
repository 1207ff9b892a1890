//! Synthetic gaussian-blob datasets with balanced classes.

use crate::core::error::{Error, Result};
use crate::data::dataset::{Dataset, ImageShape};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

const CENTER_MAGNITUDE: f32 = 3.0;

/// Balanced class blobs: each class sits on its own axis, samples are
/// gaussian around the class center. Labels run class-major.
pub fn class_blobs(
    nclasses: usize,
    per_class: usize,
    dim: usize,
    spread: f32,
    rng: &mut StdRng,
) -> Result<Dataset> {
    if nclasses == 0 || per_class == 0 || dim == 0 {
        return Err(Error::Config(
            "nclasses, per_class, and dim must all be at least 1".into(),
        ));
    }
    if nclasses > 2 * dim {
        return Err(Error::Config(format!(
            "{nclasses} classes need at least {} dimensions to stay separable",
            nclasses.div_ceil(2)
        )));
    }
    let normal =
        Normal::new(0.0f32, spread).map_err(|e| Error::Config(format!("bad spread: {e}")))?;

    let total = nclasses * per_class;
    let mut values = Vec::with_capacity(total * dim);
    let mut labels = Vec::with_capacity(total);
    for class in 0..nclasses {
        let axis = class % dim;
        let sign = if class < dim { 1.0 } else { -1.0 };
        for _ in 0..per_class {
            for d in 0..dim {
                let center = if d == axis { sign * CENTER_MAGNITUDE } else { 0.0 };
                values.push(center + normal.sample(rng));
            }
            labels.push(class);
        }
    }
    let features = Array2::from_shape_vec((total, dim), values)
        .map_err(|e| Error::ShapeMismatch(e.to_string()))?;
    Dataset::new(features, labels)
}

/// Class blobs shaped as flattened images, for regimes that need pixel
/// geometry.
pub fn class_blobs_image(
    nclasses: usize,
    per_class: usize,
    shape: ImageShape,
    spread: f32,
    rng: &mut StdRng,
) -> Result<Dataset> {
    class_blobs(nclasses, per_class, shape.len(), spread, rng)?.with_image_shape(shape)
}
