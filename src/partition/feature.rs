//! Feature skew: per-client input corruption over the full training set.

use crate::core::error::{Error, Result};
use crate::data::dataset::{Corruption, Dataset};
use rand::rngs::StdRng;
use rand::Rng;

/// Give every client the full training set; a fair coin decides per
/// client whether its copy adds gaussian noise on access.
pub(super) fn noise(
    train: &Dataset,
    nclient: usize,
    std: f32,
    rng: &mut StdRng,
) -> Result<Vec<Dataset>> {
    (0..nclient)
        .map(|client| {
            if rng.gen_bool(0.5) {
                tracing::debug!(client, std, "noisy client");
                train.corrupted(Corruption::Noise { mean: 0.0, std })
            } else {
                Ok(train.clone())
            }
        })
        .collect()
}

/// Give every client the full training set; a fair coin decides per
/// client whether its copy is blurred by a mean filter on access.
pub(super) fn filter(
    train: &Dataset,
    nclient: usize,
    size: usize,
    rng: &mut StdRng,
) -> Result<Vec<Dataset>> {
    if train.image_shape().is_none() {
        return Err(Error::Config(
            "feat_filter needs a dataset with image geometry".into(),
        ));
    }
    (0..nclient)
        .map(|client| {
            if rng.gen_bool(0.5) {
                tracing::debug!(client, size, "filtered client");
                train.corrupted(Corruption::MeanFilter { size })
            } else {
                Ok(train.clone())
            }
        })
        .collect()
}
