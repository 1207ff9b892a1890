//! Training-set partitioning under the supported heterogeneity regimes.
//!
//! Every regime consumes the run-wide generator, so a seed pins the full
//! partition. Regimes that reject draws share one retry ceiling; hitting
//! it reports the partition as infeasible instead of spinning forever.

mod feature;
mod label;
mod quantity;

use crate::core::config::{RunConfig, SkewKind};
use crate::core::error::{Error, Result};
use crate::data::dataset::Dataset;
use rand::rngs::StdRng;
use rand_distr::{Dirichlet, Distribution};

/// Hard ceiling on rejection-sampling attempts per regime.
pub const MAX_DRAWS: usize = 10_000;

/// Client shards plus the shared, untouched test set.
#[derive(Clone, Debug)]
pub struct Partitioned {
    /// One training shard per client
    pub shards: Vec<Dataset>,
    /// Evaluation set shared by all clients and the server
    pub test: Dataset,
}

/// Split the training set into per-client shards under the configured
/// regime. The test set is passed through untouched.
pub fn partition(
    train: &Dataset,
    test: &Dataset,
    config: &RunConfig,
    rng: &mut StdRng,
) -> Result<Partitioned> {
    config.validate()?;
    let shards = match &config.skew {
        SkewKind::None => (0..config.nclient).map(|_| train.clone()).collect(),
        SkewKind::Quantity { alpha } => {
            quantity::split(train, config.nclient, *alpha, config.min_shard, rng)?
        }
        SkewKind::FeatNoise { std } => feature::noise(train, config.nclient, *std, rng)?,
        SkewKind::FeatFilter { size } => feature::filter(train, config.nclient, *size, rng)?,
        SkewKind::LabelAcross { alpha, overlap } => {
            label::across(train, config.nclient, config.nlabel, *alpha, *overlap, rng)?
        }
        SkewKind::LabelWithin { alpha } => label::within(
            train,
            config.nclient,
            config.nlabel,
            *alpha,
            config.min_shard,
            rng,
        )?,
    };
    for (client, shard) in shards.iter().enumerate() {
        tracing::debug!(client, samples = shard.len(), skew = %config.skew, "shard ready");
    }
    Ok(Partitioned {
        shards,
        test: test.clone(),
    })
}

/// One draw from a symmetric Dirichlet over `n` components.
pub(crate) fn dirichlet(rng: &mut StdRng, alpha: f64, n: usize) -> Result<Vec<f64>> {
    let dist = Dirichlet::new_with_size(alpha, n)
        .map_err(|e| Error::Config(format!("dirichlet({alpha}, {n}): {e}")))?;
    Ok(dist.sample(rng))
}

/// Interior split points `floor(cumsum(prop) * total)`, one per boundary.
pub(crate) fn floor_split_points(prop: &[f64], total: usize) -> Vec<usize> {
    let mut points = Vec::with_capacity(prop.len().saturating_sub(1));
    let mut acc = 0.0f64;
    for p in prop.iter().take(prop.len().saturating_sub(1)) {
        acc += p;
        points.push(((acc * total as f64).floor() as usize).min(total));
    }
    points
}

/// Cut a slice into consecutive chunks at the given split points.
pub(crate) fn split_by_points<T: Clone>(items: &[T], points: &[usize]) -> Vec<Vec<T>> {
    let mut out = Vec::with_capacity(points.len() + 1);
    let mut prev = 0usize;
    for &point in points {
        let point = point.clamp(prev, items.len());
        out.push(items[prev..point].to_vec());
        prev = point;
    }
    out.push(items[prev..].to_vec());
    out
}
