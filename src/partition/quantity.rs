//! Quantity skew: Dirichlet-drawn shard sizes over a shuffled order.

use crate::core::error::{Error, Result};
use crate::data::dataset::Dataset;
use crate::partition::{dirichlet, floor_split_points, split_by_points, MAX_DRAWS};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Split samples into `nclient` disjoint shards whose sizes follow a
/// Dirichlet draw. Draws giving any client fewer than `min_shard`
/// samples are rejected and redrawn.
pub(super) fn split(
    train: &Dataset,
    nclient: usize,
    alpha: f64,
    min_shard: usize,
    rng: &mut StdRng,
) -> Result<Vec<Dataset>> {
    let total = train.len();
    if total < nclient * min_shard {
        return Err(Error::PartitionInfeasible(format!(
            "{total} samples cannot give {nclient} clients at least {min_shard} each"
        )));
    }

    let mut order: Vec<usize> = (0..total).collect();
    order.shuffle(rng);

    let mut draws = 0usize;
    let prop = loop {
        draws += 1;
        if draws > MAX_DRAWS {
            return Err(Error::PartitionInfeasible(format!(
                "no admissible size draw in {MAX_DRAWS} attempts \
                 (alpha {alpha}, min shard {min_shard})"
            )));
        }
        let prop = dirichlet(rng, alpha, nclient)?;
        let smallest = prop.iter().copied().fold(f64::INFINITY, f64::min);
        // floor-splitting an accepted draw cannot shrink any shard
        // below min_shard, so the check on raw proportions is enough
        if smallest * total as f64 >= min_shard as f64 {
            break prop;
        }
    };
    tracing::debug!(draws, "quantity proportions accepted");

    let points = floor_split_points(&prop, total);
    split_by_points(&order, &points)
        .into_iter()
        .map(|chunk| train.subset(chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic;
    use rand::SeedableRng;

    fn dataset(total: usize) -> Dataset {
        let mut r = StdRng::seed_from_u64(21);
        synthetic::class_blobs(10, total / 10, 8, 0.5, &mut r).unwrap()
    }

    #[test]
    fn test_shards_are_disjoint_and_cover_everything() {
        let train = dataset(300);
        let mut r = StdRng::seed_from_u64(400);
        let shards = split(&train, 3, 0.5, 32, &mut r).unwrap();

        assert_eq!(shards.len(), 3);
        let mut all: Vec<usize> = shards
            .iter()
            .flat_map(|s| s.absolute_indices())
            .collect();
        all.sort_unstable();
        let expected: Vec<usize> = (0..300).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_every_shard_meets_the_minimum() {
        let train = dataset(300);
        for seed in [1u64, 2, 3, 4, 5] {
            let mut r = StdRng::seed_from_u64(seed);
            let shards = split(&train, 3, 0.5, 32, &mut r).unwrap();
            for shard in &shards {
                assert!(shard.len() >= 32, "seed {seed}: shard of {}", shard.len());
            }
        }
    }

    #[test]
    fn test_too_few_samples_is_infeasible() {
        let train = dataset(100);
        let mut r = StdRng::seed_from_u64(400);
        let err = split(&train, 5, 0.5, 32, &mut r).unwrap_err();
        assert!(matches!(err, Error::PartitionInfeasible(_)));
    }

    #[test]
    fn test_draw_ceiling_reports_infeasible() {
        // 96 samples over 3 clients with min 32 admits only the exact
        // uniform draw, which rejection sampling will never hit
        let mut r = StdRng::seed_from_u64(400);
        let train = dataset(100).subset((0..96).collect()).unwrap();
        let err = split(&train, 3, 0.5, 32, &mut r).unwrap_err();
        assert!(matches!(err, Error::PartitionInfeasible(_)));
    }
}
