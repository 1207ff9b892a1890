//! Label skew: distributing labels, or per-label sample mass, across
//! clients.

use crate::core::error::{Error, Result};
use crate::data::dataset::Dataset;
use crate::partition::{dirichlet, floor_split_points, split_by_points, MAX_DRAWS};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

/// Partition by splitting the label set itself across clients.
///
/// A Dirichlet draw decides how many labels each client owns; draws are
/// rejected until every client holds at least one label and the largest
/// client holds at least half of them. With `overlap`, `nlabel / 2`
/// donation steps copy a randomly picked label to a second client.
pub(super) fn across(
    train: &Dataset,
    nclient: usize,
    nlabel: usize,
    alpha: f64,
    overlap: bool,
    rng: &mut StdRng,
) -> Result<Vec<Dataset>> {
    for label in 0..nlabel {
        if train.label_positions(label).is_empty() {
            return Err(Error::PartitionInfeasible(format!(
                "label {label} has no samples"
            )));
        }
    }
    let half = nlabel / 2;
    if (nclient - 1) + half > nlabel {
        return Err(Error::PartitionInfeasible(format!(
            "{nlabel} labels cannot give {nclient} clients one label each \
             and the largest client {half}"
        )));
    }

    let mut labels: Vec<usize> = (0..nlabel).collect();
    labels.shuffle(rng);

    let mut draws = 0usize;
    let prop = loop {
        draws += 1;
        if draws > MAX_DRAWS {
            return Err(Error::PartitionInfeasible(format!(
                "no admissible label split in {MAX_DRAWS} attempts (alpha {alpha})"
            )));
        }
        let prop = dirichlet(rng, alpha, nclient)?;
        let masses: Vec<f64> = prop.iter().map(|p| p * nlabel as f64).collect();
        let smallest = masses.iter().copied().fold(f64::INFINITY, f64::min);
        let largest = masses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if smallest >= 1.0 && largest >= half as f64 {
            break prop;
        }
    };
    tracing::debug!(draws, "label group sizes accepted");

    let points = floor_split_points(&prop, nlabel);
    let mut groups = split_by_points(&labels, &points);

    if overlap {
        for _ in 0..half {
            let donor = rng.gen_range(0..nclient);
            let pick = rng.gen_range(0..groups[donor].len());
            let label = groups[donor][pick];
            let recipient = loop {
                let candidate = rng.gen_range(0..nclient);
                if candidate != donor {
                    break candidate;
                }
            };
            if !groups[recipient].contains(&label) {
                groups[recipient].push(label);
            }
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let mut positions = Vec::new();
            for label in group {
                positions.extend(train.label_positions(label));
            }
            train.subset(positions)
        })
        .collect()
}

/// Partition by splitting every label's samples across clients.
///
/// Each label is shuffled and divided by its own Dirichlet draw; clients
/// already holding their fair share of all samples are zeroed out of
/// later draws. A whole pass is retried until every shard reaches
/// `min_shard` samples.
pub(super) fn within(
    train: &Dataset,
    nclient: usize,
    nlabel: usize,
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
    let capacity = total as f64 / nclient as f64;
    let per_label: Vec<Vec<usize>> = (0..nlabel)
        .map(|label| train.label_positions(label))
        .collect();

    let mut draws = 0usize;
    'pass: loop {
        draws += 1;
        if draws > MAX_DRAWS {
            return Err(Error::PartitionInfeasible(format!(
                "no admissible per-label split in {MAX_DRAWS} attempts \
                 (alpha {alpha}, min shard {min_shard})"
            )));
        }

        let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); nclient];
        for positions in &per_label {
            let mut positions = positions.clone();
            positions.shuffle(rng);

            let mut prop = dirichlet(rng, alpha, nclient)?;
            for (p, shard) in prop.iter_mut().zip(&assigned) {
                if shard.len() as f64 >= capacity {
                    *p = 0.0;
                }
            }
            let mass: f64 = prop.iter().sum();
            if mass <= 0.0 {
                continue 'pass;
            }
            for p in &mut prop {
                *p /= mass;
            }

            let points = floor_split_points(&prop, positions.len());
            for (shard, chunk) in assigned.iter_mut().zip(split_by_points(&positions, &points)) {
                shard.extend(chunk);
            }
        }

        if assigned.iter().map(Vec::len).min().unwrap_or(0) >= min_shard {
            tracing::debug!(draws, "per-label split accepted");
            return assigned
                .into_iter()
                .map(|positions| train.subset(positions))
                .collect();
        }
    }
}
