//! Server aggregation: weighted parameter averaging with mode-specific
//! exclusions, then broadcast back to every client.

use crate::core::config::Mode;
use crate::core::error::{Error, Result};
use crate::model::params::{is_counter_param, is_norm_param, ParamMap};
use ndarray::ArrayD;

/// Slack allowed when checking that weights sum to one.
const WEIGHT_SUM_TOLERANCE: f32 = 1e-4;

/// Per-client aggregation weights for a round.
///
/// Sample-count weighting normalizes shard sizes into proportions;
/// every other policy weights clients uniformly.
pub fn client_weights(mode: &Mode, sample_counts: &[usize]) -> Result<Vec<f32>> {
    if sample_counts.is_empty() {
        return Err(Error::Config("no clients to weight".into()));
    }
    if mode.weights_by_sample_count() {
        let total: usize = sample_counts.iter().sum();
        if total == 0 {
            return Err(Error::Config("every shard is empty".into()));
        }
        Ok(sample_counts
            .iter()
            .map(|&count| count as f32 / total as f32)
            .collect())
    } else {
        let n = sample_counts.len();
        Ok(vec![1.0 / n as f32; n])
    }
}

/// Aggregate client parameters into the server model, then write the
/// aggregate back into the clients.
///
/// Under a norm-excluding mode, parameters of normalization layers stay
/// client-local and the server copies of them are left as they are.
/// Batch counters are never averaged: client 0's counter is copied to
/// the server and to every client.
pub fn aggregate(
    mode: &Mode,
    server: &mut ParamMap,
    clients: &mut [&mut ParamMap],
    weights: &[f32],
) -> Result<()> {
    if clients.is_empty() {
        return Err(Error::Config("no clients to aggregate".into()));
    }
    if weights.len() != clients.len() {
        return Err(Error::Config(format!(
            "{} weights for {} clients",
            weights.len(),
            clients.len()
        )));
    }
    let total: f32 = weights.iter().sum();
    if !total.is_finite() || (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(Error::Config(format!(
            "aggregation weights sum to {total}, expected 1"
        )));
    }
    for client in clients.iter() {
        server.check_compatible(client)?;
    }

    let names: Vec<String> = server.names().cloned().collect();
    for name in &names {
        if mode.excludes_norm_layers() && is_norm_param(name) {
            continue;
        }
        if is_counter_param(name) {
            let counter = clients[0].require(name)?.clone();
            for client in clients.iter_mut().skip(1) {
                client.require_mut(name)?.assign(&counter);
            }
            *server.require_mut(name)? = counter;
            continue;
        }
        let mut acc: ArrayD<f32> = ArrayD::zeros(server.require(name)?.raw_dim());
        for (client, &weight) in clients.iter().zip(weights) {
            acc.scaled_add(weight, client.require(name)?);
        }
        for client in clients.iter_mut() {
            client.require_mut(name)?.assign(&acc);
        }
        *server.require_mut(name)? = acc;
    }
    tracing::debug!(mode = %mode, parameters = names.len(), "aggregation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn model_map(weight: f32, bn: f32, counter: f32) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("fc1.weight", ArrayD::from_elem(IxDyn(&[2, 2]), weight));
        map.insert("bn1.weight", ArrayD::from_elem(IxDyn(&[2]), bn));
        map.insert(
            "bn1.num_batches_tracked",
            ArrayD::from_elem(IxDyn(&[1]), counter),
        );
        map
    }

    #[test]
    fn test_sample_count_weights() {
        let weights = client_weights(&Mode::FedAvg, &[10, 30]).unwrap();
        assert_eq!(weights, vec![0.25, 0.75]);
    }

    #[test]
    fn test_uniform_weights() {
        let weights = client_weights(&Mode::FedBn, &[10, 30, 20, 40]).unwrap();
        assert_eq!(weights, vec![0.25; 4]);
    }

    #[test]
    fn test_weights_reject_empty_input() {
        assert!(client_weights(&Mode::FedAvg, &[]).is_err());
        assert!(client_weights(&Mode::FedAvg, &[0, 0]).is_err());
    }

    #[test]
    fn test_weighted_average_reaches_server_and_clients() {
        let mut server = model_map(0.0, 0.0, 0.0);
        let mut a = model_map(1.0, 1.0, 5.0);
        let mut b = model_map(3.0, 3.0, 7.0);

        aggregate(
            &Mode::FedAvg,
            &mut server,
            &mut [&mut a, &mut b],
            &[0.5, 0.5],
        )
        .unwrap();

        let sw = server.require("fc1.weight").unwrap();
        assert!(sw.iter().all(|&v| (v - 2.0).abs() < 1e-6));
        for map in [&a, &b] {
            let cw = map.require("fc1.weight").unwrap();
            assert!(cw.iter().all(|&v| (v - 2.0).abs() < 1e-6));
        }
        // norm layers are not excluded outside fedbn
        let sbn = server.require("bn1.weight").unwrap();
        assert!(sbn.iter().all(|&v| (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_unequal_weights_shift_the_average() {
        let mut server = model_map(0.0, 0.0, 0.0);
        let mut a = model_map(1.0, 0.0, 0.0);
        let mut b = model_map(3.0, 0.0, 0.0);

        aggregate(
            &Mode::FedAvg,
            &mut server,
            &mut [&mut a, &mut b],
            &[0.25, 0.75],
        )
        .unwrap();

        let sw = server.require("fc1.weight").unwrap();
        assert!(sw.iter().all(|&v| (v - 2.5).abs() < 1e-6));
    }

    #[test]
    fn test_counter_is_copied_from_client_zero_not_averaged() {
        let mut server = model_map(0.0, 0.0, 0.0);
        let mut a = model_map(1.0, 1.0, 5.0);
        let mut b = model_map(3.0, 3.0, 7.0);

        aggregate(
            &Mode::FedAvg,
            &mut server,
            &mut [&mut a, &mut b],
            &[0.5, 0.5],
        )
        .unwrap();

        // client 0's counter wins everywhere, no 6.0 average
        assert_eq!(server.require("bn1.num_batches_tracked").unwrap()[[0]], 5.0);
        assert_eq!(a.require("bn1.num_batches_tracked").unwrap()[[0]], 5.0);
        assert_eq!(b.require("bn1.num_batches_tracked").unwrap()[[0]], 5.0);
    }

    #[test]
    fn test_fedbn_leaves_norm_parameters_alone() {
        let mut server = model_map(0.0, 9.0, 9.0);
        let mut a = model_map(1.0, 1.0, 5.0);
        let mut b = model_map(3.0, 3.0, 7.0);

        aggregate(
            &Mode::FedBn,
            &mut server,
            &mut [&mut a, &mut b],
            &[0.5, 0.5],
        )
        .unwrap();

        // averaged: plain weights
        assert!(server
            .require("fc1.weight")
            .unwrap()
            .iter()
            .all(|&v| (v - 2.0).abs() < 1e-6));
        // untouched: everything under the norm layer, counters included
        assert!(server
            .require("bn1.weight")
            .unwrap()
            .iter()
            .all(|&v| (v - 9.0).abs() < 1e-6));
        assert_eq!(server.require("bn1.num_batches_tracked").unwrap()[[0]], 9.0);
        assert!(a
            .require("bn1.weight")
            .unwrap()
            .iter()
            .all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(b
            .require("bn1.weight")
            .unwrap()
            .iter()
            .all(|&v| (v - 3.0).abs() < 1e-6));
    }

    #[test]
    fn test_aggregation_stays_inside_the_client_envelope() {
        let varied = |seed: f32| {
            let mut map = ParamMap::new();
            map.insert(
                "fc1.weight",
                ArrayD::from_shape_fn(IxDyn(&[4, 3]), |ix| {
                    ((ix[0] * 3 + ix[1]) as f32 * 0.7 - seed).sin()
                }),
            );
            map.insert(
                "fc2.bias",
                ArrayD::from_shape_fn(IxDyn(&[3]), |ix| (ix[0] as f32 + seed).cos()),
            );
            map
        };
        let mut server = varied(0.0).zeros_like();
        let mut a = varied(1.0);
        let mut b = varied(2.0);
        let mut c = varied(3.0);
        let before = [a.clone(), b.clone(), c.clone()];

        aggregate(
            &Mode::FedAvg,
            &mut server,
            &mut [&mut a, &mut b, &mut c],
            &[0.2, 0.3, 0.5],
        )
        .unwrap();

        for name in server.names() {
            let merged = server.require(name).unwrap();
            for (pos, &value) in merged.iter().enumerate() {
                let column: Vec<f32> = before
                    .iter()
                    .map(|m| m.require(name).unwrap().iter().nth(pos).unwrap())
                    .copied()
                    .collect();
                let lo = column.iter().cloned().fold(f32::INFINITY, f32::min);
                let hi = column.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                assert!(
                    value >= lo - 1e-6 && value <= hi + 1e-6,
                    "{name}[{pos}] = {value} outside [{lo}, {hi}]"
                );
            }
        }
    }

    #[test]
    fn test_aggregate_is_idempotent_once_converged() {
        let mut server = model_map(0.0, 0.0, 0.0);
        let mut a = model_map(1.0, 1.0, 5.0);
        let mut b = model_map(3.0, 3.0, 5.0);

        aggregate(
            &Mode::FedAvg,
            &mut server,
            &mut [&mut a, &mut b],
            &[0.5, 0.5],
        )
        .unwrap();
        let first = server.clone();
        aggregate(
            &Mode::FedAvg,
            &mut server,
            &mut [&mut a, &mut b],
            &[0.5, 0.5],
        )
        .unwrap();
        assert_eq!(server, first);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut server = model_map(0.0, 0.0, 0.0);
        let mut a = model_map(1.0, 1.0, 5.0);
        let mut b = model_map(3.0, 3.0, 7.0);
        let err = aggregate(
            &Mode::FedAvg,
            &mut server,
            &mut [&mut a, &mut b],
            &[0.5, 0.6],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_shape_disagreement_is_rejected() {
        let mut server = model_map(0.0, 0.0, 0.0);
        let mut a = model_map(1.0, 1.0, 5.0);
        let mut b = ParamMap::new();
        b.insert("fc1.weight", ArrayD::from_elem(IxDyn(&[3, 3]), 1.0));
        b.insert("bn1.weight", ArrayD::from_elem(IxDyn(&[2]), 1.0));
        b.insert(
            "bn1.num_batches_tracked",
            ArrayD::from_elem(IxDyn(&[1]), 0.0),
        );
        let err = aggregate(
            &Mode::FedAvg,
            &mut server,
            &mut [&mut a, &mut b],
            &[0.5, 0.5],
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }
}
