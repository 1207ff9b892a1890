//! Local training: one epoch of the mode's update rule on one shard.

mod meta;
mod sgd;

pub use sgd::{add_prox_pull, Sgd};

use crate::core::config::Mode;
use crate::core::error::{Error, Result};
use crate::data::loader::BatchLoader;
use crate::model::loss;
use crate::model::params::ParamMap;
use crate::model::Model;
use rand::Rng;

/// Runs local epochs for one federation mode.
///
/// Rebuilt every round, mirroring an optimizer that is reconstructed
/// with the same constant learning rate each time.
#[derive(Clone, Debug)]
pub struct LocalTrainer<'a> {
    mode: &'a Mode,
    sgd: Sgd,
}

impl<'a> LocalTrainer<'a> {
    /// Trainer for the given mode and learning rate.
    pub fn new(mode: &'a Mode, lr: f32) -> Self {
        Self {
            mode,
            sgd: Sgd::new(lr),
        }
    }

    /// Run one local epoch on a client model.
    ///
    /// `server` is the anchor for the proximal modes; it is only needed
    /// from the second round on, matching the first round running plain
    /// before any aggregate exists. Returns the epoch's training loss.
    pub fn run_epoch<M: Model, R: Rng>(
        &self,
        model: &mut M,
        server: Option<&ParamMap>,
        round: usize,
        loader: &BatchLoader,
        rng: &mut R,
    ) -> Result<f32> {
        match self.mode {
            Mode::FedAvg | Mode::FedBn => plain_epoch(model, loader, &self.sgd, rng),
            Mode::FedProx { mu } => {
                if round == 0 {
                    plain_epoch(model, loader, &self.sgd, rng)
                } else {
                    let anchor = server.ok_or_else(|| {
                        Error::Config("proximal training needs server parameters".into())
                    })?;
                    prox_epoch(model, anchor, *mu, loader, &self.sgd, rng)
                }
            }
            Mode::PerFedAvg { alpha, beta } => {
                meta::perfedavg_epoch(model, loader, &self.sgd, *alpha, *beta, rng)
            }
            Mode::PFedMe {
                alpha,
                beta,
                blend_alpha,
                lambda,
            } => meta::pfedme_epoch(
                model,
                loader,
                &self.sgd,
                *alpha,
                *beta,
                lambda * blend_alpha,
                rng,
            ),
        }
    }
}

/// One pass of plain descent over the shard. Returns the mean batch loss.
fn plain_epoch<M: Model, R: Rng>(
    model: &mut M,
    loader: &BatchLoader,
    sgd: &Sgd,
    rng: &mut R,
) -> Result<f32> {
    let mut total = 0.0f64;
    let mut batches = 0usize;
    for (x, y) in loader.epoch(rng) {
        let (loss, grads) = model.backward(&x, &y)?;
        sgd.step(model.params_mut(), &grads)?;
        total += f64::from(loss);
        batches += 1;
    }
    if batches == 0 {
        return Ok(0.0);
    }
    Ok((total / batches as f64) as f32)
}

/// Plain descent plus the proximal pull toward the server anchor.
fn prox_epoch<M: Model, R: Rng>(
    model: &mut M,
    anchor: &ParamMap,
    mu: f32,
    loader: &BatchLoader,
    sgd: &Sgd,
    rng: &mut R,
) -> Result<f32> {
    let mut total = 0.0f64;
    let mut batches = 0usize;
    for (x, y) in loader.epoch(rng) {
        let (loss, mut grads) = model.backward(&x, &y)?;
        add_prox_pull(&mut grads, model.params(), anchor, mu)?;
        sgd.step(model.params_mut(), &grads)?;
        total += f64::from(loss);
        batches += 1;
    }
    if batches == 0 {
        return Ok(0.0);
    }
    Ok((total / batches as f64) as f32)
}

/// Evaluate a model on a loader without touching its state.
///
/// Returns (loss, accuracy): loss is the mean of the per-batch mean
/// losses, accuracy the fraction of correctly classified samples.
pub fn evaluate<M: Model, R: Rng>(
    model: &M,
    loader: &BatchLoader,
    rng: &mut R,
) -> Result<(f32, f32)> {
    let mut loss_sum = 0.0f64;
    let mut correct = 0.0f64;
    let mut batches = 0usize;
    let mut samples = 0usize;
    for (x, y) in loader.epoch(rng) {
        let scores = model.predict(&x)?;
        loss_sum += f64::from(loss::cross_entropy(&scores, &y)?);
        correct += f64::from(loss::accuracy(&scores, &y)?) * y.len() as f64;
        batches += 1;
        samples += y.len();
    }
    if batches == 0 {
        return Err(Error::Config("cannot evaluate on an empty loader".into()));
    }
    Ok((
        (loss_sum / batches as f64) as f32,
        (correct / samples as f64) as f32,
    ))
}
