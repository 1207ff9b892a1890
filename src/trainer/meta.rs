//! Meta-gradient personalization epochs.
//!
//! Both variants run the same update cycle on a batch: take a descent
//! step, snapshot the stepped parameters as a candidate, then refine the
//! candidate with two more gradients taken at the live point. They
//! differ in what happens next and in how much of the shard they see.

use crate::core::error::Result;
use crate::data::loader::BatchLoader;
use crate::model::params::ParamMap;
use crate::model::Model;
use crate::trainer::sgd::Sgd;
use rand::Rng;

/// One-batch personalization epoch.
///
/// Only the first batch of the shuffled epoch is consumed: the cycle
/// runs once and the epoch ends, whatever the shard size. Returns the
/// batch's pre-step loss, or zero for an empty shard.
pub(super) fn perfedavg_epoch<M: Model, R: Rng>(
    model: &mut M,
    loader: &BatchLoader,
    sgd: &Sgd,
    alpha: f32,
    beta: f32,
    rng: &mut R,
) -> Result<f32> {
    if let Some((x, y)) = loader.epoch(rng).next() {
        let (loss, grads) = model.backward(&x, &y)?;
        sgd.step(model.params_mut(), &grads)?;

        let mut candidate = model.params().clone();
        let (_, grads) = model.backward(&x, &y)?;
        candidate.axpy(-alpha, &grads)?;
        let (_, grads) = model.backward(&x, &y)?;
        candidate.axpy(-beta, &grads)?;

        model.params_mut().copy_from(&candidate)?;
        return Ok(loss);
    }
    Ok(0.0)
}

/// Full-shard personalization epoch with a blended local reference.
///
/// Every batch runs the update cycle, then pulls a pre-step snapshot
/// toward the candidate: `local -= rate * (local - candidate)`, touching
/// only parameters that carried a gradient. The model becomes the
/// blended snapshot. Returns the mean pre-step loss over the epoch.
pub(super) fn pfedme_epoch<M: Model, R: Rng>(
    model: &mut M,
    loader: &BatchLoader,
    sgd: &Sgd,
    alpha: f32,
    beta: f32,
    blend_rate: f32,
    rng: &mut R,
) -> Result<f32> {
    let mut total = 0.0f64;
    let mut batches = 0usize;
    for (x, y) in loader.epoch(rng) {
        let mut local = model.params().clone();

        let (loss, grads) = model.backward(&x, &y)?;
        sgd.step(model.params_mut(), &grads)?;

        let mut candidate = model.params().clone();
        let (_, grads) = model.backward(&x, &y)?;
        candidate.axpy(-alpha, &grads)?;
        let (_, grads) = model.backward(&x, &y)?;
        candidate.axpy(-beta, &grads)?;

        blend_named(&mut local, &candidate, &grads, blend_rate)?;
        model.params_mut().copy_from(&local)?;

        total += f64::from(loss);
        batches += 1;
    }
    if batches == 0 {
        return Ok(0.0);
    }
    Ok((total / batches as f64) as f32)
}

/// Pull `local` toward `candidate` on the parameters `names` carries.
fn blend_named(
    local: &mut ParamMap,
    candidate: &ParamMap,
    names: &ParamMap,
    rate: f32,
) -> Result<()> {
    for (name, _) in names.iter() {
        let target = candidate.require(name)?;
        let entry = local.require_mut(name)?;
        entry.zip_mut_with(target, |a, &b| *a -= rate * (*a - b));
    }
    Ok(())
}
