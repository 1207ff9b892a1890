//! Constant-rate gradient descent and the proximal gradient term.

use crate::core::error::{Error, Result};
use crate::model::params::ParamMap;

/// Plain gradient descent with a fixed learning rate. Rebuilt fresh for
/// every round, so it carries no momentum or schedule state.
#[derive(Clone, Copy, Debug)]
pub struct Sgd {
    lr: f32,
}

impl Sgd {
    /// Descent with the given learning rate.
    pub fn new(lr: f32) -> Self {
        Self { lr }
    }

    /// The configured learning rate.
    pub fn lr(&self) -> f32 {
        self.lr
    }

    /// Apply one descent step: `params -= lr * grads`.
    ///
    /// Parameters the gradient map does not name are left untouched.
    pub fn step(&self, params: &mut ParamMap, grads: &ParamMap) -> Result<()> {
        params.axpy(-self.lr, grads)
    }
}

/// Add the proximal pull `mu * (local - anchor)` into `grads`.
///
/// Only parameters already named by `grads` are pulled, so entries
/// without a gradient never drift toward the anchor.
pub fn add_prox_pull(
    grads: &mut ParamMap,
    local: &ParamMap,
    anchor: &ParamMap,
    mu: f32,
) -> Result<()> {
    for (name, grad) in grads.iter_mut() {
        let w = local.require(name)?;
        let w_anchor = anchor.require(name)?;
        if w.shape() != grad.shape() || w_anchor.shape() != grad.shape() {
            return Err(Error::ShapeMismatch(format!(
                "{name}: {:?} vs {:?} vs {:?}",
                grad.shape(),
                w.shape(),
                w_anchor.shape()
            )));
        }
        ndarray::Zip::from(grad)
            .and(w)
            .and(w_anchor)
            .for_each(|g, &wv, &av| *g += mu * (wv - av));
    }
    Ok(())
}
