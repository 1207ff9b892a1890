//! Model abstraction and the bundled reference network.

pub mod digit;
pub mod loss;
pub mod params;

pub use digit::DigitNet;
pub use params::{is_counter_param, is_norm_param, ParamMap};

use crate::core::error::Result;
use ndarray::Array2;

/// A trainable classifier exposing its state as a named parameter map.
///
/// Trainers and the aggregator address parameters only through the map,
/// so any model with named tensors can ride the same round loop.
pub trait Model: Clone {
    /// Named parameter map backing this model.
    fn params(&self) -> &ParamMap;

    /// Mutable access to the parameter map.
    fn params_mut(&mut self) -> &mut ParamMap;

    /// Class scores in evaluation mode. Running statistics are read,
    /// never written.
    fn predict(&self, inputs: &Array2<f32>) -> Result<Array2<f32>>;

    /// Training-mode forward and backward pass.
    ///
    /// Returns the batch loss and a gradient map. The gradient map may
    /// omit parameters that receive no gradient; running statistics are
    /// updated in place as a side effect of the forward pass.
    fn backward(&mut self, inputs: &Array2<f32>, targets: &[usize]) -> Result<(f32, ParamMap)>;
}
