//! Named parameter maps shared by models, trainers, and aggregation.

use crate::core::error::{Error, Result};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a parameter name belongs to a normalization layer.
pub fn is_norm_param(name: &str) -> bool {
    name.contains("bn")
}

/// Whether a parameter is a batch counter rather than a learnable tensor.
pub fn is_counter_param(name: &str) -> bool {
    name.contains("num_batches_tracked")
}

/// Ordered map of named tensors holding the state of one model.
///
/// Iteration order is the sorted name order, so every walk over two
/// compatible maps visits the same parameter at the same step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamMap {
    entries: BTreeMap<String, ArrayD<f32>>,
}

impl ParamMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Number of named tensors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no tensors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace a named tensor.
    pub fn insert(&mut self, name: impl Into<String>, value: ArrayD<f32>) {
        self.entries.insert(name.into(), value);
    }

    /// Whether a name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Look up a tensor by name.
    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.entries.get(name)
    }

    /// Look up a tensor by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArrayD<f32>> {
        self.entries.get_mut(name)
    }

    /// Look up a tensor that must be present.
    pub fn require(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    /// Mutable lookup of a tensor that must be present.
    pub fn require_mut(&mut self, name: &str) -> Result<&mut ArrayD<f32>> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    /// Iterate names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Iterate (name, tensor) pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArrayD<f32>)> {
        self.entries.iter()
    }

    /// Iterate (name, tensor) pairs mutably, in sorted order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut ArrayD<f32>)> {
        self.entries.iter_mut()
    }

    /// A map with the same names and shapes, all values zero.
    pub fn zeros_like(&self) -> ParamMap {
        let entries = self
            .entries
            .iter()
            .map(|(name, value)| (name.clone(), ArrayD::zeros(value.raw_dim())))
            .collect();
        Self { entries }
    }

    /// Check that `other` has exactly the same names and shapes.
    pub fn check_compatible(&self, other: &ParamMap) -> Result<()> {
        if self.len() != other.len() {
            return Err(Error::ShapeMismatch(format!(
                "parameter count {} vs {}",
                self.len(),
                other.len()
            )));
        }
        for (name, value) in &self.entries {
            let theirs = other.require(name)?;
            if theirs.shape() != value.shape() {
                return Err(Error::ShapeMismatch(format!(
                    "{name}: {:?} vs {:?}",
                    value.shape(),
                    theirs.shape()
                )));
            }
        }
        Ok(())
    }

    /// Add `alpha * other` into this map, entry by entry.
    ///
    /// `other` may name any subset of this map's parameters; entries it
    /// omits are left untouched. Naming a parameter this map lacks is an
    /// error.
    pub fn axpy(&mut self, alpha: f32, other: &ParamMap) -> Result<()> {
        for (name, delta) in &other.entries {
            let entry = self.require_mut(name)?;
            if entry.shape() != delta.shape() {
                return Err(Error::ShapeMismatch(format!(
                    "{name}: {:?} vs {:?}",
                    entry.shape(),
                    delta.shape()
                )));
            }
            entry.scaled_add(alpha, delta);
        }
        Ok(())
    }

    /// Overwrite every entry with the values from `other`.
    pub fn copy_from(&mut self, other: &ParamMap) -> Result<()> {
        self.check_compatible(other)?;
        for (name, entry) in self.entries.iter_mut() {
            if let Some(theirs) = other.entries.get(name) {
                entry.assign(theirs);
            }
        }
        Ok(())
    }
}
