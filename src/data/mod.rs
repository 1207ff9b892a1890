//! Datasets, batch loading, and synthetic data generation.

pub mod dataset;
pub mod loader;
pub mod synthetic;

pub use dataset::{Corruption, Dataset, ImageShape};
pub use loader::{BatchLoader, Epoch};
