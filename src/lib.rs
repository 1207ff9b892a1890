//! # fedskew - Federated Learning under Data Heterogeneity
//!
//! A single-process simulator for comparing federated aggregation
//! strategies on skewed client data:
//! - **Partitioning**: five heterogeneity regimes (quantity, feature
//!   noise, feature filtering, cross-client and within-client label
//!   skew) with minimum-shard guarantees
//! - **Local training**: plain SGD, proximal SGD, and two
//!   meta-gradient personalization variants
//! - **Aggregation**: weighted parameter averaging with per-mode
//!   exclusion rules and checkpointed resume
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fedskew::core::{Mode, RunConfig};
//! use fedskew::data::synthetic;
//! use fedskew::model::digit::DigitNet;
//! use fedskew::partition::partition;
//! use fedskew::round::{RoundOrchestrator, RunLog};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! fn main() {
//!     let cfg = RunConfig::default().with_mode(Mode::FedAvg).with_rounds(3);
//!     let mut rng = StdRng::seed_from_u64(cfg.seed);
//!     let train = synthetic::class_blobs(10, 100, 16, 0.5, &mut rng).unwrap();
//!     let test = synthetic::class_blobs(10, 20, 16, 0.5, &mut rng).unwrap();
//!     let data = partition(&train, &test, &cfg, &mut rng).unwrap();
//!     let model = DigitNet::new(16, 32, 10, &mut rng).unwrap();
//!     let mut orch = RoundOrchestrator::new(cfg, model, data, rng).unwrap();
//!     let mut log = RunLog::new(std::io::stdout());
//!     let summary = orch.run(&mut log).unwrap();
//!     println!("final acc: {:.4}", summary.test_acc);
//! }
//! ```

pub mod aggregate;
pub mod core;
pub mod data;
pub mod model;
pub mod partition;
pub mod round;
pub mod trainer;

pub use core::error::{Error, Result};
