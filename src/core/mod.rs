//! Core utilities and common types for fedskew.

pub mod config;
pub mod error;

pub use config::{Mode, RunConfig, SkewKind};
pub use error::{Error, Result};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a global `tracing` subscriber reading `RUST_LOG`, falling
/// back to `fedskew=info`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fedskew=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}
