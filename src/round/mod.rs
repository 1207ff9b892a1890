//! Round orchestration: the outer federated loop, its text records,
//! and checkpointing.

pub mod checkpoint;
pub mod orchestrator;
pub mod report;

pub use checkpoint::{client_key, Checkpoint, SERVER_KEY};
pub use orchestrator::{Phase, RoundOrchestrator, RunSummary};
pub use report::RunLog;
