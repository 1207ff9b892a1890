//! Checkpointing of run state at round boundaries.

use crate::core::config::Mode;
use crate::core::error::{Error, Result};
use crate::model::params::ParamMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Entry key of the server model.
pub const SERVER_KEY: &str = "server_model";

/// Entry key of client `idx`'s model.
pub fn client_key(idx: usize) -> String {
    format!("model_{idx}")
}

/// Snapshot of a run taken after a completed round.
///
/// Modes whose aggregation forces full convergence save only the server
/// entry; norm-excluding modes additionally save every client, since
/// their normalization parameters diverge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the last completed round
    pub a_iter: usize,
    /// Parameter maps keyed by model name
    pub entries: BTreeMap<String, ParamMap>,
}

impl Checkpoint {
    /// Capture the current run state.
    pub fn capture(mode: &Mode, a_iter: usize, server: &ParamMap, clients: &[&ParamMap]) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(SERVER_KEY.to_string(), server.clone());
        if mode.checkpoints_clients() {
            for (idx, client) in clients.iter().enumerate() {
                entries.insert(client_key(idx), (*client).clone());
            }
        }
        Self { a_iter, entries }
    }

    /// Write the snapshot to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        tracing::info!(path = %path.display(), round = self.a_iter, "checkpoint saved");
        Ok(())
    }

    /// Read a snapshot back from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let checkpoint = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| Error::DeserializationError(e.to_string()))?;
        Ok(checkpoint)
    }

    /// Restore saved parameters into live maps and return the first
    /// round still to run.
    ///
    /// Norm-excluding modes restore each client from its own entry;
    /// every other mode initializes all clients from the saved server
    /// state, which aggregation had forced them to equal anyway.
    pub fn restore(
        &self,
        mode: &Mode,
        server: &mut ParamMap,
        clients: &mut [&mut ParamMap],
    ) -> Result<usize> {
        let expected = 1 + if mode.checkpoints_clients() {
            clients.len()
        } else {
            0
        };
        if self.entries.len() != expected {
            return Err(Error::StateMismatch(format!(
                "checkpoint holds {} entries, configuration expects {expected}",
                self.entries.len()
            )));
        }
        let saved_server = self
            .entries
            .get(SERVER_KEY)
            .ok_or_else(|| Error::StateMismatch(format!("checkpoint has no {SERVER_KEY} entry")))?;
        server
            .copy_from(saved_server)
            .map_err(|e| Error::StateMismatch(e.to_string()))?;

        if mode.checkpoints_clients() {
            for (idx, client) in clients.iter_mut().enumerate() {
                let key = client_key(idx);
                let saved = self.entries.get(&key).ok_or_else(|| {
                    Error::StateMismatch(format!("checkpoint has no {key} entry"))
                })?;
                client
                    .copy_from(saved)
                    .map_err(|e| Error::StateMismatch(e.to_string()))?;
            }
        } else {
            for client in clients.iter_mut() {
                client
                    .copy_from(saved_server)
                    .map_err(|e| Error::StateMismatch(e.to_string()))?;
            }
        }
        tracing::info!(round = self.a_iter, "checkpoint restored");
        Ok(self.a_iter + 1)
    }
}
