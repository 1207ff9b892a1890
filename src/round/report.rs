//! Per-round text records in the fixed format the offline analysis
//! tooling parses.

use crate::core::config::RunConfig;
use crate::core::error::Result;
use std::io::Write;

/// Writes round records to any byte sink.
///
/// Downstream parsers match the literal substrings `"Train Loss: "` and
/// `"Test  Acc: "` and key each record on the text before its first
/// `'|'`, so these formats are load-bearing and must not drift.
pub struct RunLog<W: Write> {
    sink: W,
}

impl<W: Write> RunLog<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Run banner: wall-clock timestamp followed by the settings block.
    pub fn header(&mut self, cfg: &RunConfig) -> Result<()> {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(self.sink, "==={stamp}===")?;
        writeln!(self.sink, "===Setting===")?;
        writeln!(self.sink, "    lr: {}", cfg.lr)?;
        writeln!(self.sink, "    batch: {}", cfg.batch_size)?;
        writeln!(self.sink, "    iters: {}", cfg.rounds)?;
        writeln!(self.sink, "    wk_iters: {}", cfg.wk_iters)?;
        Ok(())
    }

    /// Epoch banner. The counter is global: `local_epoch + round * wk_iters`.
    pub fn epoch(&mut self, epoch: usize) -> Result<()> {
        writeln!(self.sink, "============ Train epoch {epoch} ============")?;
        Ok(())
    }

    /// One client's metrics on its own training shard.
    pub fn client_train(&mut self, client: usize, loss: f32, acc: f32) -> Result<()> {
        writeln!(
            self.sink,
            " client {client}| Train Loss: {loss:.4} | Train Acc: {acc:.4}"
        )?;
        Ok(())
    }

    /// One client's metrics on the shared test shard.
    pub fn client_test(&mut self, client: usize, loss: f32, acc: f32) -> Result<()> {
        writeln!(
            self.sink,
            " client {client}| Test  Loss: {loss:.4} | Test  Acc: {acc:.4}"
        )?;
        Ok(())
    }

    /// The round's server metric, the best client observed this round.
    pub fn server_test(&mut self, loss: f32, acc: f32) -> Result<()> {
        writeln!(
            self.sink,
            " server | Test  Loss: {loss:.4} | Test  Acc: {acc:.4}"
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Give the sink back, e.g. to inspect an in-memory log.
    pub fn into_inner(self) -> W {
        self.sink
    }
}
