//! The outer federated loop.
//!
//! One round is a fixed number of local epochs on every client, one
//! aggregation, and one evaluation pass. The orchestrator owns the
//! server model, the client copies, and the checkpoint boundary.

use crate::aggregate::{aggregate, client_weights};
use crate::core::config::RunConfig;
use crate::core::error::{Error, Result};
use crate::data::loader::BatchLoader;
use crate::model::params::ParamMap;
use crate::model::Model;
use crate::partition::Partitioned;
use crate::round::checkpoint::Checkpoint;
use crate::round::report::RunLog;
use crate::trainer::{evaluate, LocalTrainer};
use rand::rngs::StdRng;
use std::io::Write;
use std::path::Path;

/// Loss sentinel the best-client search starts from.
const LOSS_SENTINEL: f32 = 1000.0;

/// Where the orchestrator is in its round cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Init,
    LocalTraining,
    Aggregating,
    Evaluating,
    Checkpointed,
}

/// Metrics of a finished run.
#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    /// Rounds executed by this process, restored rounds excluded
    pub rounds_completed: usize,
    /// Server test loss of the final round, zero if none ran
    pub test_loss: f32,
    /// Server test accuracy of the final round, zero if none ran
    pub test_acc: f32,
}

/// Drives communication rounds over one server model and its client
/// copies.
#[derive(Debug)]
pub struct RoundOrchestrator<M: Model> {
    cfg: RunConfig,
    server: M,
    clients: Vec<M>,
    train_loaders: Vec<BatchLoader>,
    test_loader: BatchLoader,
    rng: StdRng,
    phase: Phase,
    start_round: usize,
}

impl<M: Model> RoundOrchestrator<M> {
    /// Set up a fresh run: every client starts as a copy of `template`.
    pub fn new(cfg: RunConfig, template: M, data: Partitioned, rng: StdRng) -> Result<Self> {
        cfg.validate()?;
        if data.shards.len() != cfg.nclient {
            return Err(Error::Config(format!(
                "{} shards for {} clients",
                data.shards.len(),
                cfg.nclient
            )));
        }
        let train_loaders = data
            .shards
            .into_iter()
            .map(|shard| BatchLoader::new(shard, cfg.batch_size))
            .collect::<Result<Vec<_>>>()?;
        let test_loader = BatchLoader::new(data.test, cfg.batch_size)?;
        let clients = vec![template.clone(); cfg.nclient];
        Ok(Self {
            cfg,
            server: template,
            clients,
            train_loaders,
            test_loader,
            rng,
            phase: Phase::Init,
            start_round: 0,
        })
    }

    /// Set up a resumed run from a saved checkpoint.
    ///
    /// The shards and model template must match the saved run; any
    /// name, shape, or count drift fails with a state mismatch.
    pub fn resume(
        cfg: RunConfig,
        template: M,
        data: Partitioned,
        rng: StdRng,
        path: &Path,
    ) -> Result<Self> {
        let mut orch = Self::new(cfg, template, data, rng)?;
        let ckpt = Checkpoint::load(path)?;
        let mut client_params: Vec<&mut ParamMap> = orch
            .clients
            .iter_mut()
            .map(|client| client.params_mut())
            .collect();
        orch.start_round =
            ckpt.restore(&orch.cfg.mode, orch.server.params_mut(), &mut client_params)?;
        tracing::info!(round = orch.start_round, "resuming");
        Ok(orch)
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// First round this process will run.
    pub fn start_round(&self) -> usize {
        self.start_round
    }

    pub fn server(&self) -> &M {
        &self.server
    }

    pub fn clients(&self) -> &[M] {
        &self.clients
    }

    /// Run every remaining round, writing records to `log`.
    pub fn run<W: Write>(&mut self, log: &mut RunLog<W>) -> Result<RunSummary> {
        let Self {
            cfg,
            server,
            clients,
            train_loaders,
            test_loader,
            rng,
            phase,
            start_round,
        } = self;

        log.header(cfg)?;
        tracing::info!(config = %serde_json::to_string(cfg)?, "run configured");

        let mut rounds_completed = 0usize;
        let mut last_loss = 0.0f32;
        let mut last_acc = 0.0f32;

        for round in *start_round..cfg.rounds {
            *phase = Phase::LocalTraining;
            let trainer = LocalTrainer::new(&cfg.mode, cfg.lr);
            for wi in 0..cfg.wk_iters {
                log.epoch(wi + round * cfg.wk_iters)?;
                for (idx, client) in clients.iter_mut().enumerate() {
                    let loss =
                        trainer.run_epoch(client, Some(server.params()), round, &train_loaders[idx], rng)?;
                    tracing::debug!(round, epoch = wi, client = idx, loss, "local epoch");
                }
            }

            *phase = Phase::Aggregating;
            let counts: Vec<usize> = train_loaders.iter().map(BatchLoader::nsamples).collect();
            let weights = client_weights(&cfg.mode, &counts)?;
            let mut client_params: Vec<&mut ParamMap> = clients
                .iter_mut()
                .map(|client| client.params_mut())
                .collect();
            aggregate(&cfg.mode, server.params_mut(), &mut client_params, &weights)?;

            *phase = Phase::Evaluating;
            for (idx, client) in clients.iter().enumerate() {
                let (loss, acc) = evaluate(client, &train_loaders[idx], rng)?;
                log.client_train(idx, loss, acc)?;
            }
            let mut best_loss = LOSS_SENTINEL;
            let mut best_acc = 0.0f32;
            let mut best_idx: Option<usize> = None;
            for (idx, client) in clients.iter().enumerate() {
                let (loss, acc) = evaluate(client, test_loader, rng)?;
                log.client_test(idx, loss, acc)?;
                if acc > best_acc {
                    best_loss = loss;
                    best_acc = acc;
                    best_idx = Some(idx);
                }
            }
            // the round's server model is the best client this round
            if let Some(idx) = best_idx {
                let best = clients[idx].params().clone();
                server.params_mut().copy_from(&best)?;
            }
            log.server_test(best_loss, best_acc)?;
            log.flush()?;

            tracing::info!(round, test_loss = best_loss, test_acc = best_acc, "round complete");
            last_loss = best_loss;
            last_acc = best_acc;
            rounds_completed += 1;
        }

        *phase = Phase::Checkpointed;
        if let Some(path) = &cfg.checkpoint {
            let client_params: Vec<&ParamMap> =
                clients.iter().map(|client| client.params()).collect();
            Checkpoint::capture(&cfg.mode, cfg.rounds - 1, server.params(), &client_params)
                .save(path)?;
        }
        log.flush()?;

        Ok(RunSummary {
            rounds_completed,
            test_loss: last_loss,
            test_acc: last_acc,
        })
    }
}
