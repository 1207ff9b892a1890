//! Run configuration: federation modes, skew regimes, and hyperparameters.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Federation mode selecting the local-update rule and aggregation policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mode {
    /// Plain federated averaging, weighted by client sample counts.
    FedAvg,
    /// Federated averaging with a proximal pull toward the server model.
    FedProx {
        /// Proximal coefficient applied to the pull term.
        mu: f32,
    },
    /// Federated averaging that keeps normalization layers client-local.
    FedBn,
    /// Meta-gradient personalization consuming one batch per epoch.
    PerFedAvg {
        /// Step size of the first candidate refinement.
        alpha: f32,
        /// Step size of the second candidate refinement.
        beta: f32,
    },
    /// Meta-gradient personalization with a blended local reference.
    PFedMe {
        /// Step size of the first candidate refinement.
        alpha: f32,
        /// Step size of the second candidate refinement.
        beta: f32,
        /// Blend rate toward the candidate.
        blend_alpha: f32,
        /// Regularization weight scaling the blend.
        lambda: f32,
    },
}

impl Mode {
    /// Canonical lowercase name of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            Mode::FedAvg => "fedavg",
            Mode::FedProx { .. } => "fedprox",
            Mode::FedBn => "fedbn",
            Mode::PerFedAvg { .. } => "perfedavg",
            Mode::PFedMe { .. } => "pfedme",
        }
    }

    /// Whether aggregation skips parameters of normalization layers.
    pub fn excludes_norm_layers(&self) -> bool {
        matches!(self, Mode::FedBn)
    }

    /// Whether aggregation weights are proportional to client sample counts.
    pub fn weights_by_sample_count(&self) -> bool {
        matches!(self, Mode::FedAvg)
    }

    /// Whether the checkpoint must carry one parameter map per client.
    pub fn checkpoints_clients(&self) -> bool {
        matches!(self, Mode::FedBn)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::FedBn
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fedavg" => Ok(Mode::FedAvg),
            "fedprox" => Ok(Mode::FedProx { mu: 1e-2 }),
            "fedbn" => Ok(Mode::FedBn),
            "perfedavg" => Ok(Mode::PerFedAvg {
                alpha: 1e-2,
                beta: 1e-3,
            }),
            "pfedme" => Ok(Mode::PFedMe {
                alpha: 1e-2,
                beta: 1e-3,
                blend_alpha: 5e-3,
                lambda: 15.0,
            }),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}

/// Data heterogeneity regime applied when partitioning the training set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SkewKind {
    /// Every client sees the full, uncorrupted training set.
    None,
    /// Dirichlet-drawn shard sizes over a shuffled sample order.
    Quantity {
        /// Dirichlet concentration for the shard-size draw.
        alpha: f64,
    },
    /// Additive gaussian input noise on a random half of the clients.
    FeatNoise {
        /// Standard deviation of the per-access noise.
        std: f32,
    },
    /// Mean-filter blur on a random half of the clients.
    FeatFilter {
        /// Side length of the averaging window.
        size: usize,
    },
    /// Dirichlet split of the label set across clients.
    LabelAcross {
        /// Dirichlet concentration for the label-count draw.
        alpha: f64,
        /// Whether donation steps may duplicate labels across clients.
        overlap: bool,
    },
    /// Per-label Dirichlet split of samples with a capacity cap.
    LabelWithin {
        /// Dirichlet concentration for the per-label split.
        alpha: f64,
    },
}

impl SkewKind {
    /// Canonical lowercase name of the regime.
    pub fn name(&self) -> &'static str {
        match self {
            SkewKind::None => "none",
            SkewKind::Quantity { .. } => "quantity",
            SkewKind::FeatNoise { .. } => "feat_noise",
            SkewKind::FeatFilter { .. } => "feat_filter",
            SkewKind::LabelAcross { .. } => "label_across",
            SkewKind::LabelWithin { .. } => "label_within",
        }
    }
}

impl Default for SkewKind {
    fn default() -> Self {
        SkewKind::None
    }
}

impl fmt::Display for SkewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SkewKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(SkewKind::None),
            "quantity" => Ok(SkewKind::Quantity { alpha: 0.5 }),
            "feat_noise" => Ok(SkewKind::FeatNoise { std: 0.5 }),
            "feat_filter" => Ok(SkewKind::FeatFilter { size: 3 }),
            "label_across" => Ok(SkewKind::LabelAcross {
                alpha: 0.5,
                overlap: true,
            }),
            "label_within" => Ok(SkewKind::LabelWithin { alpha: 0.5 }),
            other => Err(Error::UnknownSkew(other.to_string())),
        }
    }
}

/// Configuration for a full federated run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Federation mode
    pub mode: Mode,
    /// Heterogeneity regime for the training partition
    pub skew: SkewKind,
    /// Number of simulated clients
    pub nclient: usize,
    /// Number of distinct labels the label regimes distribute
    pub nlabel: usize,
    /// Number of communication rounds
    pub rounds: usize,
    /// Local epochs per round
    pub wk_iters: usize,
    /// Learning rate of the local optimizer
    pub lr: f32,
    /// Batch size of every loader
    pub batch_size: usize,
    /// Smallest admissible client shard
    pub min_shard: usize,
    /// Seed for the run-wide random generator
    pub seed: u64,
    /// Optional checkpoint file written after the final round
    pub checkpoint: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            skew: SkewKind::default(),
            nclient: 5,
            nlabel: 10,
            rounds: 50,
            wk_iters: 3,
            lr: 1e-4,
            batch_size: 32,
            min_shard: 32,
            seed: 400,
            checkpoint: None,
        }
    }
}

impl RunConfig {
    /// Set the federation mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the heterogeneity regime.
    pub fn with_skew(mut self, skew: SkewKind) -> Self {
        self.skew = skew;
        self
    }

    /// Set the number of communication rounds.
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    /// Set the generator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the checkpoint path written after the final round.
    pub fn with_checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint = Some(path);
        self
    }

    /// Check structural bounds that do not depend on the dataset.
    pub fn validate(&self) -> Result<()> {
        if self.nclient < 2 {
            return Err(Error::Config(format!(
                "at least 2 clients required, got {}",
                self.nclient
            )));
        }
        if self.rounds == 0 {
            return Err(Error::Config("rounds must be at least 1".into()));
        }
        if self.wk_iters == 0 {
            return Err(Error::Config("wk_iters must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if self.min_shard == 0 {
            return Err(Error::Config("min_shard must be at least 1".into()));
        }
        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(Error::Config(format!("lr must be positive, got {}", self.lr)));
        }
        match &self.mode {
            Mode::FedProx { mu } if !mu.is_finite() || *mu < 0.0 => {
                return Err(Error::Config(format!("mu must be non-negative, got {mu}")));
            }
            Mode::PerFedAvg { alpha, beta } if !(alpha.is_finite() && beta.is_finite()) => {
                return Err(Error::Config("perfedavg step sizes must be finite".into()));
            }
            Mode::PFedMe {
                alpha,
                beta,
                blend_alpha,
                lambda,
            } if !(alpha.is_finite()
                && beta.is_finite()
                && blend_alpha.is_finite()
                && lambda.is_finite()) =>
            {
                return Err(Error::Config("pfedme coefficients must be finite".into()));
            }
            _ => {}
        }
        match &self.skew {
            SkewKind::Quantity { alpha }
            | SkewKind::LabelAcross { alpha, .. }
            | SkewKind::LabelWithin { alpha } => {
                if !alpha.is_finite() || *alpha <= 0.0 {
                    return Err(Error::Config(format!(
                        "dirichlet alpha must be positive, got {alpha}"
                    )));
                }
            }
            SkewKind::FeatNoise { std } => {
                if !std.is_finite() || *std < 0.0 {
                    return Err(Error::Config(format!(
                        "noise std must be non-negative, got {std}"
                    )));
                }
            }
            SkewKind::FeatFilter { size } => {
                if *size == 0 {
                    return Err(Error::Config("filter size must be at least 1".into()));
                }
            }
            SkewKind::None => {}
        }
        if matches!(self.skew, SkewKind::LabelAcross { .. }) && self.nlabel < self.nclient {
            return Err(Error::Config(format!(
                "label_across needs nlabel >= nclient, got {} < {}",
                self.nlabel, self.nclient
            )));
        }
        if matches!(
            self.skew,
            SkewKind::LabelAcross { .. } | SkewKind::LabelWithin { .. }
        ) && self.nlabel == 0
        {
            return Err(Error::Config("nlabel must be at least 1".into()));
        }
        Ok(())
    }
}
