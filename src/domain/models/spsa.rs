//! SPSA optimizer state owned by a tuning run.
//!
//! All of it is mutated only by the coordinator while it holds the run lock.

use serde::{Deserialize, Serialize};

use super::moments::MomentStats;

/// Sign of a single-parameter perturbation.
///
/// Serialized as `1` / `-1` to match the worker wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Flip {
    Minus,
    Plus,
}

impl Flip {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Minus => -1.0,
            Self::Plus => 1.0,
        }
    }

    /// The opposite sign, used for the mirrored side of a game pair.
    pub fn opposite(self) -> Self {
        match self {
            Self::Minus => Self::Plus,
            Self::Plus => Self::Minus,
        }
    }
}

impl From<Flip> for i8 {
    fn from(flip: Flip) -> Self {
        match flip {
            Flip::Minus => -1,
            Flip::Plus => 1,
        }
    }
}

impl TryFrom<i8> for Flip {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Plus),
            -1 => Ok(Self::Minus),
            other => Err(format!("flip must be 1 or -1, got {other}")),
        }
    }
}

/// How the legacy schedule turns a block of `N` pairs into one gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassicGain {
    /// Use the gain at the first pair of the block for the whole block.
    #[default]
    BlockStart,
    /// Use the mean per-pair gain over the block.
    BlockMean,
}

/// Optimizer family of a run, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Classic,
    ScheduleFreeSgd,
    ScheduleFreeAdam,
}

impl OptimizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::ScheduleFreeSgd => "schedule_free_sgd",
            Self::ScheduleFreeAdam => "schedule_free_adam",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "classic" | "spsa" => Some(Self::Classic),
            "schedule_free_sgd" | "sf_sgd" | "sgd" => Some(Self::ScheduleFreeSgd),
            "schedule_free_adam" | "sf_adam" | "adam" => Some(Self::ScheduleFreeAdam),
            _ => None,
        }
    }

    /// Whether the family keeps a fast iterate `z` and a surrogate blend.
    pub fn is_schedule_free(&self) -> bool {
        !matches!(self, Self::Classic)
    }
}

/// Run-level optimizer hyper-parameters, tagged by family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    /// Fixed-schedule SPSA with decaying gain and perturbation size.
    Classic {
        /// Stability offset of the gain schedule.
        #[serde(rename = "A")]
        big_a: f64,
        alpha: f64,
        gamma: f64,
        #[serde(default)]
        gain: ClassicGain,
    },
    ScheduleFreeSgd {
        lr: f64,
        /// Blend weight of the surrogate in the exported value.
        beta: f64,
    },
    ScheduleFreeAdam {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
    },
}

impl OptimizerConfig {
    pub fn kind(&self) -> OptimizerKind {
        match self {
            Self::Classic { .. } => OptimizerKind::Classic,
            Self::ScheduleFreeSgd { .. } => OptimizerKind::ScheduleFreeSgd,
            Self::ScheduleFreeAdam { .. } => OptimizerKind::ScheduleFreeAdam,
        }
    }
}

/// Per-parameter state and static configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpsaParam {
    pub name: String,
    pub start: f64,
    pub min: f64,
    pub max: f64,
    /// Exported value, always within `[min, max]`.
    pub theta: f64,
    /// Perturbation magnitude. Fixed for schedule-free runs; the schedule
    /// base `c_end * num_iter^gamma` for classic runs.
    pub c: f64,
    pub c_end: f64,
    pub r_end: f64,
    /// Classic gain numerator.
    #[serde(default)]
    pub a: f64,
    /// Fast iterate (schedule-free only).
    #[serde(default)]
    pub z: f64,
    /// Second-moment estimate (Adam only).
    #[serde(default)]
    pub v: f64,
}

impl SpsaParam {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// One parameter entry in a history snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// Display value: the surrogate when blending, else `theta`.
    pub theta: f64,
    pub c: f64,
}

/// Complete optimizer state of one tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpsaState {
    pub optimizer: OptimizerConfig,
    /// Consumed game pairs.
    pub iter: u64,
    /// Planned game pairs for the run.
    pub num_iter: u64,
    /// Cumulative schedule-free mass.
    #[serde(default)]
    pub sf_weight_sum: f64,
    #[serde(default)]
    pub moments: MomentStats,
    pub params: Vec<SpsaParam>,
    #[serde(default)]
    pub param_history: Vec<Vec<HistorySample>>,
}

impl SpsaState {
    pub fn kind(&self) -> OptimizerKind {
        self.optimizer.kind()
    }
}
