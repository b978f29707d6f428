//! Request/report payloads exchanged with workers.

use serde::{Deserialize, Serialize};

use super::spsa::Flip;

/// Perturbed value of one parameter for the "white" side of a game pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamPerturbation {
    pub name: String,
    /// `clamp(theta + c * flip)`.
    pub value: f64,
    pub c: f64,
    pub flip: Flip,
    /// Classic gain `R = a / (A + k)^alpha / c²`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
}

/// Mirrored value for the "black" side, `clamp(theta - c * flip)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorParam {
    pub name: String,
    pub value: f64,
}

/// Answer to a perturbation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerturbationResponse {
    pub task_alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default)]
    pub w_params: Vec<ParamPerturbation>,
    #[serde(default)]
    pub b_params: Vec<MirrorParam>,
    #[serde(rename = "sig", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<u32>,
}

impl PerturbationResponse {
    /// A response telling the worker its task is gone.
    pub fn dead(info: impl Into<String>) -> Self {
        Self {
            task_alive: false,
            info: Some(info.into()),
            ..Self::default()
        }
    }
}

/// Aggregated result of a batch of paired games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpsaReport {
    pub wins: u64,
    pub losses: u64,
    #[serde(default)]
    pub draws: u64,
    pub num_games: u64,
    #[serde(rename = "sig", default)]
    pub signature: Option<u32>,
}

impl SpsaReport {
    /// Wins minus losses.
    pub fn signed_result(&self) -> f64 {
        self.wins as f64 - self.losses as f64
    }

    /// Number of game pairs in the batch.
    pub fn pairs(&self) -> u64 {
        self.num_games / 2
    }
}

/// What happened to a report.
///
/// Every variant except `Applied` left optimizer state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Applied { iteration: u64 },
    NoPendingPerturbation,
    SignatureMismatch { expected: u32, received: u32 },
    EmptyBatch,
    RunNotFound,
    TaskNotFound,
    RunFinished,
    NotPrimary,
    StorageFailure,
}

impl ReportOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::NoPendingPerturbation => "no_pending_perturbation",
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::EmptyBatch => "empty_batch",
            Self::RunNotFound => "run_not_found",
            Self::TaskNotFound => "task_not_found",
            Self::RunFinished => "run_finished",
            Self::NotPrimary => "not_primary",
            Self::StorageFailure => "storage_failure",
        }
    }
}
