//! Tuning run and per-task ephemeral perturbation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::spsa::SpsaState;

/// Perturbation issued to a task and not yet consumed by a report.
///
/// Only the counter and the packed flip bits are kept: everything else is
/// regenerated deterministically on report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpsaParams {
    /// Value of the run's `iter` the perturbation was derived from.
    pub iter: u64,
    pub packed_flips: Vec<u8>,
}

/// A worker's slot in a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunTask {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spsa_params: Option<TaskSpsaParams>,
}

impl RunTask {
    pub fn new(worker: impl Into<String>) -> Self {
        Self {
            active: true,
            worker: Some(worker.into()),
            spsa_params: None,
        }
    }

    /// Remove and return the pending perturbation, if any.
    ///
    /// A report can only ever consume the state once.
    pub fn take_spsa_params(&mut self) -> Option<TaskSpsaParams> {
        self.spsa_params.take()
    }
}

/// A tuning run as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    /// Total planned games (two per pair).
    pub num_games: u64,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub tasks: Vec<RunTask>,
    pub spsa: SpsaState,
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Run {
    pub fn new(id: Uuid, num_games: u64, spsa: SpsaState) -> Self {
        let now = Utc::now();
        Self {
            id,
            num_games,
            finished: false,
            deleted: false,
            tasks: Vec::new(),
            spsa,
            start_time: now,
            last_updated: now,
        }
    }

    /// Whether the run still accepts perturbation requests and reports.
    pub fn is_alive(&self) -> bool {
        !self.finished && !self.deleted
    }

    /// Append an active task and return its id.
    pub fn add_task(&mut self, worker: impl Into<String>) -> usize {
        self.tasks.push(RunTask::new(worker));
        self.tasks.len() - 1
    }

    pub fn task(&self, task_id: usize) -> Option<&RunTask> {
        self.tasks.get(task_id)
    }

    pub fn task_mut(&mut self, task_id: usize) -> Option<&mut RunTask> {
        self.tasks.get_mut(task_id)
    }

    /// Mark finished. Pending perturbations are dropped with it.
    pub fn finish(&mut self) {
        self.finished = true;
        for task in &mut self.tasks {
            task.active = false;
            task.spsa_params = None;
        }
    }
}
