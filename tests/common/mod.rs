//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

#![allow(dead_code)]

use std::sync::Arc;

use spsa_coordinator::domain::models::{Run, TaskSpsaParams};
use spsa_coordinator::services::{pack_flips, signature};
use spsa_coordinator::{
    Flip, InMemoryRunRepository, OptimizerKind, RunBuilder, RunLockTable, SpsaReport, SpsaService,
    TuningDefinition,
};
use uuid::Uuid;

pub type Service = SpsaService<InMemoryRunRepository, RunLockTable>;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Build a run from raw parameter lines with `tasks` active tasks.
pub fn build_run(raw: &str, num_games: u64, kind: OptimizerKind, tasks: usize) -> Run {
    let mut run = RunBuilder::default()
        .build_run(Uuid::new_v4(), &TuningDefinition::new(raw, num_games, kind))
        .expect("valid tuning definition");
    for i in 0..tasks {
        run.add_task(format!("worker-{i}"));
    }
    run
}

/// Primary service over a fresh repository holding `run`.
pub async fn primary_service(run: Run) -> (Service, Arc<InMemoryRunRepository>, Uuid) {
    let repo = Arc::new(InMemoryRunRepository::new());
    let run_id = run.id;
    repo.insert_run(run).await;
    let service = SpsaService::new(Arc::clone(&repo), Arc::new(RunLockTable::default()), &true)
        .with_rng_seed(1234);
    (service, repo, run_id)
}

/// Put a perturbation with known flips on a task, as `request` would.
///
/// Returns the signature a worker would echo back.
pub async fn issue_flips(
    repo: &InMemoryRunRepository,
    run_id: Uuid,
    task_id: usize,
    flips: &[Flip],
) -> u32 {
    use spsa_coordinator::RunRepository;

    let mut run = repo.get_run(run_id).await.unwrap().unwrap();
    let packed_flips = pack_flips(flips);
    let sig = signature(&packed_flips);
    run.tasks[task_id].spsa_params = Some(TaskSpsaParams {
        iter: run.spsa.iter,
        packed_flips,
    });
    repo.insert_run(run).await;
    sig
}

/// Report of `num_games` games with `wins - losses == signed_result`.
pub fn report(num_games: u64, signed_result: i64, signature: Option<u32>) -> SpsaReport {
    let pairs = num_games / 2;
    let (wins, losses) = if signed_result >= 0 {
        (signed_result.unsigned_abs(), 0)
    } else {
        (0, signed_result.unsigned_abs())
    };
    SpsaReport {
        wins,
        losses,
        draws: (pairs * 2).saturating_sub(wins + losses),
        num_games,
        signature,
    }
}
