//! Run optimizer coordinator.
//!
//! Issues perturbations to workers and folds their batched game results back
//! into the run's optimizer state. Both entry points run under the run's
//! lock and never fail towards the worker: every rejected call is logged and
//! leaves optimizer state untouched.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    PerturbationResponse, ReportOutcome, Run, SpsaReport, SpsaState, TaskSpsaParams,
};
use crate::domain::ports::{InstanceRole, RunLocks, RunRepository};

use super::history::record_history;
use super::optimizer::apply_report;
use super::perturbation::{generate, regenerate};
use super::signature::{pack_flips, signature, unpack_flips};

/// Coordinates perturbation issuance and report application for all runs.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use spsa_coordinator::adapters::InMemoryRunRepository;
/// use spsa_coordinator::services::{RunLockTable, SpsaService};
///
/// # async fn example(run_id: uuid::Uuid) {
/// let service = SpsaService::new(
///     Arc::new(InMemoryRunRepository::new()),
///     Arc::new(RunLockTable::default()),
///     &true,
/// );
/// let response = service.request_spsa_data(run_id, 0).await;
/// # }
/// ```
pub struct SpsaService<R, L> {
    repo: Arc<R>,
    locks: Arc<L>,
    /// Persistence hand-off, only wired on the primary instance.
    writer: Option<Arc<R>>,
    rng: Mutex<StdRng>,
}

impl<R, L> SpsaService<R, L>
where
    R: RunRepository,
    L: RunLocks,
{
    /// Create the coordinator. On a replica the write path stays unwired.
    pub fn new(repo: Arc<R>, locks: Arc<L>, role: &dyn InstanceRole) -> Self {
        let writer = role.is_primary().then(|| Arc::clone(&repo));
        Self {
            repo,
            locks,
            writer,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seed the flip generator, for reproducible runs.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn is_primary(&self) -> bool {
        self.writer.is_some()
    }

    /// Issue a new perturbation to `task_id`.
    ///
    /// Stores the issuing counter and packed flips on the task, overwriting
    /// any unconsumed perturbation. Does not advance `iter`.
    #[instrument(skip(self))]
    pub async fn request_spsa_data(&self, run_id: Uuid, task_id: usize) -> PerturbationResponse {
        let Some(writer) = &self.writer else {
            warn!("perturbation requested from a replica");
            return PerturbationResponse::dead("not the primary instance");
        };

        let _guard = self.locks.acquire(run_id).await;

        let mut run = match self.repo.get_run(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                warn!("perturbation requested for unknown run");
                return PerturbationResponse::dead("run not found");
            }
            Err(e) => {
                error!(error = %e, "failed to load run");
                return PerturbationResponse::dead("run unavailable");
            }
        };
        if !run.is_alive() {
            warn!("perturbation requested for finished run");
            return PerturbationResponse::dead("run finished");
        }

        match run.task(task_id) {
            Some(task) if task.active => {}
            Some(_) => {
                warn!("perturbation requested for inactive task");
                return PerturbationResponse::dead("task not active");
            }
            None => {
                warn!("perturbation requested for unknown task");
                return PerturbationResponse::dead("task not found");
            }
        }

        let iteration = run.spsa.iter;
        let perturbation = {
            let mut rng = self.rng.lock();
            generate(&run.spsa, iteration, &mut *rng)
        };
        let packed_flips = pack_flips(&perturbation.flips());
        let sig = signature(&packed_flips);

        if let Some(task) = run.task_mut(task_id) {
            task.spsa_params = Some(TaskSpsaParams {
                iter: iteration,
                packed_flips,
            });
        }

        if let Err(e) = writer.buffer(&run).await {
            error!(error = %e, "failed to buffer issued perturbation");
            return PerturbationResponse::dead("run unavailable");
        }

        debug!(iteration, signature = sig, "issued perturbation");
        PerturbationResponse {
            task_alive: true,
            info: None,
            w_params: perturbation.w_params,
            b_params: perturbation.b_params,
            signature: Some(sig),
        }
    }

    /// Apply a worker's report to the run's optimizer state.
    ///
    /// The pending perturbation is consumed before anything else is checked,
    /// so replaying a report is always a no-op.
    #[instrument(
        skip(self, report),
        fields(n = report.pairs(), signed_result = report.signed_result())
    )]
    pub async fn update_spsa_data(
        &self,
        run_id: Uuid,
        task_id: usize,
        report: &SpsaReport,
    ) -> ReportOutcome {
        let Some(writer) = &self.writer else {
            warn!("report submitted to a replica");
            return ReportOutcome::NotPrimary;
        };

        let _guard = self.locks.acquire(run_id).await;

        let mut run = match self.repo.get_run(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                warn!("report for unknown run");
                return ReportOutcome::RunNotFound;
            }
            Err(e) => {
                error!(error = %e, "failed to load run");
                return ReportOutcome::StorageFailure;
            }
        };
        if !run.is_alive() {
            warn!("report for finished run");
            return ReportOutcome::RunFinished;
        }

        let Some(task) = run.task_mut(task_id) else {
            warn!("report for unknown task");
            return ReportOutcome::TaskNotFound;
        };
        let Some(issued) = task.take_spsa_params() else {
            warn!("report without a pending perturbation");
            return ReportOutcome::NoPendingPerturbation;
        };

        let outcome = Self::fold_report(&mut run, &issued, report);

        if let Err(e) = writer.buffer(&run).await {
            error!(error = %e, "failed to buffer run after report");
            return ReportOutcome::StorageFailure;
        }
        debug!(outcome = outcome.as_str(), "report consumed");
        outcome
    }

    /// Verify and apply one consumed perturbation. `run` is buffered by the
    /// caller whatever the outcome, since the perturbation is gone.
    fn fold_report(run: &mut Run, issued: &TaskSpsaParams, report: &SpsaReport) -> ReportOutcome {
        let expected = signature(&issued.packed_flips);
        let received = report.signature.unwrap_or(0);
        if expected != received {
            warn!(expected, received, "report signature mismatch");
            return ReportOutcome::SignatureMismatch { expected, received };
        }

        let n = report.pairs();
        if n == 0 {
            warn!(num_games = report.num_games, "report without a complete game pair");
            return ReportOutcome::EmptyBatch;
        }

        let flips = unpack_flips(&issued.packed_flips, run.spsa.params.len());
        let contexts = regenerate(&run.spsa, issued.iter, &flips);
        let signed_result = report.signed_result();

        let display = apply_report(&mut run.spsa, &contexts, issued.iter, n, signed_result);
        record_history(&mut run.spsa, run.num_games, &contexts, &display);
        run.last_updated = chrono::Utc::now();

        let iteration = run.spsa.iter;
        debug!(iteration, issued_iter = issued.iter, "applied report");
        ReportOutcome::Applied { iteration }
    }

    /// Snapshot of a run's optimizer state.
    pub async fn spsa_state(&self, run_id: Uuid) -> DomainResult<Option<SpsaState>> {
        let _guard = self.locks.acquire(run_id).await;
        Ok(self.repo.get_run(run_id).await?.map(|run| run.spsa))
    }
}
