//! SPSA Coordinator - distributed parameter tuning server core
//!
//! Hands out simultaneous random perturbations of a parameter vector to
//! workers, and folds their batched paired-game results back into the run's
//! optimizer state with the classic, schedule-free SGD or schedule-free Adam
//! update.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Optimizer data model and port traits
//! - **Service Layer** (`services`): Update math and the run coordinator
//! - **Adapters** (`adapters`): In-memory and cached run repositories
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use spsa_coordinator::{
//!     ConfigLoader, InMemoryRunRepository, OptimizerKind, RunBuilder, RunLockTable,
//!     SpsaService, TuningDefinition,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ConfigLoader::load()?;
//! let repo = Arc::new(InMemoryRunRepository::new());
//!
//! let definition = TuningDefinition::new(
//!     "KnightValue, 300, 200, 400, 10",
//!     20_000,
//!     OptimizerKind::ScheduleFreeAdam,
//! );
//! let mut run = RunBuilder::new(config.optimizer.clone())
//!     .build_run(uuid::Uuid::new_v4(), &definition)?;
//! let task_id = run.add_task("worker-1");
//! let run_id = run.id;
//! repo.insert_run(run).await;
//!
//! let service = SpsaService::new(
//!     repo,
//!     Arc::new(RunLockTable::new(config.locks.shards)),
//!     &config.instance,
//! );
//! let perturbation = service.request_spsa_data(run_id, task_id).await;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::{CachedRunRepository, InMemoryRunRepository};
pub use domain::models::{
    ClassicGain, Config, Flip, MomentStats, OptimizerConfig, OptimizerKind, PerturbationResponse,
    ReportOutcome, Run, SpsaParam, SpsaReport, SpsaState,
};
pub use domain::ports::{InstanceRole, RunLocks, RunRepository};
pub use domain::{DomainError, DomainResult, RunSpecError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::logging::{LogConfig, LoggerImpl};
pub use services::{RunBuilder, RunLockTable, SpsaService, TuningDefinition};
