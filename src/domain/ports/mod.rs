//! Port trait definitions (Hexagonal Architecture)
//!
//! Collaborators the coordinator consumes but does not own:
//! - RunRepository: run lookup and the write-back persistence hand-off
//! - RunLocks: scoped per-run mutual exclusion
//! - InstanceRole: primary/replica gate for report wiring

pub mod instance_role;
pub mod run_locks;
pub mod run_repository;

pub use instance_role::InstanceRole;
pub use run_locks::RunLocks;
pub use run_repository::RunRepository;
