//! Service layer: optimizer math and the run coordinator.

pub mod history;
pub mod optimizer;
pub mod perturbation;
pub mod run_builder;
pub mod run_lock;
pub mod signature;
pub mod spsa_service;

pub use history::{record_history, sampling_period, target_samples};
pub use optimizer::{adam_damping, adam_second_moment, apply_report, AdamHyper, MassUpdate};
pub use perturbation::{generate, regenerate, ClassicSchedule, FlipContext, Perturbation};
pub use run_builder::{parse_raw_params, Mu2Prior, RawParam, RunBuilder, TuningDefinition};
pub use run_lock::{RunLockGuard, RunLockTable};
pub use signature::{pack_flips, signature, unpack_flips};
pub use spsa_service::SpsaService;
