pub mod config;
pub mod moments;
pub mod perturbation;
pub mod run;
pub mod spsa;

pub use config::{
    CacheConfig, Config, InstanceConfig, LockConfig, LoggingConfig, OptimizerDefaults,
};
pub use moments::{pentanomial_moments, MomentStats, MU2_MAX, MU2_MIN};
pub use perturbation::{
    MirrorParam, ParamPerturbation, PerturbationResponse, ReportOutcome, SpsaReport,
};
pub use run::{Run, RunTask, TaskSpsaParams};
pub use spsa::{
    ClassicGain, Flip, HistorySample, OptimizerConfig, OptimizerKind, SpsaParam, SpsaState,
};
