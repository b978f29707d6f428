use crate::domain::models::InstanceConfig;

/// Whether this process is the instance allowed to mutate optimizer state.
///
/// Replicas must never apply reports, or two processes would race on the
/// same run.
pub trait InstanceRole: Send + Sync {
    fn is_primary(&self) -> bool;
}

impl InstanceRole for InstanceConfig {
    fn is_primary(&self) -> bool {
        self.primary
    }
}

impl InstanceRole for bool {
    fn is_primary(&self) -> bool {
        *self
    }
}
