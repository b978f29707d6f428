use serde::{Deserialize, Serialize};

/// Main configuration structure for the coordinator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Instance role (primary or replica)
    #[serde(default)]
    pub instance: InstanceConfig,

    /// Run lookup cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Run lock table configuration
    #[serde(default)]
    pub locks: LockConfig,

    /// Hyper-parameter defaults for new runs
    #[serde(default)]
    pub optimizer: OptimizerDefaults,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Instance role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InstanceConfig {
    /// Only the primary instance applies worker reports
    #[serde(default = "default_primary")]
    pub primary: bool,
}

const fn default_primary() -> bool {
    true
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
        }
    }
}

/// Run lookup cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Seconds a cached run stays valid without being re-buffered
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum number of cached runs
    #[serde(default = "default_cache_max_capacity")]
    pub max_capacity: u64,
}

const fn default_cache_ttl_secs() -> u64 {
    60
}

const fn default_cache_max_capacity() -> u64 {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_capacity: default_cache_max_capacity(),
        }
    }
}

/// Run lock table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LockConfig {
    /// Number of shards (power of two)
    #[serde(default = "default_lock_shards")]
    pub shards: usize,
}

const fn default_lock_shards() -> usize {
    16
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            shards: default_lock_shards(),
        }
    }
}

/// Hyper-parameter defaults applied when a run is created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OptimizerDefaults {
    /// Schedule-free learning rate
    #[serde(default = "default_sf_lr")]
    pub sf_lr: f64,

    /// Schedule-free surrogate blend weight
    #[serde(default = "default_sf_beta")]
    pub sf_beta: f64,

    /// Adam second-moment decay
    #[serde(default = "default_adam_beta2")]
    pub adam_beta2: f64,

    /// Adam denominator epsilon
    #[serde(default = "default_adam_eps")]
    pub adam_eps: f64,

    /// Second-moment estimate before any report
    #[serde(default = "default_mu2_init")]
    pub mu2_init: f64,

    /// Classic stability offset as a fraction of planned pairs
    #[serde(default = "default_classic_a_fraction")]
    pub classic_a_fraction: f64,

    /// Classic gain decay exponent
    #[serde(default = "default_classic_alpha")]
    pub classic_alpha: f64,

    /// Classic perturbation decay exponent
    #[serde(default = "default_classic_gamma")]
    pub classic_gamma: f64,
}

const fn default_sf_lr() -> f64 {
    1.0
}

const fn default_sf_beta() -> f64 {
    0.9
}

const fn default_adam_beta2() -> f64 {
    0.999
}

const fn default_adam_eps() -> f64 {
    1e-8
}

const fn default_mu2_init() -> f64 {
    1.0
}

const fn default_classic_a_fraction() -> f64 {
    0.1
}

const fn default_classic_alpha() -> f64 {
    0.602
}

const fn default_classic_gamma() -> f64 {
    0.101
}

impl Default for OptimizerDefaults {
    fn default() -> Self {
        Self {
            sf_lr: default_sf_lr(),
            sf_beta: default_sf_beta(),
            adam_beta2: default_adam_beta2(),
            adam_eps: default_adam_eps(),
            mu2_init: default_mu2_init(),
            classic_a_fraction: default_classic_a_fraction(),
            classic_alpha: default_classic_alpha(),
            classic_gamma: default_classic_gamma(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation policy: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
