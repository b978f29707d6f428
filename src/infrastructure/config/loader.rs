use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::{MU2_MAX, MU2_MIN};

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".spsa";

/// Prefix of environment overrides, e.g. `SPSA_CACHE__TTL_SECS`.
pub const ENV_PREFIX: &str = "SPSA_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Log directory cannot be empty")]
    EmptyLogDir,

    #[error("Invalid lock shards: {0}. Must be a power of two")]
    InvalidLockShards(usize),

    #[error("Invalid cache ttl_secs: {0}. Must be at least 1")]
    InvalidCacheTtl(u64),

    #[error("Invalid cache max_capacity: {0}. Must be at least 1")]
    InvalidCacheCapacity(u64),

    #[error("Invalid optimizer default {name}: {value}. {reason}")]
    InvalidOptimizerDefault {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .spsa/config.yaml (project config)
    /// 3. .spsa/local.yaml (project local overrides, optional)
    /// 4. Environment variables (SPSA_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same as [`ConfigLoader::load`] with an explicit configuration directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.logging.log_dir.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::EmptyLogDir);
        }

        // Locks and cache
        if !config.locks.shards.is_power_of_two() {
            return Err(ConfigError::InvalidLockShards(config.locks.shards));
        }

        if config.cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidCacheTtl(config.cache.ttl_secs));
        }

        if config.cache.max_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity(config.cache.max_capacity));
        }

        // Optimizer defaults
        let opt = &config.optimizer;
        let checks = [
            ("sf_lr", opt.sf_lr, opt.sf_lr > 0.0, "Must be positive"),
            ("sf_beta", opt.sf_beta, (0.0..1.0).contains(&opt.sf_beta), "Must lie in [0, 1)"),
            (
                "adam_beta2",
                opt.adam_beta2,
                opt.adam_beta2 > 0.0 && opt.adam_beta2 <= 1.0,
                "Must lie in (0, 1]",
            ),
            ("adam_eps", opt.adam_eps, opt.adam_eps >= 0.0, "Must be non-negative"),
            (
                "mu2_init",
                opt.mu2_init,
                (MU2_MIN..=MU2_MAX).contains(&opt.mu2_init),
                "Must lie in [1e-12, 4]",
            ),
            (
                "classic_a_fraction",
                opt.classic_a_fraction,
                opt.classic_a_fraction >= 0.0,
                "Must be non-negative",
            ),
            ("classic_alpha", opt.classic_alpha, opt.classic_alpha >= 0.0, "Must be non-negative"),
            ("classic_gamma", opt.classic_gamma, opt.classic_gamma >= 0.0, "Must be non-negative"),
        ];
        for (name, value, ok, reason) in checks {
            if !ok {
                return Err(ConfigError::InvalidOptimizerDefault {
                    name,
                    value,
                    reason,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.instance.primary);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.locks.shards, 16);
        assert!((config.optimizer.adam_beta2 - 0.999).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
instance:
  primary: false
cache:
  ttl_secs: 5
locks:
  shards: 64
optimizer:
  sf_lr: 0.5
  adam_eps: 0.000001
logging:
  level: debug
  format: pretty
  log_dir: /var/log/spsa
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert!(!config.instance.primary);
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.cache.max_capacity, 1000);
        assert_eq!(config.locks.shards, 64);
        assert!((config.optimizer.sf_lr - 0.5).abs() < f64::EPSILON);
        assert!((config.optimizer.sf_beta - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.logging.log_dir.as_deref(), Some("/var/log/spsa"));

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            _ => panic!("Expected InvalidLogLevel error"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_invalid_rotation() {
        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRotation(_)
        ));
    }

    #[test]
    fn test_validate_lock_shards() {
        let mut config = Config::default();
        config.locks.shards = 12;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLockShards(12)
        ));

        config.locks.shards = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLockShards(0)
        ));
    }

    #[test]
    fn test_validate_cache() {
        let mut config = Config::default();
        config.cache.ttl_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidCacheTtl(0)
        ));

        let mut config = Config::default();
        config.cache.max_capacity = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidCacheCapacity(0)
        ));
    }

    #[test]
    fn test_validate_optimizer_defaults() {
        let mut config = Config::default();
        config.optimizer.sf_beta = 1.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidOptimizerDefault { name: "sf_beta", .. }
        ));

        let mut config = Config::default();
        config.optimizer.mu2_init = 5.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidOptimizerDefault { name: "mu2_init", .. }
        ));

        let mut config = Config::default();
        config.optimizer.adam_beta2 = 1.0;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "locks:\n  shards: 32\nlogging:\n  format: pretty").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.locks.shards, 32);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "locks:\n  shards: 3").unwrap();
        file.flush().unwrap();

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_hierarchical_merging_with_env() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "cache:\n  ttl_secs: 30\nlogging:\n  level: info\n  format: json\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("local.yaml"), "logging:\n  level: debug\n").unwrap();

        temp_env::with_vars(
            [
                ("SPSA_CACHE__TTL_SECS", Some("120")),
                ("SPSA_INSTANCE__PRIMARY", Some("false")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
                assert_eq!(config.cache.ttl_secs, 120, "Env should win");
                assert!(!config.instance.primary);
                assert_eq!(config.logging.level, "debug", "Local override should win");
                assert_eq!(
                    config.logging.format, "json",
                    "Base value should persist when not overridden"
                );
            },
        );
    }
}
