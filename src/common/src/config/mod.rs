use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Name of the storage strategy used when nothing else is configured.
pub const DEFAULT_STRATEGY: &str = "default";

/// A storage strategy: one object store holding binary payloads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Object store DSN (`file:///path`, `memory://`, `s3://host/bucket`)
    pub dsn: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object stores keyed by storage strategy identifier
    pub strategies: HashMap<String, StrategyConfig>,
    /// Strategy receiving the final elimination reports
    pub report_strategy: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(
            DEFAULT_STRATEGY.to_string(),
            StrategyConfig {
                dsn: "memory://".to_string(),
            },
        );
        Self {
            strategies,
            report_strategy: DEFAULT_STRATEGY.to_string(),
        }
    }
}

/// Limits and batch sizes of the elimination pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EliminationConfig {
    /// Default candidate threshold for analysis runs.
    ///
    /// Env: LETHE__ELIMINATION__ANALYSIS_THRESHOLD
    pub analysis_threshold: u64,

    /// Default candidate threshold for action (destructive) runs.
    ///
    /// Env: LETHE__ELIMINATION__ACTION_THRESHOLD
    pub action_threshold: u64,

    /// Page size requested from the unit scroll.
    pub scroll_batch_size: usize,

    /// Number of buffered report entries per flush.
    pub report_flush_size: usize,

    /// Units handed to a single deletion invocation.
    pub distribution_batch_size: usize,

    /// Directory holding the destroy-candidate spools.
    pub workspace_dir: PathBuf,

    /// Key prefix for archived reports.
    pub report_prefix: String,

    /// Keep-alive hint forwarded to the unit selector.
    #[serde(with = "humantime_serde")]
    pub scroll_timeout: Duration,
}

impl Default for EliminationConfig {
    fn default() -> Self {
        Self {
            analysis_threshold: 100_000,
            action_threshold: 10_000,
            scroll_batch_size: 1000,
            report_flush_size: 1000,
            distribution_batch_size: 100,
            workspace_dir: PathBuf::from(".data/elimination"),
            report_prefix: "reports".to_string(),
            scroll_timeout: Duration::from_secs(300),
        }
    }
}

impl EliminationConfig {
    /// Validate thresholds and batch sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis_threshold == 0 {
            return Err(ConfigError::InvalidThreshold("analysis_threshold"));
        }
        if self.action_threshold == 0 {
            return Err(ConfigError::InvalidThreshold("action_threshold"));
        }
        for (name, size) in [
            ("scroll_batch_size", self.scroll_batch_size),
            ("report_flush_size", self.report_flush_size),
            ("distribution_batch_size", self.distribution_batch_size),
        ] {
            if size == 0 {
                return Err(ConfigError::InvalidBatchSize(name));
            }
        }
        if self.report_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidReportPrefix);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Object storage strategies
    pub storage: StorageConfig,
    /// Elimination pipeline limits
    pub elimination: EliminationConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new("lethe.toml"))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::extract(
            Figment::from(Serialized::defaults(Configuration::default())).merge(Toml::file(path)),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Configuration = figment
            .merge(Env::prefixed("LETHE__").split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.elimination.validate()?;
        if !self
            .storage
            .strategies
            .contains_key(&self.storage.report_strategy)
        {
            return Err(ConfigError::UnknownReportStrategy(
                self.storage.report_strategy.clone(),
            ));
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid threshold {0}: must be positive")]
    InvalidThreshold(&'static str),

    #[error("Invalid batch size {0}: must be positive")]
    InvalidBatchSize(&'static str),

    #[error("Report prefix must not be empty")]
    InvalidReportPrefix,

    #[error("Report strategy '{0}' is not declared in storage.strategies")]
    UnknownReportStrategy(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration_is_valid() {
        let config = Configuration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.elimination.analysis_threshold, 100_000);
        assert_eq!(config.elimination.action_threshold, 10_000);
        assert_eq!(config.storage.report_strategy, DEFAULT_STRATEGY);
    }

    #[test]
    fn test_zero_threshold_is_invalid() {
        let config = EliminationConfig {
            action_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold("action_threshold"))
        ));
    }

    #[test]
    fn test_zero_batch_size_is_invalid() {
        let config = EliminationConfig {
            report_flush_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBatchSize("report_flush_size"))
        ));
    }

    #[test]
    fn test_unknown_report_strategy() {
        let mut config = Configuration::default();
        config.storage.report_strategy = "archive".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownReportStrategy(_))
        ));
    }

    #[test]
    fn test_toml_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "lethe.toml",
                r#"
                [elimination]
                action_threshold = 500
                scroll_timeout = "30s"

                [storage.strategies.archive]
                dsn = "file:///tmp/lethe-archive"
                "#,
            )?;
            jail.set_env("LETHE__ELIMINATION__DISTRIBUTION_BATCH_SIZE", "7");

            let config = Configuration::load().expect("configuration should load");
            assert_eq!(config.elimination.action_threshold, 500);
            assert_eq!(config.elimination.distribution_batch_size, 7);
            assert_eq!(config.elimination.scroll_timeout, Duration::from_secs(30));
            assert_eq!(
                config.storage.strategies["archive"].dsn,
                "file:///tmp/lethe-archive"
            );
            assert!(config.storage.strategies.contains_key(DEFAULT_STRATEGY));
            Ok(())
        });
    }
}
