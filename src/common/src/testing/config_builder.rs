//! Test configuration builder for creating pipeline setups quickly.

use std::path::Path;

use crate::config::{Configuration, DEFAULT_STRATEGY, StrategyConfig};

/// Builder for creating test configurations.
///
/// Starts from in-memory storage and small batch sizes so that batching
/// boundaries are crossed by modest fixtures.
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = Configuration::default();
        config.elimination.scroll_batch_size = 10;
        config.elimination.report_flush_size = 10;
        config.elimination.distribution_batch_size = 5;
        Self { config }
    }

    /// Put the spool directory under `dir`.
    pub fn with_workspace_dir(mut self, dir: &Path) -> Self {
        self.config.elimination.workspace_dir = dir.to_path_buf();
        self
    }

    pub fn with_analysis_threshold(mut self, threshold: u64) -> Self {
        self.config.elimination.analysis_threshold = threshold;
        self
    }

    pub fn with_action_threshold(mut self, threshold: u64) -> Self {
        self.config.elimination.action_threshold = threshold;
        self
    }

    /// Set scroll page, report flush and deletion batch sizes at once.
    pub fn with_batch_sizes(mut self, scroll: usize, flush: usize, distribution: usize) -> Self {
        self.config.elimination.scroll_batch_size = scroll;
        self.config.elimination.report_flush_size = flush;
        self.config.elimination.distribution_batch_size = distribution;
        self
    }

    /// Declare an additional in-memory storage strategy.
    pub fn with_memory_strategy(mut self, strategy_id: &str) -> Self {
        self.config.storage.strategies.insert(
            strategy_id.to_string(),
            StrategyConfig {
                dsn: "memory://".to_string(),
            },
        );
        self
    }

    pub fn with_report_strategy(mut self, strategy_id: &str) -> Self {
        self.config.storage.report_strategy = strategy_id.to_string();
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
