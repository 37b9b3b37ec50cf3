pub mod config;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{Configuration, EliminationConfig, StorageConfig, StrategyConfig};
