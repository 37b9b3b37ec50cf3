//! Test utilities for lethe.
//!
//! Available during tests or with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::TestConfigBuilder;
//!
//! let config = TestConfigBuilder::new()
//!     .with_workspace_dir(dir.path())
//!     .with_action_threshold(200)
//!     .build();
//! ```

mod config_builder;

pub use config_builder::TestConfigBuilder;
