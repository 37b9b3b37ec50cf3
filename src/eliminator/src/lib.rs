//! Elimination of archived units whose retention rules have expired.
//!
//! A run goes through admission control ([`threshold`]), classification of the
//! selected units ([`classification`]), cross-store deletion ([`deletion`]),
//! accession register compensation ([`compensation`]) and finally the archived
//! report ([`report`]). [`pipeline::EliminationPipeline`] sequences the stages
//! for a single operation.

pub mod analysis;
pub mod classification;
pub mod compensation;
pub mod deletion;
pub mod metrics;
pub mod model;
pub mod outcome;
pub mod pipeline;
pub mod query;
pub mod report;
pub mod request;
pub mod spool;
pub mod store;
pub mod threshold;

pub use analysis::RuleInheritanceResolver;
pub use metrics::EliminationMetrics;
pub use outcome::{EliminationError, Stage, StageOutcome, StatusCode};
pub use pipeline::{EliminationPipeline, PipelineRun, PipelineState};
pub use request::{EliminationMode, EliminationRequest};
