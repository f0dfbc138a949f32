//! # mongolog-analysis
//!
//! The ingest/parse/aggregate engine: noise filter, multi-threaded record
//! extraction, the concurrent accumulator family, the connection join, and
//! the pipeline coordinator that drives them over input sources.

pub mod accumulators;
pub mod connections;
pub mod extract;
pub mod filter;
pub mod pipeline;
pub mod report;

pub use pipeline::coordinator::{PipelineCancellation, PipelineCoordinator};
pub use report::RunSummary;
