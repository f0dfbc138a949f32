//! # mongolog-core
//!
//! Foundation crate for the mongolog analysis engine.
//! Defines the record model, connection event model, configuration,
//! errors, and the diagnostic counter context.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod counters;
pub mod errors;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::{AnalysisConfig, FilterConfig, PipelineConfig};
pub use counters::{CounterSnapshot, PipelineCounters};
pub use types::collections::{FxHashMap, FxHashSet};
pub use types::connection::{connection_id, ClientMetadata, ConnectionEvent, DriverKey};
pub use types::namespace::Namespace;
pub use types::op_type::OpType;
pub use types::record::OperationRecord;
