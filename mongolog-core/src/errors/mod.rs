//! Error types for the analysis engine.
//!
//! Only conditions that abort something are errors. Per-record problems
//! (parse failures, unknown commands, numeric saturation) are diagnostic
//! counters on [`crate::counters::PipelineCounters`], never `Err`.

use std::path::PathBuf;

/// An input source could not be opened or read. Fatal for that source only;
/// the coordinator records it and moves to the next source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read error in {path} near line {line}: {source}")]
    Read {
        path: PathBuf,
        line: u64,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration could not be parsed or applied.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown configuration key: {key}")]
    UnknownKey { key: String },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("failed to compile filter pattern set: {reason}")]
    PatternSet { reason: String },
}

/// A whole run failed. The only way this happens is every source failing to
/// open — anything less degrades to per-source outcomes in the summary.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("all {failed} input sources failed to open")]
    AllSourcesFailed { failed: usize },
}
