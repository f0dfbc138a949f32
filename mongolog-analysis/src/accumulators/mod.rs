//! The accumulator family — concurrent sinks that fold operation records
//! into keyed online aggregates.
//!
//! Every flavor owns a concurrent map from a flat key type to an entry
//! struct; the per-key update runs under the map's shard guard, so one
//! record's mutation of one entry is a single logical step. Entries are
//! created lazily and never removed during a run. Derived getters (the
//! `report()` methods) are meant to run after the worker pool has drained.

pub mod error_code;
pub mod index_usage;
pub mod keys;
pub mod operation;
pub mod plan_cache;
pub mod query_hash;
pub mod reservoir;
pub mod slow_planning;
pub mod stats;
pub mod transaction;

use mongolog_core::OperationRecord;

/// A sink for normalized operation records. Thread-safe; `record` never
/// fails — problems downgrade to diagnostic counters.
pub trait Accumulator: Send + Sync {
    /// Short name used in the run summary's entry-count section.
    fn name(&self) -> &'static str;

    /// Fold one record in. Implementations decide applicability themselves
    /// (a transaction sink ignores records without transaction telemetry).
    fn record(&self, op: &OperationRecord);

    /// Number of distinct keys observed so far.
    fn entry_count(&self) -> usize;
}

/// Fold an optional value into a saturating total, tracking saturation.
pub(crate) fn fold_total(total: &mut i64, value: Option<i64>, saturated: &mut bool) {
    if let Some(v) = value {
        let (sum, sat) = stats::saturating_accumulate(*total, v);
        *total = sum;
        *saturated |= sat;
    }
}

/// Fold an optional value into a [`stats::StreamStats`], tracking saturation.
pub(crate) fn fold_stream(
    stream: &mut stats::StreamStats,
    value: Option<i64>,
    saturated: &mut bool,
) {
    if let Some(v) = value {
        *saturated |= stream.observe(v);
    }
}

/// Ratio with a zero-denominator guard.
pub(crate) fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}
