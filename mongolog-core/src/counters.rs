//! Diagnostic counters for one pipeline run.
//!
//! Owned by the coordinator and passed by reference into the extractor and
//! accumulators — there is no process-wide mutable state. All increments use
//! relaxed ordering; the counters are observability, not synchronization.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::types::op_type::OpType;

/// Per-run counter context.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub lines_read: AtomicU64,
    pub lines_dropped: AtomicU64,
    pub parse_errors: AtomicU64,
    pub no_attr: AtomicU64,
    pub no_command: AtomicU64,
    pub no_namespace: AtomicU64,
    pub found_ops: AtomicU64,
    pub unknown_commands: AtomicU64,
    pub numeric_saturations: AtomicU64,
    pub connection_evictions: AtomicU64,
    op_counts: OpCounts,
}

#[derive(Debug, Default)]
struct OpCounts([AtomicU64; OpType::COUNT]);

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_no_attr(&self) {
        self.no_attr.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_no_command(&self) {
        self.no_command.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_no_namespace(&self) {
        self.no_namespace.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an unrecognized command verb; returns the running total so the
    /// caller can debug-log the first few.
    pub fn bump_unknown_command(&self) -> u64 {
        self.unknown_commands.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn bump_saturation(&self) {
        self.numeric_saturations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_evictions(&self, n: u64) {
        self.connection_evictions.fetch_add(n, Ordering::Relaxed);
    }

    /// Count one normalized record of the given class.
    pub fn record_op(&self, op: OpType) {
        self.found_ops.fetch_add(1, Ordering::Relaxed);
        self.op_counts.0[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn op_count(&self, op: OpType) -> u64 {
        self.op_counts.0[op.index()].load(Ordering::Relaxed)
    }

    /// Capture a consistent-enough view for the end-of-run summary.
    /// (Individual loads are relaxed; callers snapshot after the worker pool
    /// has drained, so there is nothing left racing.)
    pub fn snapshot(&self) -> CounterSnapshot {
        let mut op_counts = BTreeMap::new();
        for op in OpType::ALL {
            let n = self.op_count(op);
            if n > 0 {
                op_counts.insert(op.name().to_string(), n);
            }
        }
        CounterSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            no_attr: self.no_attr.load(Ordering::Relaxed),
            no_command: self.no_command.load(Ordering::Relaxed),
            no_namespace: self.no_namespace.load(Ordering::Relaxed),
            found_ops: self.found_ops.load(Ordering::Relaxed),
            unknown_commands: self.unknown_commands.load(Ordering::Relaxed),
            numeric_saturations: self.numeric_saturations.load(Ordering::Relaxed),
            connection_evictions: self.connection_evictions.load(Ordering::Relaxed),
            op_counts,
        }
    }
}

/// Plain-value view of [`PipelineCounters`], serializable into the summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CounterSnapshot {
    pub lines_read: u64,
    pub lines_dropped: u64,
    pub parse_errors: u64,
    pub no_attr: u64,
    pub no_command: u64,
    pub no_namespace: u64,
    pub found_ops: u64,
    pub unknown_commands: u64,
    pub numeric_saturations: u64,
    pub connection_evictions: u64,
    pub op_counts: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_op_counts_both_total_and_per_op() {
        let counters = PipelineCounters::new();
        counters.record_op(OpType::Find);
        counters.record_op(OpType::Find);
        counters.record_op(OpType::Insert);

        let snap = counters.snapshot();
        assert_eq!(snap.found_ops, 3);
        assert_eq!(snap.op_counts.get("find"), Some(&2));
        assert_eq!(snap.op_counts.get("insert"), Some(&1));
        assert_eq!(snap.op_counts.get("getMore"), None);
    }
}
