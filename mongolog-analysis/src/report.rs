//! End-of-run structured summary.
//!
//! Built only after the worker pool has drained; the four heavyweight
//! report sections (each sorts per-entry reservoirs) are assembled in
//! parallel.

use std::collections::BTreeMap;

use serde::Serialize;

use mongolog_core::CounterSnapshot;

use crate::accumulators::error_code::ErrorCodeReport;
use crate::accumulators::index_usage::IndexUsageReport;
use crate::accumulators::operation::OperationReport;
use crate::accumulators::plan_cache::PlanCacheReport;
use crate::accumulators::query_hash::QueryHashReport;
use crate::accumulators::slow_planning::SlowPlanEntry;
use crate::accumulators::transaction::{CauseBreakdown, TransactionReport};
use crate::connections::{ConnectionJoin, DriverReport};
use crate::pipeline::coordinator::AccumulatorSet;
use crate::pipeline::source::SourceOutcome;

/// The full structured summary of one run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub sources: Vec<SourceOutcome>,
    pub counters: CounterSnapshot,
    /// Distinct keys per accumulator.
    pub entry_counts: BTreeMap<String, usize>,
    pub operations: Vec<OperationReport>,
    pub plan_cache: Vec<PlanCacheReport>,
    pub query_hash: Vec<QueryHashReport>,
    pub slow_planning: Vec<SlowPlanEntry>,
    pub transactions: Vec<TransactionReport>,
    pub transaction_breakdown: Vec<CauseBreakdown>,
    pub errors: Vec<ErrorCodeReport>,
    pub index_usage: IndexUsageReport,
    pub drivers: Vec<DriverReport>,
    /// Connections still open at end of run; they contribute no lifetime.
    pub still_open_connections: usize,
}

impl RunSummary {
    pub(crate) fn build(
        sources: Vec<SourceOutcome>,
        counters: CounterSnapshot,
        accumulators: &AccumulatorSet,
        join: Option<&ConnectionJoin>,
        still_open_connections: usize,
    ) -> Self {
        let mut entry_counts = BTreeMap::new();
        for sink in accumulators.sinks() {
            entry_counts.insert(sink.name().to_string(), sink.entry_count());
        }
        if let Some(join) = join {
            entry_counts.insert("drivers".to_string(), join.driver_count());
        }

        let ((operations, plan_cache), (query_hash, index_usage)) = rayon::join(
            || {
                rayon::join(
                    || accumulators.operations.report(),
                    || accumulators.plan_cache.report(),
                )
            },
            || {
                rayon::join(
                    || accumulators.query_hash.report(),
                    || accumulators.index_usage.report(),
                )
            },
        );

        Self {
            sources,
            counters,
            entry_counts,
            operations,
            plan_cache,
            query_hash,
            slow_planning: accumulators.query_hash.slow_planning_report(),
            transactions: accumulators.transactions.report(),
            transaction_breakdown: accumulators.transactions.breakdown(),
            errors: accumulators.errors.report(),
            index_usage,
            drivers: join.map(ConnectionJoin::report).unwrap_or_default(),
            still_open_connections,
        }
    }

    /// Serialize to pretty JSON for diagnostic output.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
