//! Per-query-shape aggregate, keyed on (namespace, op-type, query-hash,
//! plan-summary). Also owns the slowest-planning top-N stream, since the
//! planning outliers are a property of query shapes.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use mongolog_core::{Namespace, OperationRecord, OpType, PipelineCounters};

use super::keys::QueryHashKey;
use super::slow_planning::{SlowPlanEntry, SlowPlanningAccumulator};
use super::stats::{StatsSummary, StreamStats};
use super::{fold_stream, fold_total, ratio, Accumulator};

/// Aggregate state for one query shape.
#[derive(Debug, Default)]
pub struct QueryHashEntry {
    pub count: u64,
    pub duration: StreamStats,
    pub keys_examined: StreamStats,
    pub docs_examined: StreamStats,
    pub returned_total: i64,
    pub planning_micros: StreamStats,
    pub collection_scans: u64,
    pub replans: u64,
}

impl QueryHashEntry {
    fn fold(&mut self, op: &OperationRecord) -> bool {
        let mut saturated = false;
        self.count += 1;
        fold_stream(&mut self.duration, op.duration_millis, &mut saturated);
        fold_stream(&mut self.keys_examined, op.keys_examined, &mut saturated);
        fold_stream(&mut self.docs_examined, op.docs_examined, &mut saturated);
        fold_total(&mut self.returned_total, op.n_returned, &mut saturated);
        fold_stream(&mut self.planning_micros, op.planning_time_micros, &mut saturated);
        if op.is_collection_scan() {
            self.collection_scans += 1;
        }
        if op.has_replan {
            self.replans += 1;
        }
        saturated
    }
}

/// Concurrent query-shape aggregate map. Applicable to records of a
/// shape-bearing op class that carry a query hash.
pub struct QueryHashAccumulator {
    entries: DashMap<QueryHashKey, QueryHashEntry>,
    slow_planning: SlowPlanningAccumulator,
    counters: Arc<PipelineCounters>,
    percentile_rank: f64,
}

impl QueryHashAccumulator {
    pub fn new(counters: Arc<PipelineCounters>, percentile_rank: f64, top_n: usize) -> Self {
        Self {
            entries: DashMap::new(),
            slow_planning: SlowPlanningAccumulator::new(top_n),
            counters,
            percentile_rank,
        }
    }

    /// The slowest-planning stream fed by this accumulator.
    pub fn slow_planning(&self) -> &SlowPlanningAccumulator {
        &self.slow_planning
    }

    /// The top-N slowest-planning report.
    pub fn slow_planning_report(&self) -> Vec<SlowPlanEntry> {
        self.slow_planning.report()
    }

    pub fn report(&self) -> Vec<QueryHashReport> {
        let mut rows: Vec<QueryHashReport> = self
            .entries
            .iter()
            .map(|kv| QueryHashReport::build(kv.key(), kv.value(), self.percentile_rank))
            .collect();
        rows.sort_by(|a, b| b.duration.sum.cmp(&a.duration.sum));
        rows
    }
}

impl Accumulator for QueryHashAccumulator {
    fn name(&self) -> &'static str {
        "query_hash"
    }

    fn record(&self, op: &OperationRecord) {
        self.slow_planning.record(op);
        if !op.op_type.supports_query_shape() {
            return;
        }
        let Some(query_hash) = &op.query_hash else {
            return;
        };
        let key = QueryHashKey {
            namespace: op.namespace.clone(),
            op_type: op.op_type,
            query_hash: query_hash.clone(),
            plan_summary: op.plan_summary.clone(),
        };
        let saturated = self.entries.entry(key).or_default().fold(op);
        if saturated {
            self.counters.bump_saturation();
        }
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Derived view of one query-shape entry.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHashReport {
    pub namespace: Namespace,
    pub op_type: OpType,
    pub query_hash: String,
    pub plan_summary: Option<String>,
    pub count: u64,
    pub duration: StatsSummary,
    pub keys_examined: StatsSummary,
    pub docs_examined: StatsSummary,
    pub returned_total: i64,
    pub scan_to_return: f64,
    pub planning_micros: StatsSummary,
    pub collection_scans: u64,
    pub replans: u64,
}

impl QueryHashReport {
    fn build(key: &QueryHashKey, entry: &QueryHashEntry, rank: f64) -> Self {
        Self {
            namespace: key.namespace.clone(),
            op_type: key.op_type,
            query_hash: key.query_hash.clone(),
            plan_summary: key.plan_summary.clone(),
            count: entry.count,
            duration: entry.duration.summarize(rank),
            keys_examined: entry.keys_examined.summarize(rank),
            docs_examined: entry.docs_examined.summarize(rank),
            returned_total: entry.returned_total,
            scan_to_return: ratio(entry.docs_examined.sum(), entry.returned_total),
            planning_micros: entry.planning_micros.summarize(rank),
            collection_scans: entry.collection_scans,
            replans: entry.replans,
        }
    }
}
