//! Per-plan-cache-identity aggregate.
//!
//! Same machinery as the operation aggregate, keyed wider, plus planning
//! latency statistics. Collection scans are counted per record, not derived
//! from the key's plan summary — one plan-cache key can see multiple plan
//! summaries across replans.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use mongolog_core::{Namespace, OperationRecord, PipelineCounters};

use super::keys::PlanCacheKey;
use super::stats::{StatsSummary, StreamStats};
use super::{fold_stream, fold_total, ratio, Accumulator};

/// Aggregate state for one plan-cache identity.
#[derive(Debug, Default)]
pub struct PlanCacheEntry {
    pub count: u64,
    pub duration: StreamStats,
    pub keys_examined: StreamStats,
    pub docs_examined: StreamStats,
    pub returned_total: i64,
    /// Planning latency in microseconds.
    pub planning_micros: StreamStats,
    pub collection_scans: u64,
    pub replans: u64,
}

impl PlanCacheEntry {
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

    /// Mean planning time rounded to whole milliseconds.
    pub fn planning_mean_millis(&self) -> i64 {
        (self.planning_micros.mean() / 1000.0).round() as i64
    }
}

/// Concurrent plan-cache aggregate map. Applicable to records that carry a
/// plan cache key.
pub struct PlanCacheAccumulator {
    entries: DashMap<PlanCacheKey, PlanCacheEntry>,
    counters: Arc<PipelineCounters>,
    percentile_rank: f64,
}

impl PlanCacheAccumulator {
    pub fn new(counters: Arc<PipelineCounters>, percentile_rank: f64) -> Self {
        Self {
            entries: DashMap::new(),
            counters,
            percentile_rank,
        }
    }

    pub fn report(&self) -> Vec<PlanCacheReport> {
        let mut rows: Vec<PlanCacheReport> = self
            .entries
            .iter()
            .map(|kv| PlanCacheReport::build(kv.key(), kv.value(), self.percentile_rank))
            .collect();
        rows.sort_by(|a, b| b.duration.sum.cmp(&a.duration.sum));
        rows
    }
}

impl Accumulator for PlanCacheAccumulator {
    fn name(&self) -> &'static str {
        "plan_cache"
    }

    fn record(&self, op: &OperationRecord) {
        let Some(plan_cache_key) = &op.plan_cache_key else {
            return;
        };
        let key = PlanCacheKey {
            namespace: op.namespace.clone(),
            plan_cache_key: plan_cache_key.clone(),
            query_hash: op.query_hash.clone(),
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

/// Derived view of one plan-cache entry.
#[derive(Debug, Clone, Serialize)]
pub struct PlanCacheReport {
    pub namespace: Namespace,
    pub plan_cache_key: String,
    pub query_hash: Option<String>,
    pub plan_summary: Option<String>,
    pub count: u64,
    pub duration: StatsSummary,
    pub keys_examined: StatsSummary,
    pub docs_examined: StatsSummary,
    pub returned_total: i64,
    pub scan_to_return: f64,
    pub planning_micros: StatsSummary,
    pub planning_mean_millis: i64,
    pub collection_scans: u64,
    pub replans: u64,
}

impl PlanCacheReport {
    fn build(key: &PlanCacheKey, entry: &PlanCacheEntry, rank: f64) -> Self {
        Self {
            namespace: key.namespace.clone(),
            plan_cache_key: key.plan_cache_key.clone(),
            query_hash: key.query_hash.clone(),
            plan_summary: key.plan_summary.clone(),
            count: entry.count,
            duration: entry.duration.summarize(rank),
            keys_examined: entry.keys_examined.summarize(rank),
            docs_examined: entry.docs_examined.summarize(rank),
            returned_total: entry.returned_total,
            scan_to_return: ratio(entry.docs_examined.sum(), entry.returned_total),
            planning_micros: entry.planning_micros.summarize(rank),
            planning_mean_millis: entry.planning_mean_millis(),
            collection_scans: entry.collection_scans,
            replans: entry.replans,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongolog_core::{Namespace, OpType};

    fn op(plan_cache_key: &str, plan_summary: &str, planning_micros: i64) -> OperationRecord {
        let mut op = OperationRecord::new(OpType::Find, Namespace::parse("d.c"));
        op.plan_cache_key = Some(plan_cache_key.into());
        op.query_hash = Some("QH01".into());
        op.plan_summary = Some(plan_summary.into());
        op.planning_time_micros = Some(planning_micros);
        op.duration_millis = Some(10);
        op
    }

    #[test]
    fn ignores_records_without_plan_cache_key() {
        let acc = PlanCacheAccumulator::new(Arc::new(PipelineCounters::new()), 95.0);
        acc.record(&OperationRecord::new(OpType::Find, Namespace::parse("d.c")));
        assert_eq!(acc.entry_count(), 0);
    }

    #[test]
    fn planning_stats_in_micros_with_millis_accessor() {
        let acc = PlanCacheAccumulator::new(Arc::new(PipelineCounters::new()), 95.0);
        acc.record(&op("PC1", "IXSCAN { a: 1 }", 1_400));
        acc.record(&op("PC1", "IXSCAN { a: 1 }", 2_600));
        let rows = acc.report();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].planning_micros.sum, 4_000);
        assert_eq!(rows[0].planning_mean_millis, 2);
    }

    #[test]
    fn collection_scans_counted_per_record() {
        // One plan-cache key, two plan summaries across a replan: the
        // COLLSCAN count follows the records, not the key.
        let acc = PlanCacheAccumulator::new(Arc::new(PipelineCounters::new()), 95.0);
        let mut a = op("PC1", "IXSCAN { a: 1 }", 100);
        a.plan_summary = Some("IXSCAN { a: 1 }".into());
        let mut b = op("PC1", "IXSCAN { a: 1 }", 100);
        b.plan_summary = Some("IXSCAN { a: 1 }".into());
        b.has_replan = true;
        acc.record(&a);
        acc.record(&b);
        let rows = acc.report();
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].replans, 1);
        assert_eq!(rows[0].collection_scans, 0);
    }
}
