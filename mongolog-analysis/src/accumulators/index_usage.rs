//! Index usage aggregate — which access plans serve which namespaces.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use mongolog_core::{FxHashMap, Namespace, OperationRecord, PipelineCounters};

use super::keys::IndexUsageKey;
use super::stats::{StatsSummary, StreamStats};
use super::{fold_stream, fold_total, Accumulator};

/// Aggregate state for one (namespace, plan-summary) pattern.
#[derive(Debug, Default)]
pub struct IndexUsageEntry {
    pub count: u64,
    pub duration: StreamStats,
    pub keys_examined_total: i64,
    pub docs_examined_total: i64,
    pub returned_total: i64,
}

impl IndexUsageEntry {
    fn fold(&mut self, op: &OperationRecord) -> bool {
        let mut saturated = false;
        self.count += 1;
        fold_stream(&mut self.duration, op.duration_millis, &mut saturated);
        fold_total(&mut self.keys_examined_total, op.keys_examined, &mut saturated);
        fold_total(&mut self.docs_examined_total, op.docs_examined, &mut saturated);
        fold_total(&mut self.returned_total, op.n_returned, &mut saturated);
        saturated
    }
}

/// Concurrent (namespace, plan-summary) usage map. Applicable to records
/// that report a plan summary.
pub struct IndexUsageAccumulator {
    entries: DashMap<IndexUsageKey, IndexUsageEntry>,
    counters: Arc<PipelineCounters>,
    percentile_rank: f64,
}

impl IndexUsageAccumulator {
    pub fn new(counters: Arc<PipelineCounters>, percentile_rank: f64) -> Self {
        Self {
            entries: DashMap::new(),
            counters,
            percentile_rank,
        }
    }

    /// Per-pattern rows plus the overall usage summary.
    pub fn report(&self) -> IndexUsageReport {
        let mut patterns: Vec<IndexUsagePattern> = self
            .entries
            .iter()
            .map(|kv| IndexUsagePattern {
                namespace: kv.key().namespace.clone(),
                plan_summary: kv.key().plan_summary.clone(),
                collection_scan: kv.key().is_collection_scan(),
                count: kv.value().count,
                duration: kv.value().duration.summarize(self.percentile_rank),
                keys_examined_total: kv.value().keys_examined_total,
                docs_examined_total: kv.value().docs_examined_total,
                returned_total: kv.value().returned_total,
            })
            .collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count));

        let total_operations: u64 = patterns.iter().map(|p| p.count).sum();
        let collection_scan_operations: u64 = patterns
            .iter()
            .filter(|p| p.collection_scan)
            .map(|p| p.count)
            .sum();

        // Collection-scan fraction per namespace.
        let mut per_ns: FxHashMap<Namespace, (u64, u64)> = FxHashMap::default();
        for p in &patterns {
            let slot = per_ns.entry(p.namespace.clone()).or_insert((0, 0));
            slot.0 += p.count;
            if p.collection_scan {
                slot.1 += p.count;
            }
        }
        let mut namespaces: Vec<NamespaceScanStats> = per_ns
            .into_iter()
            .map(|(namespace, (operations, collection_scans))| NamespaceScanStats {
                namespace,
                operations,
                collection_scans,
                collection_scan_fraction: if operations == 0 {
                    0.0
                } else {
                    collection_scans as f64 / operations as f64
                },
            })
            .collect();
        namespaces.sort_by(|a, b| {
            b.collection_scans
                .cmp(&a.collection_scans)
                .then_with(|| a.namespace.cmp(&b.namespace))
        });

        IndexUsageReport {
            total_operations,
            unique_patterns: patterns.len(),
            collection_scan_operations,
            patterns,
            namespaces,
        }
    }
}

impl Accumulator for IndexUsageAccumulator {
    fn name(&self) -> &'static str {
        "index_usage"
    }

    fn record(&self, op: &OperationRecord) {
        let Some(plan_summary) = &op.plan_summary else {
            return;
        };
        let key = IndexUsageKey {
            namespace: op.namespace.clone(),
            plan_summary: plan_summary.clone(),
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

/// One (namespace, plan-summary) usage row.
#[derive(Debug, Clone, Serialize)]
pub struct IndexUsagePattern {
    pub namespace: Namespace,
    pub plan_summary: String,
    pub collection_scan: bool,
    pub count: u64,
    pub duration: StatsSummary,
    pub keys_examined_total: i64,
    pub docs_examined_total: i64,
    pub returned_total: i64,
}

/// Per-namespace collection-scan pressure.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceScanStats {
    pub namespace: Namespace,
    pub operations: u64,
    pub collection_scans: u64,
    pub collection_scan_fraction: f64,
}

/// The full index-usage section of the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct IndexUsageReport {
    pub total_operations: u64,
    pub unique_patterns: usize,
    pub collection_scan_operations: u64,
    pub patterns: Vec<IndexUsagePattern>,
    pub namespaces: Vec<NamespaceScanStats>,
}
