//! The general per-(namespace, op-type) operation aggregate.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use mongolog_core::{Namespace, OperationRecord, OpType, PipelineCounters};

use super::keys::OpKey;
use super::stats::{StatsSummary, StreamStats};
use super::{fold_stream, fold_total, ratio, Accumulator};

/// Worst-case exemplar held per entry: the raw line of the slowest record
/// seen for the key. One pointer per key, never the full stream.
#[derive(Debug, Clone)]
pub struct WorstSample {
    pub raw: Arc<str>,
    pub duration_millis: i64,
}

/// Aggregate state for one (namespace, op-type) key.
#[derive(Debug, Default)]
pub struct OperationEntry {
    pub count: u64,
    pub duration: StreamStats,
    pub keys_examined: StreamStats,
    pub docs_examined: StreamStats,
    pub returned_total: i64,
    pub result_bytes_total: i64,
    pub bytes_read_total: i64,
    pub bytes_written_total: i64,
    pub write_conflicts_total: i64,
    pub shards_total: i64,
    pub collection_scans: u64,
    pub replans: u64,
    pub sample: Option<WorstSample>,
}

impl OperationEntry {
    /// Fold one record in. Returns true when any total saturated.
    fn fold(&mut self, op: &OperationRecord) -> bool {
        let mut saturated = false;
        self.count += 1;
        fold_stream(&mut self.duration, op.duration_millis, &mut saturated);
        fold_stream(&mut self.keys_examined, op.keys_examined, &mut saturated);
        fold_stream(&mut self.docs_examined, op.docs_examined, &mut saturated);
        fold_total(&mut self.returned_total, op.n_returned, &mut saturated);
        fold_total(&mut self.result_bytes_total, op.result_length_bytes, &mut saturated);
        fold_total(&mut self.bytes_read_total, op.bytes_read, &mut saturated);
        fold_total(&mut self.bytes_written_total, op.bytes_written, &mut saturated);
        fold_total(&mut self.write_conflicts_total, op.write_conflicts, &mut saturated);
        fold_total(&mut self.shards_total, op.n_shards, &mut saturated);
        if op.is_collection_scan() {
            self.collection_scans += 1;
        }
        if op.has_replan {
            self.replans += 1;
        }
        self.update_sample(op);
        saturated
    }

    /// Keep the slowest record's raw line as the exemplar. Last-writer-wins
    /// under a max-duration tiebreak.
    fn update_sample(&mut self, op: &OperationRecord) {
        let Some(raw) = &op.raw_sample else { return };
        let duration = op.duration_millis.unwrap_or(0);
        let replace = self
            .sample
            .as_ref()
            .is_none_or(|held| duration > held.duration_millis);
        if replace {
            self.sample = Some(WorstSample {
                raw: Arc::clone(raw),
                duration_millis: duration,
            });
        }
    }

    /// docs-examined per document returned; 0 when nothing returned.
    pub fn scan_to_return(&self) -> f64 {
        ratio(self.docs_examined.sum(), self.returned_total)
    }
}

/// Concurrent (namespace, op-type) aggregate map.
pub struct OperationAccumulator {
    entries: DashMap<OpKey, OperationEntry>,
    counters: Arc<PipelineCounters>,
    percentile_rank: f64,
}

impl OperationAccumulator {
    pub fn new(counters: Arc<PipelineCounters>, percentile_rank: f64) -> Self {
        Self {
            entries: DashMap::new(),
            counters,
            percentile_rank,
        }
    }

    /// Read one entry's derived view (post-drain use).
    pub fn get(&self, namespace: &Namespace, op_type: OpType) -> Option<OperationReport> {
        let key = OpKey {
            namespace: namespace.clone(),
            op_type,
        };
        self.entries
            .get(&key)
            .map(|e| OperationReport::build(&key, &e, self.percentile_rank))
    }

    /// The worst-case exemplar for a key, as a handle.
    pub fn worst_sample(&self, namespace: &Namespace, op_type: OpType) -> Option<Arc<str>> {
        let key = OpKey {
            namespace: namespace.clone(),
            op_type,
        };
        self.entries
            .get(&key)
            .and_then(|e| e.sample.as_ref().map(|s| Arc::clone(&s.raw)))
    }

    /// Derived views for every entry, slowest-total first.
    pub fn report(&self) -> Vec<OperationReport> {
        let mut rows: Vec<OperationReport> = self
            .entries
            .iter()
            .map(|kv| OperationReport::build(kv.key(), kv.value(), self.percentile_rank))
            .collect();
        rows.sort_by(|a, b| {
            b.duration
                .sum
                .cmp(&a.duration.sum)
                .then_with(|| a.namespace.cmp(&b.namespace))
        });
        rows
    }
}

impl Accumulator for OperationAccumulator {
    fn name(&self) -> &'static str {
        "operations"
    }

    fn record(&self, op: &OperationRecord) {
        let key = OpKey {
            namespace: op.namespace.clone(),
            op_type: op.op_type,
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

/// Derived view of one operation entry.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub namespace: Namespace,
    pub op_type: OpType,
    pub count: u64,
    pub duration: StatsSummary,
    pub keys_examined: StatsSummary,
    pub docs_examined: StatsSummary,
    pub returned_total: i64,
    pub result_bytes_total: i64,
    pub bytes_read_total: i64,
    pub bytes_written_total: i64,
    pub write_conflicts_total: i64,
    pub shards_total: i64,
    pub collection_scans: u64,
    pub replans: u64,
    pub scan_to_return: f64,
    pub sample_duration_millis: Option<i64>,
}

impl OperationReport {
    fn build(key: &OpKey, entry: &OperationEntry, rank: f64) -> Self {
        Self {
            namespace: key.namespace.clone(),
            op_type: key.op_type,
            count: entry.count,
            duration: entry.duration.summarize(rank),
            keys_examined: entry.keys_examined.summarize(rank),
            docs_examined: entry.docs_examined.summarize(rank),
            returned_total: entry.returned_total,
            result_bytes_total: entry.result_bytes_total,
            bytes_read_total: entry.bytes_read_total,
            bytes_written_total: entry.bytes_written_total,
            write_conflicts_total: entry.write_conflicts_total,
            shards_total: entry.shards_total,
            collection_scans: entry.collection_scans,
            replans: entry.replans,
            scan_to_return: entry.scan_to_return(),
            sample_duration_millis: entry.sample.as_ref().map(|s| s.duration_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator() -> OperationAccumulator {
        OperationAccumulator::new(Arc::new(PipelineCounters::new()), 95.0)
    }

    fn record(ns: &str, duration: i64) -> OperationRecord {
        let mut op = OperationRecord::new(OpType::Find, Namespace::parse(ns));
        op.duration_millis = Some(duration);
        op
    }

    #[test]
    fn single_record_aggregates() {
        let acc = accumulator();
        let mut op = record("appdb.users", 120);
        op.docs_examined = Some(4);
        op.keys_examined = Some(4);
        op.n_returned = Some(1);
        op.plan_summary = Some("IXSCAN { _id: 1 }".into());
        acc.record(&op);

        let rep = acc.get(&Namespace::parse("appdb.users"), OpType::Find).unwrap();
        assert_eq!(rep.count, 1);
        assert_eq!(rep.duration.min, Some(120));
        assert_eq!(rep.duration.max, Some(120));
        assert_eq!(rep.duration.mean, 120.0);
        assert_eq!(rep.scan_to_return, 4.0);
        assert_eq!(rep.collection_scans, 0);
    }

    #[test]
    fn distinct_op_types_never_coalesce() {
        let acc = accumulator();
        let find = record("d.c", 10);
        let mut count = record("d.c", 10);
        count.op_type = OpType::Count;
        acc.record(&find);
        acc.record(&count);
        assert_eq!(acc.entry_count(), 2);
    }

    #[test]
    fn worst_sample_tracks_max_duration() {
        let acc = accumulator();
        for (dur, tag) in [(10, "a"), (500, "b"), (90, "c")] {
            let mut op = record("d.c", dur);
            op.raw_sample = Some(Arc::from(tag));
            acc.record(&op);
        }
        let sample = acc.worst_sample(&Namespace::parse("d.c"), OpType::Find).unwrap();
        assert_eq!(&*sample, "b");
    }

    #[test]
    fn missing_fields_do_not_count_into_streams() {
        let acc = accumulator();
        let op = OperationRecord::new(OpType::Find, Namespace::parse("d.c"));
        acc.record(&op);
        let rep = acc.get(&Namespace::parse("d.c"), OpType::Find).unwrap();
        assert_eq!(rep.count, 1);
        assert_eq!(rep.duration.count, 0);
        assert_eq!(rep.duration.min, None);
        assert_eq!(rep.scan_to_return, 0.0);
    }

    #[test]
    fn collection_scan_counted() {
        let acc = accumulator();
        let mut op = record("d.c", 5);
        op.plan_summary = Some("COLLSCAN".into());
        acc.record(&op);
        let rep = acc.get(&Namespace::parse("d.c"), OpType::Find).unwrap();
        assert_eq!(rep.collection_scans, 1);
    }
}
