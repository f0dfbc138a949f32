//! Transaction outcome aggregate.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use mongolog_core::{OperationRecord, PipelineCounters};

use super::keys::TransactionKey;
use super::stats::{StatsSummary, StreamStats};
use super::{fold_stream, Accumulator};

/// Aggregate state for one (retry-counter, termination-cause, commit-type).
#[derive(Debug, Default)]
pub struct TransactionEntry {
    pub count: u64,
    pub duration_millis: StreamStats,
    pub commit_micros: StreamStats,
    pub active_micros: StreamStats,
    pub inactive_micros: StreamStats,
}

impl TransactionEntry {
    fn fold(&mut self, op: &OperationRecord) -> bool {
        let mut saturated = false;
        self.count += 1;
        fold_stream(&mut self.duration_millis, op.duration_millis, &mut saturated);
        fold_stream(&mut self.commit_micros, op.txn_commit_duration_micros, &mut saturated);
        fold_stream(&mut self.active_micros, op.txn_active_micros, &mut saturated);
        fold_stream(&mut self.inactive_micros, op.txn_inactive_micros, &mut saturated);
        saturated
    }
}

/// Concurrent transaction-outcome aggregate map. Applicable to records
/// carrying transaction telemetry.
pub struct TransactionAccumulator {
    entries: DashMap<TransactionKey, TransactionEntry>,
    counters: Arc<PipelineCounters>,
    percentile_rank: f64,
}

impl TransactionAccumulator {
    pub fn new(counters: Arc<PipelineCounters>, percentile_rank: f64) -> Self {
        Self {
            entries: DashMap::new(),
            counters,
            percentile_rank,
        }
    }

    pub fn report(&self) -> Vec<TransactionReport> {
        let mut rows: Vec<TransactionReport> = self
            .entries
            .iter()
            .map(|kv| TransactionReport::build(kv.key(), kv.value(), self.percentile_rank))
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count));
        rows
    }

    /// Counts grouped by termination cause, with percentage shares.
    pub fn breakdown(&self) -> Vec<CauseBreakdown> {
        let mut by_cause: Vec<(String, u64)> = Vec::new();
        let mut total = 0u64;
        for kv in self.entries.iter() {
            total += kv.value().count;
            match by_cause.iter_mut().find(|(c, _)| c == &kv.key().termination_cause) {
                Some((_, n)) => *n += kv.value().count,
                None => by_cause.push((kv.key().termination_cause.clone(), kv.value().count)),
            }
        }
        let mut rows: Vec<CauseBreakdown> = by_cause
            .into_iter()
            .map(|(termination_cause, count)| CauseBreakdown {
                termination_cause,
                count,
                share_pct: if total == 0 {
                    0.0
                } else {
                    count as f64 * 100.0 / total as f64
                },
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count));
        rows
    }
}

impl Accumulator for TransactionAccumulator {
    fn name(&self) -> &'static str {
        "transactions"
    }

    fn record(&self, op: &OperationRecord) {
        let Some(cause) = &op.txn_termination_cause else {
            return;
        };
        let key = TransactionKey {
            retry_counter: op.txn_retry_counter.unwrap_or(0),
            termination_cause: cause.clone(),
            commit_type: op.txn_commit_type.clone(),
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

/// Derived view of one transaction entry.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub retry_counter: i64,
    pub termination_cause: String,
    pub commit_type: Option<String>,
    pub count: u64,
    pub duration_millis: StatsSummary,
    pub commit_micros: StatsSummary,
    pub active_micros: StatsSummary,
    pub inactive_micros: StatsSummary,
}

impl TransactionReport {
    fn build(key: &TransactionKey, entry: &TransactionEntry, rank: f64) -> Self {
        Self {
            retry_counter: key.retry_counter,
            termination_cause: key.termination_cause.clone(),
            commit_type: key.commit_type.clone(),
            count: entry.count,
            duration_millis: entry.duration_millis.summarize(rank),
            commit_micros: entry.commit_micros.summarize(rank),
            active_micros: entry.active_micros.summarize(rank),
            inactive_micros: entry.inactive_micros.summarize(rank),
        }
    }
}

/// One termination cause's share of all transactions.
#[derive(Debug, Clone, Serialize)]
pub struct CauseBreakdown {
    pub termination_cause: String,
    pub count: u64,
    pub share_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongolog_core::{Namespace, OpType};

    fn txn(cause: &str, commit_type: Option<&str>, duration: i64) -> OperationRecord {
        let mut op = OperationRecord::new(OpType::CommandOther, Namespace::empty());
        op.txn_retry_counter = Some(0);
        op.txn_termination_cause = Some(cause.into());
        op.txn_commit_type = commit_type.map(String::from);
        op.duration_millis = Some(duration);
        op
    }

    #[test]
    fn outcome_tally() {
        let acc = TransactionAccumulator::new(Arc::new(PipelineCounters::new()), 95.0);
        for duration in [10, 20, 30] {
            acc.record(&txn("committed", Some("readConcernMajority"), duration));
        }
        let rows = acc.report();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].duration_millis.min, Some(10));
        assert_eq!(rows[0].duration_millis.max, Some(30));
        assert_eq!(rows[0].duration_millis.mean, 20.0);

        let breakdown = acc.breakdown();
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].termination_cause, "committed");
        assert_eq!(breakdown[0].count, 3);
        assert!((breakdown[0].share_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn causes_split_shares() {
        let acc = TransactionAccumulator::new(Arc::new(PipelineCounters::new()), 95.0);
        acc.record(&txn("committed", None, 5));
        acc.record(&txn("committed", None, 5));
        acc.record(&txn("aborted", None, 5));
        let breakdown = acc.breakdown();
        assert_eq!(breakdown[0].termination_cause, "committed");
        assert!((breakdown[0].share_pct - 2.0 / 3.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn non_transaction_records_ignored() {
        let acc = TransactionAccumulator::new(Arc::new(PipelineCounters::new()), 95.0);
        acc.record(&OperationRecord::new(OpType::Find, Namespace::parse("d.c")));
        assert_eq!(acc.entry_count(), 0);
    }
}
