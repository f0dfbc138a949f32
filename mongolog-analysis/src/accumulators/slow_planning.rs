//! Top-N slowest-planning stream.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use mongolog_core::{Namespace, OperationRecord, OpType};

use super::Accumulator;

/// Keep at most this many times the reported N buffered before pruning.
const PRUNE_FACTOR: usize = 8;

/// One retained slow-planning observation.
#[derive(Debug, Clone, Serialize)]
pub struct SlowPlanEntry {
    pub namespace: Namespace,
    pub op_type: OpType,
    pub plan_summary: Option<String>,
    pub sanitized_filter: Option<String>,
    pub query_hash: Option<String>,
    pub app_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub planning_time_micros: i64,
}

/// Append-only collector of the slowest planning observations.
///
/// Appends are cheap; the sort happens at retrieval. The buffer is pruned
/// back to the top slice whenever it outgrows `PRUNE_FACTOR × top_n`, so a
/// long run cannot buffer without bound.
pub struct SlowPlanningAccumulator {
    entries: Mutex<Vec<SlowPlanEntry>>,
    top_n: usize,
}

impl SlowPlanningAccumulator {
    pub fn new(top_n: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            top_n: top_n.max(1),
        }
    }

    /// The top N entries, slowest planning first.
    pub fn report(&self) -> Vec<SlowPlanEntry> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return Vec::new(),
        };
        sort_and_truncate(&mut entries, self.top_n);
        entries
    }
}

impl Accumulator for SlowPlanningAccumulator {
    fn name(&self) -> &'static str {
        "slow_planning"
    }

    fn record(&self, op: &OperationRecord) {
        let Some(planning_time_micros) = op.planning_time_micros else {
            return;
        };
        let entry = SlowPlanEntry {
            namespace: op.namespace.clone(),
            op_type: op.op_type,
            plan_summary: op.plan_summary.clone(),
            sanitized_filter: op.sanitized_filter.clone(),
            query_hash: op.query_hash.clone(),
            app_name: op.app_name.clone(),
            timestamp: op.timestamp,
            planning_time_micros,
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
            if entries.len() > self.top_n * PRUNE_FACTOR {
                sort_and_truncate(&mut entries, self.top_n);
            }
        }
    }

    fn entry_count(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

fn sort_and_truncate(entries: &mut Vec<SlowPlanEntry>, top_n: usize) {
    entries.sort_by(|a, b| b.planning_time_micros.cmp(&a.planning_time_micros));
    entries.truncate(top_n);
}
