//! The normalized per-line operation record.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::namespace::Namespace;
use super::op_type::OpType;

/// One normalized record per admitted line.
///
/// Every numeric field is optional — servers omit what an operation did not
/// do. The op type is the only mandatory field: lines that cannot be
/// classified are discarded (and counted) upstream, so an `OperationRecord`
/// always has a concrete [`OpType`].
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub op_type: OpType,
    pub namespace: Namespace,
    pub timestamp: Option<DateTime<Utc>>,

    pub duration_millis: Option<i64>,
    pub keys_examined: Option<i64>,
    pub docs_examined: Option<i64>,
    pub n_returned: Option<i64>,
    pub result_length_bytes: Option<i64>,
    pub bytes_read: Option<i64>,
    pub bytes_written: Option<i64>,
    pub write_conflicts: Option<i64>,
    pub n_shards: Option<i64>,
    pub planning_time_micros: Option<i64>,

    pub plan_summary: Option<String>,
    pub plan_cache_key: Option<String>,
    pub query_hash: Option<String>,
    pub sanitized_filter: Option<String>,
    pub app_name: Option<String>,

    pub has_replan: bool,
    pub replan_reason: Option<String>,

    pub txn_retry_counter: Option<i64>,
    pub txn_termination_cause: Option<String>,
    pub txn_commit_type: Option<String>,
    pub txn_commit_duration_micros: Option<i64>,
    pub txn_active_micros: Option<i64>,
    pub txn_inactive_micros: Option<i64>,

    pub error_code_name: Option<String>,
    pub error_code_number: Option<i64>,
    pub error_message: Option<String>,

    /// Shared pointer to the original line. Accumulators keep at most one of
    /// these per entry (the worst-case exemplar), never the full stream.
    pub raw_sample: Option<Arc<str>>,
}

impl OperationRecord {
    /// A record with the mandatory fields set and everything else absent.
    pub fn new(op_type: OpType, namespace: Namespace) -> Self {
        Self {
            op_type,
            namespace,
            timestamp: None,
            duration_millis: None,
            keys_examined: None,
            docs_examined: None,
            n_returned: None,
            result_length_bytes: None,
            bytes_read: None,
            bytes_written: None,
            write_conflicts: None,
            n_shards: None,
            planning_time_micros: None,
            plan_summary: None,
            plan_cache_key: None,
            query_hash: None,
            sanitized_filter: None,
            app_name: None,
            has_replan: false,
            replan_reason: None,
            txn_retry_counter: None,
            txn_termination_cause: None,
            txn_commit_type: None,
            txn_commit_duration_micros: None,
            txn_active_micros: None,
            txn_inactive_micros: None,
            error_code_name: None,
            error_code_number: None,
            error_message: None,
            raw_sample: None,
        }
    }

    /// Whether the reported plan is a full collection scan.
    pub fn is_collection_scan(&self) -> bool {
        self.plan_summary
            .as_deref()
            .is_some_and(|s| s.contains("COLLSCAN"))
    }

    /// Whether this record carries transaction outcome telemetry.
    pub fn has_transaction(&self) -> bool {
        self.txn_termination_cause.is_some()
    }

    /// Whether this record carries a server error.
    pub fn has_error(&self) -> bool {
        self.error_code_name.is_some()
    }
}
