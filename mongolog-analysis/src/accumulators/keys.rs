//! Accumulator key types.
//!
//! Flat value types with structural equality and a stable hash — one per
//! grouping dimension. Namespaces clone cheaply (shared `Arc` parts).

use serde::Serialize;

use mongolog_core::{Namespace, OpType};

/// (namespace, op-type) — the operation aggregate key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OpKey {
    pub namespace: Namespace,
    pub op_type: OpType,
}

/// (namespace, plan-cache-key, query-hash, plan-summary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlanCacheKey {
    pub namespace: Namespace,
    pub plan_cache_key: String,
    pub query_hash: Option<String>,
    pub plan_summary: Option<String>,
}

/// (namespace, op-type, query-hash, plan-summary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryHashKey {
    pub namespace: Namespace,
    pub op_type: OpType,
    pub query_hash: String,
    pub plan_summary: Option<String>,
}

/// (retry-counter, termination-cause, commit-type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TransactionKey {
    pub retry_counter: i64,
    pub termination_cause: String,
    pub commit_type: Option<String>,
}

/// (namespace, plan-summary) — the index-usage aggregate key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexUsageKey {
    pub namespace: Namespace,
    pub plan_summary: String,
}

impl IndexUsageKey {
    /// Whether this usage pattern is a full collection scan.
    pub fn is_collection_scan(&self) -> bool {
        self.plan_summary.contains("COLLSCAN")
    }
}
