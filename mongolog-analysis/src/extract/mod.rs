//! Field extractor — one admitted line in, at most one normalized record
//! and at most one connection event out.
//!
//! Extraction never fails loudly: structural problems are diagnostic
//! counters and the line is skipped. Never blocks on I/O.

pub mod command;
pub mod connection;
pub mod numeric;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use mongolog_core::{
    ConnectionEvent, Namespace, OperationRecord, OpType, PipelineCounters,
};

use self::numeric::{field_bool, field_i64, field_obj, field_str};

/// How many unrecognized commands get logged at debug before going silent.
const UNKNOWN_COMMAND_LOG_SAMPLE: u64 = 5;

/// The output of extracting one line.
#[derive(Debug, Default)]
pub struct Extraction {
    pub record: Option<OperationRecord>,
    pub event: Option<ConnectionEvent>,
}

/// Stateless extractor; one per pipeline, shared by every worker.
#[derive(Debug, Default)]
pub struct RecordExtractor;

impl RecordExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract from one line. Depends only on the line (and configuration),
    /// never on call order.
    pub fn extract(&self, line: &str, counters: &PipelineCounters) -> Extraction {
        let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(line) else {
            counters.bump_parse_error();
            return Extraction::default();
        };

        let component = field_str(&doc, "c").unwrap_or("");
        let msg = field_str(&doc, "msg").unwrap_or("");
        let ctx = field_str(&doc, "ctx").unwrap_or("");
        let timestamp = parse_timestamp(&doc);
        let attr = field_obj(&doc, "attr");

        let event = connection::classify_event(component, msg, ctx, attr, timestamp);

        let record = self.extract_record(component, msg, attr, timestamp, line, event.is_some(), counters);
        if let Some(rec) = &record {
            counters.record_op(rec.op_type);
        }

        Extraction { record, event }
    }

    fn extract_record(
        &self,
        component: &str,
        msg: &str,
        attr: Option<&Map<String, Value>>,
        timestamp: Option<DateTime<Utc>>,
        line: &str,
        has_event: bool,
        counters: &PipelineCounters,
    ) -> Option<OperationRecord> {
        let Some(attr) = attr else {
            // Pure connection events legitimately carry no payload worth a
            // record; anything else missing `attr` is malformed.
            if !has_event {
                counters.bump_no_attr();
            }
            return None;
        };

        // TTL monitor deletion pass.
        if component == "INDEX" {
            if msg.contains("Deleted expired documents") {
                return Some(self.ttl_record(attr, timestamp, line));
            }
            return None;
        }

        let ns = field_str(attr, "ns");
        let command = field_obj(attr, "command");

        let (op_type, namespace, command) = if let Some(cmd) = command {
            match command::recognize(cmd, ns) {
                Some(rec) => (rec.op_type, rec.namespace, Some(cmd)),
                None => {
                    let seen = counters.bump_unknown_command();
                    if seen <= UNKNOWN_COMMAND_LOG_SAMPLE {
                        tracing::debug!(command = ?cmd.keys().next(), "unrecognized command verb");
                    }
                    return None;
                }
            }
        } else if let Some(op) = field_str(attr, "type").and_then(command::write_op_type) {
            let namespace = ns.map_or_else(Namespace::empty, Namespace::parse);
            (op, namespace, None)
        } else if attr.contains_key("terminationCause") {
            // Transaction outcome telemetry has no command verb.
            (OpType::CommandOther, Namespace::empty(), None)
        } else {
            // Lines that only carry a connection event are complete as-is.
            if !has_event {
                counters.bump_no_command();
            }
            return None;
        };

        if namespace.is_empty() && op_type != OpType::CommandOther {
            counters.bump_no_namespace();
        }

        let mut record = OperationRecord::new(op_type, namespace);
        record.timestamp = timestamp;
        record.raw_sample = Some(Arc::from(line));
        fill_execution_fields(&mut record, attr);
        fill_transaction_fields(&mut record, attr);
        fill_error_fields(&mut record, attr);
        if let Some(cmd) = command {
            record.sanitized_filter = extract_filter(cmd);
        }
        Some(record)
    }

    fn ttl_record(
        &self,
        attr: &Map<String, Value>,
        timestamp: Option<DateTime<Utc>>,
        line: &str,
    ) -> OperationRecord {
        let namespace = field_str(attr, "namespace")
            .or_else(|| field_str(attr, "ns"))
            .map_or_else(Namespace::empty, Namespace::parse);
        let mut record = OperationRecord::new(OpType::TtlDelete, namespace);
        record.timestamp = timestamp;
        record.raw_sample = Some(Arc::from(line));
        record.n_returned = field_i64(attr, "numDeleted");
        record.duration_millis = field_i64(attr, "durationMillis");
        record
    }
}

fn parse_timestamp(doc: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let date = field_obj(doc, "t").and_then(|t| field_str(t, "$date"))?;
    DateTime::parse_from_rfc3339(date)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn fill_execution_fields(record: &mut OperationRecord, attr: &Map<String, Value>) {
    record.duration_millis = field_i64(attr, "durationMillis");
    record.keys_examined = field_i64(attr, "keysExamined");
    record.docs_examined = field_i64(attr, "docsExamined");
    record.n_returned = field_i64(attr, "nreturned").or_else(|| field_i64(attr, "nReturned"));
    record.result_length_bytes = field_i64(attr, "reslen");
    record.write_conflicts = field_i64(attr, "writeConflicts");
    record.n_shards = field_i64(attr, "nShards");
    record.planning_time_micros = field_i64(attr, "planningTimeMicros");
    record.plan_summary = field_str(attr, "planSummary").map(String::from);
    record.plan_cache_key = field_str(attr, "planCacheKey").map(String::from);
    record.query_hash = field_str(attr, "queryHash").map(String::from);
    record.app_name = field_str(attr, "appName").map(String::from);
    record.has_replan = field_bool(attr, "replanned");
    record.replan_reason = field_str(attr, "replanReason").map(String::from);

    // Storage totals live nested, at either of two depths.
    if let Some(storage) = field_obj(attr, "storage") {
        let data = field_obj(storage, "data");
        record.bytes_read = field_i64(storage, "bytesRead")
            .or_else(|| data.and_then(|d| field_i64(d, "bytesRead")));
        record.bytes_written = field_i64(storage, "bytesWritten")
            .or_else(|| data.and_then(|d| field_i64(d, "bytesWritten")));
    }
}

fn fill_transaction_fields(record: &mut OperationRecord, attr: &Map<String, Value>) {
    record.txn_termination_cause = field_str(attr, "terminationCause").map(String::from);
    if record.txn_termination_cause.is_none() {
        return;
    }
    record.txn_retry_counter = field_i64(attr, "txnRetryCounter").or_else(|| {
        field_obj(attr, "parameters").and_then(|p| field_i64(p, "txnRetryCounter"))
    });
    record.txn_commit_type = field_str(attr, "commitType").map(String::from);
    record.txn_commit_duration_micros = field_i64(attr, "commitDurationMicros");
    record.txn_active_micros = field_i64(attr, "timeActiveMicros");
    record.txn_inactive_micros = field_i64(attr, "timeInactiveMicros");
}

fn fill_error_fields(record: &mut OperationRecord, attr: &Map<String, Value>) {
    if let Some(error) = field_obj(attr, "error") {
        record.error_code_name = field_str(error, "codeName").map(String::from);
        record.error_code_number = field_i64(error, "code");
        record.error_message = field_str(error, "errmsg").map(String::from);
        return;
    }
    record.error_code_name = field_str(attr, "errName").map(String::from);
    record.error_code_number = field_i64(attr, "errCode");
    record.error_message = field_str(attr, "errMsg").map(String::from);
}

/// The query shape, captured as a compact string. Hash capture only — no
/// semantic analysis of the values.
fn extract_filter(command: &Map<String, Value>) -> Option<String> {
    command
        .get("filter")
        .or_else(|| command.get("query"))
        .or_else(|| command.get("q"))
        .map(Value::to_string)
}
