//! Per-error-code counter with one sample message.

use dashmap::DashMap;
use serde::Serialize;

use mongolog_core::OperationRecord;

use super::Accumulator;

/// Aggregate state for one error code name.
#[derive(Debug, Default)]
pub struct ErrorCodeEntry {
    pub count: u64,
    pub code_number: Option<i64>,
    pub sample_message: Option<String>,
}

/// Concurrent per-code-name error tally.
#[derive(Default)]
pub struct ErrorCodeAccumulator {
    entries: DashMap<String, ErrorCodeEntry>,
}

impl ErrorCodeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one error observation. The first observation for a code name
    /// captures the number and message; later ones fill in whatever was
    /// absent.
    pub fn record_error(&self, code_name: &str, code_number: Option<i64>, message: Option<&str>) {
        let mut entry = self.entries.entry(code_name.to_string()).or_default();
        entry.count += 1;
        if entry.code_number.is_none() {
            entry.code_number = code_number;
        }
        if entry.sample_message.is_none() {
            entry.sample_message = message.map(String::from);
        }
    }

    pub fn report(&self) -> Vec<ErrorCodeReport> {
        let mut rows: Vec<ErrorCodeReport> = self
            .entries
            .iter()
            .map(|kv| ErrorCodeReport {
                code_name: kv.key().clone(),
                count: kv.value().count,
                code_number: kv.value().code_number,
                sample_message: kv.value().sample_message.clone(),
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code_name.cmp(&b.code_name)));
        rows
    }
}

impl Accumulator for ErrorCodeAccumulator {
    fn name(&self) -> &'static str {
        "errors"
    }

    fn record(&self, op: &OperationRecord) {
        let Some(code_name) = &op.error_code_name else {
            return;
        };
        self.record_error(code_name, op.error_code_number, op.error_message.as_deref());
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Derived view of one error-code entry.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorCodeReport {
    pub code_name: String,
    pub count: u64,
    pub code_number: Option<i64>,
    pub sample_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_captures_everything() {
        let acc = ErrorCodeAccumulator::new();
        acc.record_error("StaleConfig", Some(13388), Some("version mismatch"));
        acc.record_error("StaleConfig", Some(99999), Some("other message"));
        let rows = acc.report();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].code_number, Some(13388));
        assert_eq!(rows[0].sample_message.as_deref(), Some("version mismatch"));
    }

    #[test]
    fn later_observations_fill_in_absent_fields() {
        let acc = ErrorCodeAccumulator::new();
        acc.record_error("MaxTimeMSExpired", None, None);
        acc.record_error("MaxTimeMSExpired", Some(50), Some("time limit"));
        let rows = acc.report();
        assert_eq!(rows[0].code_number, Some(50));
        assert_eq!(rows[0].sample_message.as_deref(), Some("time limit"));
    }

    #[test]
    fn sorted_by_count() {
        let acc = ErrorCodeAccumulator::new();
        acc.record_error("A", None, None);
        acc.record_error("B", None, None);
        acc.record_error("B", None, None);
        let rows = acc.report();
        assert_eq!(rows[0].code_name, "B");
    }
}
