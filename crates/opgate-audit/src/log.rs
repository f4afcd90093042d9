//! Append-only in-memory audit trail.
//!
//! Every attempted operation leaves a structured [`AuditRecord`] here:
//! rejected operations a `rejected` record, committed operations an
//! `accepted` record, and operations that failed after authorization an
//! `execution_failed` record. Records sharing a correlation id form the
//! full causal history of one logical operation and are retrievable
//! together, in append order.
//!
//! Records are immutable once appended and are removed only by the
//! retention policy (oldest-first eviction past the configured maximum).
//! Timestamps are assigned at append time, not at call initiation, which
//! preserves true completion order under concurrency.
//!
//! Appending never fails from the caller's perspective: persistence
//! problems in an attached [`AuditSink`](crate::sink::AuditSink) are
//! reported through `tracing` only and never abort the governed
//! operation.
//!
//! # Example
//!
//! ```
//! use opgate_audit::log::{AuditEvent, AuditLog};
//!
//! let log = AuditLog::new(100);
//! log.log_rejected(
//!     AuditEvent::new("corr-1", "transfer")
//!         .with_rejection_reason("address is deny-listed: 0xbad"),
//! );
//!
//! let history = log.by_correlation_id("corr-1");
//! assert_eq!(history.len(), 1);
//! assert!(history[0].rejection_reason.as_deref().unwrap().contains("0xbad"));
//! ```

use crate::sink::AuditSink;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Timestamp format shared by records and log file names.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Final disposition of one audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The operation was authorized and its execution confirmed.
    Accepted,

    /// Authorization failed; the operation never reached the external
    /// system.
    Rejected,

    /// Authorization succeeded but the external execution failed.
    ExecutionFailed,
}

impl AuditOutcome {
    /// Stable string form used in persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::ExecutionFailed => "execution_failed",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Sequence number, monotonically increasing per log.
    pub seq: u64,

    /// ISO 8601 timestamp assigned when the record was appended.
    pub timestamp: String,

    /// Correlation ID threading together all records of one operation.
    pub correlation_id: String,

    /// Operation name as exposed to the caller.
    pub operation: String,

    /// Caller-supplied arguments, already redacted by the caller.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, serde_json::Value>,

    /// Final disposition of this record.
    pub outcome: AuditOutcome,

    /// Which policy dimension rejected the operation, for `rejected`
    /// records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    /// What went wrong externally, for `execution_failed` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// Wall-clock duration of the external execution, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// External reference (e.g. transaction identifier), if one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,

    /// Amount the operation spent, as a decimal string in smallest
    /// units.
    ///
    /// String representation avoids precision loss with large amounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
}

/// Input for one audit append, before seq and timestamp are assigned.
#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
    /// Correlation ID for the operation.
    pub correlation_id: String,

    /// Operation name.
    pub operation: String,

    /// Caller-supplied arguments (redacted by the caller).
    pub arguments: BTreeMap<String, serde_json::Value>,

    /// Rejection reason for `rejected` records.
    pub rejection_reason: Option<String>,

    /// Error detail for `execution_failed` records.
    pub error_detail: Option<String>,

    /// Execution duration in milliseconds.
    pub duration_ms: Option<u64>,

    /// External reference, e.g. a transaction identifier.
    pub external_reference: Option<String>,

    /// Amount spent, as a decimal string.
    pub cost: Option<String>,
}

impl AuditEvent {
    /// Creates an event with the identifying fields set.
    #[must_use]
    pub fn new(correlation_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Attaches the redacted argument map.
    #[must_use]
    pub fn with_arguments(mut self, arguments: BTreeMap<String, serde_json::Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Attaches a rejection reason.
    #[must_use]
    pub fn with_rejection_reason(mut self, reason: impl Into<String>) -> Self {
        self.rejection_reason = Some(reason.into());
        self
    }

    /// Attaches an execution error detail.
    #[must_use]
    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    /// Attaches the execution duration in milliseconds.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attaches the external reference.
    #[must_use]
    pub fn with_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    /// Attaches the spent amount as a decimal string.
    #[must_use]
    pub fn with_cost(mut self, cost: impl Into<String>) -> Self {
        self.cost = Some(cost.into());
        self
    }
}

/// Interior state guarded by the log's mutex.
#[derive(Debug, Default)]
struct LogState {
    /// Retained records, oldest first.
    records: VecDeque<AuditRecord>,
    /// Next sequence number to assign.
    next_seq: u64,
}

/// Append-only audit log with bounded in-memory retention.
///
/// The log serializes appends (and sink writes, when a sink is attached)
/// behind one mutex, so records — including those sharing a correlation
/// id — are persisted in exactly the order they were appended.
pub struct AuditLog {
    /// Records plus the seq counter, behind one lock.
    state: Mutex<LogState>,
    /// Retention bound; the oldest records are evicted past it.
    max_records: usize,
    /// Optional tamper-evident file sink.
    sink: Option<AuditSink>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("max_records", &self.max_records)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Creates an in-memory log retaining at most `max_records` records.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            max_records,
            sink: None,
        }
    }

    /// Creates a log that additionally persists every record through the
    /// given sink.
    #[must_use]
    pub fn with_sink(max_records: usize, sink: AuditSink) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            max_records,
            sink: Some(sink),
        }
    }

    /// Appends a record, assigning its sequence number and timestamp.
    ///
    /// Returns the assigned sequence number. Never fails: sink errors are
    /// reported through `tracing::warn!` and do not propagate.
    pub fn append(&self, outcome: AuditOutcome, event: AuditEvent) -> u64 {
        let mut state = lock(&self.state);

        let seq = state.next_seq;
        state.next_seq += 1;

        let record = AuditRecord {
            seq,
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            correlation_id: event.correlation_id,
            operation: event.operation,
            arguments: event.arguments,
            outcome,
            rejection_reason: event.rejection_reason,
            error_detail: event.error_detail,
            duration_ms: event.duration_ms,
            external_reference: event.external_reference,
            cost: event.cost,
        };

        // Persist before releasing the lock so file order matches append
        // order. A sink failure must never abort the governed operation.
        if let Some(sink) = &self.sink {
            if let Err(error) = sink.write(&record) {
                tracing::warn!(
                    target: "opgate::audit",
                    seq,
                    correlation_id = %record.correlation_id,
                    %error,
                    "audit sink write failed; record retained in memory only"
                );
            }
        }

        state.records.push_back(record);
        while state.records.len() > self.max_records {
            state.records.pop_front();
        }

        seq
    }

    /// Appends an `accepted` record.
    pub fn log_accepted(&self, event: AuditEvent) -> u64 {
        self.append(AuditOutcome::Accepted, event)
    }

    /// Appends a `rejected` record.
    pub fn log_rejected(&self, event: AuditEvent) -> u64 {
        self.append(AuditOutcome::Rejected, event)
    }

    /// Appends an `execution_failed` record.
    pub fn log_execution_failed(&self, event: AuditEvent) -> u64 {
        self.append(AuditOutcome::ExecutionFailed, event)
    }

    /// The most recent records, newest first, at most `count` of them.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<AuditRecord> {
        let state = lock(&self.state);
        state.records.iter().rev().take(count).cloned().collect()
    }

    /// Every record sharing a correlation id, in append order.
    #[must_use]
    pub fn by_correlation_id(&self, correlation_id: &str) -> Vec<AuditRecord> {
        let state = lock(&self.state);
        state
            .records
            .iter()
            .filter(|r| r.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).records.len()
    }

    /// Whether the log holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::indexing_slicing,
        clippy::similar_names,
        clippy::unreadable_literal
    )]

    use super::*;

    fn event(correlation_id: &str) -> AuditEvent {
        AuditEvent::new(correlation_id, "transfer")
    }

    #[test]
    fn test_append_assigns_monotonic_seq() {
        let log = AuditLog::new(10);
        assert_eq!(log.log_accepted(event("a")), 0);
        assert_eq!(log.log_rejected(event("b")), 1);
        assert_eq!(log.log_execution_failed(event("c")), 2);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_append_assigns_timestamp() {
        let log = AuditLog::new(10);
        log.log_accepted(event("a"));

        let records = log.recent(1);
        // ISO 8601 with millisecond precision and Z suffix.
        assert!(records[0].timestamp.ends_with('Z'));
        assert!(records[0].timestamp.contains('T'));
    }

    #[test]
    fn test_outcomes_are_recorded() {
        let log = AuditLog::new(10);
        log.log_accepted(event("a"));
        log.log_rejected(event("a"));
        log.log_execution_failed(event("a"));

        let history = log.by_correlation_id("a");
        assert_eq!(history[0].outcome, AuditOutcome::Accepted);
        assert_eq!(history[1].outcome, AuditOutcome::Rejected);
        assert_eq!(history[2].outcome, AuditOutcome::ExecutionFailed);
    }

    #[test]
    fn test_recent_is_newest_first_and_bounded() {
        let log = AuditLog::new(10);
        for i in 0..5 {
            log.log_accepted(event(&format!("op-{i}")));
        }

        let recent = log.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].correlation_id, "op-4");
        assert_eq!(recent[1].correlation_id, "op-3");
        assert_eq!(recent[2].correlation_id, "op-2");

        // Asking for more than exist returns everything.
        assert_eq!(log.recent(100).len(), 5);
    }

    #[test]
    fn test_by_correlation_id_preserves_append_order() {
        let log = AuditLog::new(10);
        log.log_rejected(event("x").with_rejection_reason("first"));
        log.log_accepted(event("y"));
        log.log_rejected(event("x").with_rejection_reason("second"));

        let history = log.by_correlation_id("x");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].rejection_reason.as_deref(), Some("first"));
        assert_eq!(history[1].rejection_reason.as_deref(), Some("second"));
    }

    #[test]
    fn test_rejection_only_history_is_retrievable() {
        let log = AuditLog::new(10);
        log.log_rejected(event("blocked").with_rejection_reason("deny-listed"));

        let history = log.by_correlation_id("blocked");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, AuditOutcome::Rejected);
    }

    #[test]
    fn test_retention_evicts_oldest_first() {
        let log = AuditLog::new(3);
        for i in 0..5 {
            log.log_accepted(event(&format!("op-{i}")));
        }

        assert_eq!(log.len(), 3);
        let recent = log.recent(3);
        // op-0 and op-1 were evicted; survivors keep their order.
        assert_eq!(recent[2].correlation_id, "op-2");
        assert_eq!(recent[0].correlation_id, "op-4");
        assert!(log.by_correlation_id("op-0").is_empty());
    }

    #[test]
    fn test_event_builders_carry_through() {
        let log = AuditLog::new(10);
        let mut arguments = BTreeMap::new();
        arguments.insert("memo".to_string(), serde_json::json!("payroll"));

        log.log_accepted(
            event("full")
                .with_arguments(arguments)
                .with_duration_ms(88)
                .with_external_reference("0xtxhash")
                .with_cost("1000000"),
        );

        let record = &log.by_correlation_id("full")[0];
        assert_eq!(record.arguments["memo"], serde_json::json!("payroll"));
        assert_eq!(record.duration_ms, Some(88));
        assert_eq!(record.external_reference.as_deref(), Some("0xtxhash"));
        assert_eq!(record.cost.as_deref(), Some("1000000"));
    }

    #[test]
    fn test_record_serialization_omits_empty_fields() {
        let log = AuditLog::new(10);
        log.log_accepted(event("lean"));

        let record = &log.recent(1)[0];
        let json = serde_json::to_value(record).unwrap();
        assert!(json.get("rejection_reason").is_none());
        assert!(json.get("cost").is_none());
        assert_eq!(json["outcome"], "accepted");
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(AuditOutcome::Accepted.as_str(), "accepted");
        assert_eq!(AuditOutcome::Rejected.as_str(), "rejected");
        assert_eq!(AuditOutcome::ExecutionFailed.as_str(), "execution_failed");
        assert_eq!(AuditOutcome::ExecutionFailed.to_string(), "execution_failed");
    }

    #[test]
    fn test_concurrent_appends_keep_unique_seqs() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let log = Arc::new(AuditLog::new(1000));
        let mut handles = vec![];

        for t in 0..8 {
            let log = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                (0..25)
                    .map(|i| log.log_accepted(AuditEvent::new(format!("t{t}-{i}"), "transfer")))
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(seen.insert(seq), "duplicate seq {seq}");
            }
        }
        assert_eq!(seen.len(), 200);
        assert_eq!(log.len(), 200);
    }
}
