//! # opgate-audit
//!
//! Append-only audit trail for the `OpGate` policy gateway.
//!
//! Every operation the gate sees — rejected, committed, or failed in
//! execution — leaves an immutable [`AuditRecord`]. Records sharing a
//! correlation id form the full causal history of one logical operation.
//!
//! ## Modules
//!
//! - [`log`] - The in-memory log: append, retention, recency and
//!   correlation queries
//! - [`sink`] - Optional tamper-evident JSONL persistence with an
//!   HMAC-SHA256 chain and size-based rotation
//!
//! Audit failures never abort the governed operation: appending to the
//! in-memory log is infallible, and sink errors are reported through
//! `tracing` only.
//!
//! ## Example
//!
//! ```
//! use opgate_audit::{AuditEvent, AuditLog};
//!
//! let log = AuditLog::new(1000);
//! log.log_accepted(
//!     AuditEvent::new("corr-7", "swap")
//!         .with_cost("2500000")
//!         .with_external_reference("0xf00d"),
//! );
//!
//! assert_eq!(log.recent(1)[0].correlation_id, "corr-7");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod log;
pub mod sink;

pub use log::{AuditEvent, AuditLog, AuditOutcome, AuditRecord};
pub use sink::{AuditError, AuditSink, VerifyResult};
