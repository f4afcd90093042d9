//! # opgate
//!
//! Policy gateway for agent-issued financial operations.
//!
//! `OpGate` sits between an automated agent and the systems that move
//! money on its behalf. Every outbound operation (token transfer, swap,
//! batch payout) passes through a single [`PolicyGate`] that enforces,
//! in order: request-rate quotas, destination address rules, and
//! spending caps — and leaves an immutable audit record either way. A
//! misbehaving or compromised caller cannot exceed the configured
//! financial exposure, and every attempt is forensically traceable.
//!
//! ## Crates
//!
//! - [`opgate_core`] - Shared types, errors, and configuration
//! - [`opgate_policy`] - The spending, rate, and address engines
//! - [`opgate_audit`] - The audit trail and tamper-evident sink
//! - `opgate` (this crate) - The [`PolicyGate`] facade and logging
//!
//! ## Protocol
//!
//! ```
//! use opgate::PolicyGate;
//! use opgate::logging::new_correlation_id;
//! use opgate_core::config::GateConfig;
//! use opgate_core::types::{OperationOutcome, OperationRequest};
//! use alloy_primitives::U256;
//!
//! let gate = PolicyGate::new(&GateConfig::default()).unwrap();
//!
//! let op = OperationRequest::new(
//!     new_correlation_id(),
//!     "transfer",
//!     "ETH",
//!     "0x00000000000000000000000000000000000000aa",
//!     U256::from(1_000u64),
//! );
//!
//! // 1. Authorize before touching the external system.
//! gate.authorize(&op).unwrap();
//!
//! // 2. Execute externally; on confirmed success, commit.
//! gate.commit(&OperationOutcome::new(op).with_external_reference("0xtx"))
//!     .unwrap();
//!
//! // 3. The audit trail has the full story.
//! assert_eq!(gate.recent(1).len(), 1);
//! ```
//!
//! On an execution failure after authorization, call
//! [`PolicyGate::record_execution_failure`] instead of `commit`:
//! accounting reflects only confirmed activity.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod gate;
pub mod logging;

pub use gate::PolicyGate;

pub use opgate_audit::{AuditEvent, AuditLog, AuditOutcome, AuditRecord, AuditSink};
pub use opgate_core::config::GateConfig;
pub use opgate_core::error::{ErrorPayload, GateError};
pub use opgate_core::types::{BatchInfo, OperationOutcome, OperationRequest, RateCategory};
