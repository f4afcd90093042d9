//! The policy gate: the single facade every outbound operation passes
//! through.
//!
//! The gate composes the four policy engines behind two entry points:
//!
//! - [`PolicyGate::authorize`] - run before the external operation, in
//!   fixed order, short-circuiting at the first failing check
//! - [`PolicyGate::commit`] - run after the external operation is
//!   confirmed successful; this is where counters and totals move
//!
//! # Operation state machine
//!
//! ```text
//! Pending --authorize ok--> Authorized --commit-----------> Committed
//!    |                          |
//!    +--authorize fails-----> Rejected
//!                               +--record_execution_failure--> ExecutionFailed
//! ```
//!
//! No operation reaches `Committed` without first being `Authorized`.
//! Because quota and spending are consumed only at commit time, a caller
//! that abandons an operation after authorization leaves the system
//! under-counted, never over-counted — availability is preferred over
//! strict conservatism for lost confirmations.
//!
//! # Check order
//!
//! `authorize` evaluates, short-circuiting on the first failure:
//!
//! 1. Global rate quota
//! 2. High-risk rate quota (only for operations flagged high-risk)
//! 3. Address policy against the destination
//! 4. Spending caps
//! 5. Per-destination rate quota
//!
//! Cheap checks run first and the heavier aggregate accounting last;
//! counters of checks that were never reached are untouched by a
//! rejection.
//!
//! # Example
//!
//! ```
//! use opgate::gate::PolicyGate;
//! use opgate_core::config::GateConfig;
//! use opgate_core::types::{OperationOutcome, OperationRequest};
//! use alloy_primitives::U256;
//!
//! let gate = PolicyGate::new(&GateConfig::default()).unwrap();
//!
//! let op = OperationRequest::new(
//!     "corr-1", "transfer", "ETH", "0xdeadbeef", U256::from(100u64),
//! );
//!
//! gate.authorize(&op).unwrap();
//! // ... perform the external operation, observe success ...
//! gate.commit(&OperationOutcome::new(op)).unwrap();
//!
//! assert_eq!(gate.recent(1)[0].correlation_id, "corr-1");
//! ```

use crate::logging::redact_arguments;
use alloy_primitives::U256;
use opgate_audit::{AuditEvent, AuditLog, AuditRecord};
use opgate_core::config::GateConfig;
use opgate_core::error::{ConfigError, GateError};
use opgate_core::types::{BatchInfo, OperationOutcome, OperationRequest, RateCategory};
use opgate_policy::address::{normalize_address, AddressCheck, AddressPolicy};
use opgate_policy::rate::{RateLimiter, RateStatus};
use opgate_policy::spending::{SpendingHeadroom, SpendingLimiter};
use std::sync::Arc;

/// Orchestrating facade over the four policy engines.
///
/// Constructed once from an immutable [`GateConfig`] and shared by
/// reference into every call path. All engines are `Send + Sync`; the
/// gate can be wrapped in an `Arc` and used from concurrent request
/// handlers.
pub struct PolicyGate {
    /// Cumulative exposure caps.
    spending: SpendingLimiter,
    /// Request-rate quotas.
    rate: RateLimiter,
    /// Destination allow/deny rules.
    address: AddressPolicy,
    /// Append-only operation trail.
    audit: Arc<AuditLog>,
}

impl std::fmt::Debug for PolicyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyGate")
            .field("address_mode", &self.address.mode())
            .finish_non_exhaustive()
    }
}

impl PolicyGate {
    /// Builds a gate with an in-memory audit log sized per the config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration fails validation.
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let audit = Arc::new(AuditLog::new(config.audit.max_records));
        Self::with_audit_log(config, audit)
    }

    /// Builds a gate around a caller-supplied audit log, e.g. one backed
    /// by a tamper-evident file sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration fails validation.
    pub fn with_audit_log(config: &GateConfig, audit: Arc<AuditLog>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            spending: SpendingLimiter::new(config.spending.clone()),
            rate: RateLimiter::new(config.rate.clone()),
            address: AddressPolicy::new(&config.address)?,
            audit,
        })
    }

    /// Authorizes an operation against every policy dimension.
    ///
    /// On failure, emits a `rejected` audit record carrying the failing
    /// dimension and returns the failure; counters of checks that were
    /// never reached are untouched. On success nothing is consumed —
    /// accounting happens at [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// Returns the first failing check's [`GateError`].
    pub fn authorize(&self, op: &OperationRequest) -> Result<(), GateError> {
        let span = tracing::info_span!(
            "authorize",
            correlation_id = %op.correlation_id,
            operation = %op.name,
        );
        let _enter = span.enter();

        match self.run_checks(op) {
            Ok(()) => {
                tracing::debug!(token = %op.token, amount = %op.amount, "operation authorized");
                Ok(())
            }
            Err(error) => {
                tracing::info!(%error, "operation rejected");
                self.audit.log_rejected(
                    AuditEvent::new(&op.correlation_id, &op.name)
                        .with_arguments(redact_arguments(&op.arguments))
                        .with_rejection_reason(error.to_string()),
                );
                Err(error)
            }
        }
    }

    /// The ordered, short-circuiting check chain.
    fn run_checks(&self, op: &OperationRequest) -> Result<(), GateError> {
        self.rate.validate(RateCategory::Global, None)?;

        if op.high_risk {
            self.rate.validate(RateCategory::HighRisk, None)?;
        }

        let destination = self.address.validate(&op.recipient)?;

        self.spending
            .validate(&op.token, op.amount, op.batch.as_ref())?;

        self.rate
            .validate(RateCategory::Destination, Some(&destination))?;

        Ok(())
    }

    /// Records a confirmed operation: spending totals, rate counters,
    /// and the `accepted` audit record.
    ///
    /// Called by the surrounding layer only after the external operation
    /// is confirmed successful, and at most once per operation —
    /// idempotency is not guaranteed. If execution failed instead, call
    /// [`record_execution_failure`](Self::record_execution_failure) and
    /// do NOT commit: accounting reflects only confirmed activity.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::MalformedInput`] if the recipient cannot be
    /// normalized (which a previously authorized request never exhibits).
    pub fn commit(&self, outcome: &OperationOutcome) -> Result<(), GateError> {
        let op = &outcome.request;
        let destination = normalize_address(&op.recipient)?;
        let spent = op.effective_amount();

        self.spending.record(&op.token, spent);
        self.rate.record_request(RateCategory::Global, None);
        if op.high_risk {
            self.rate.record_request(RateCategory::HighRisk, None);
        }
        self.rate
            .record_request(RateCategory::Destination, Some(&destination));

        let mut event = AuditEvent::new(&op.correlation_id, &op.name)
            .with_arguments(redact_arguments(&op.arguments))
            .with_cost(spent.to_string());
        if let Some(reference) = &outcome.external_reference {
            event = event.with_external_reference(reference);
        }
        if let Some(duration_ms) = outcome.duration_ms {
            event = event.with_duration_ms(duration_ms);
        }
        self.audit.log_accepted(event);

        tracing::info!(
            correlation_id = %op.correlation_id,
            token = %op.token,
            cost = %spent,
            "operation committed"
        );
        Ok(())
    }

    /// Records that an authorized operation failed during external
    /// execution.
    ///
    /// Emits an `execution_failed` audit record. No counter or total
    /// moves: rate and spending accounting reflect only confirmed
    /// activity, not attempts.
    pub fn record_execution_failure(
        &self,
        op: &OperationRequest,
        error_detail: &str,
        duration_ms: Option<u64>,
    ) {
        tracing::warn!(
            correlation_id = %op.correlation_id,
            error_detail,
            "external execution failed after authorization"
        );

        let mut event = AuditEvent::new(&op.correlation_id, &op.name)
            .with_arguments(redact_arguments(&op.arguments))
            .with_error_detail(error_detail);
        if let Some(duration_ms) = duration_ms {
            event = event.with_duration_ms(duration_ms);
        }
        self.audit.log_execution_failed(event);
    }

    /// Advisory spending check: same evaluation as the authorize path,
    /// but consumes nothing and leaves no audit trace.
    ///
    /// Never a substitute for [`authorize`](Self::authorize) on a real
    /// execution path.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::LimitExceeded`] exactly as the authorize
    /// path would.
    pub fn preview_spending(
        &self,
        token: &str,
        amount: U256,
        batch: Option<&BatchInfo>,
    ) -> Result<(), GateError> {
        self.spending.validate(token, amount, batch)
    }

    /// Read-only allowance remaining for a token and in aggregate.
    #[must_use]
    pub fn spending_headroom(&self, token: &str) -> SpendingHeadroom {
        self.spending.remaining(token)
    }

    /// Advisory address check with no quota or audit effect.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::MalformedInput`] if the address cannot be
    /// normalized.
    pub fn preview_address(&self, address: &str) -> Result<AddressCheck, GateError> {
        self.address.check(address)
    }

    /// Advisory rate-quota preview with no quota or audit effect.
    #[must_use]
    pub fn preview_rate(&self, category: RateCategory, key: Option<&str>) -> RateStatus {
        self.rate.check(category, key)
    }

    /// The most recent audit records, newest first.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<AuditRecord> {
        self.audit.recent(count)
    }

    /// Every audit record for one operation, in append order.
    #[must_use]
    pub fn by_correlation_id(&self, correlation_id: &str) -> Vec<AuditRecord> {
        self.audit.by_correlation_id(correlation_id)
    }

    /// Shared handle to the underlying audit log.
    #[must_use]
    pub fn audit_log(&self) -> Arc<AuditLog> {
        Arc::clone(&self.audit)
    }
}
