//! Core types for the `OpGate` policy gateway.
//!
//! This module provides the foundational types used across all `OpGate` crates:
//!
//! - [`OperationRequest`] - Descriptor of a financially-sensitive operation
//! - [`BatchInfo`] - Batch metadata for multi-recipient operations
//! - [`OperationOutcome`] - Confirmed result of an executed operation
//! - [`RateCategory`] - Classification of rate-limited request classes
//! - [`LimitDimension`] - The spending dimension a limit check reports
//!
//! # Examples
//!
//! ```
//! use opgate_core::types::OperationRequest;
//! use alloy_primitives::U256;
//!
//! // Describe a 1.5 ETH transfer issued by the agent
//! let op = OperationRequest::new(
//!     "3f2a9c0d41e88b17",
//!     "transfer",
//!     "ETH",
//!     "0x742d35Cc6634C0532925a3b844Bc454e7595f8fE",
//!     U256::from(1_500_000_000_000_000_000u64),
//! );
//!
//! assert!(!op.high_risk);
//! assert_eq!(op.effective_amount(), U256::from(1_500_000_000_000_000_000u64));
//! ```

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Descriptor of a financially-sensitive operation awaiting authorization.
///
/// The surrounding request layer builds one of these per outbound operation
/// (token transfer, swap, batch payout) before asking the gate to authorize
/// it. The descriptor carries everything the policy engines need to decide:
/// the token and amount for spending caps, the recipient for the address
/// policy and per-destination quota, and the classification flags that
/// select the stricter high-risk quota.
///
/// # Fields
///
/// - `correlation_id`: threads together every audit record this operation
///   produces
/// - `name`: the operation name as exposed to the caller (e.g. "transfer")
/// - `token`: token symbol or contract address, the spending-cap key
/// - `recipient`: destination address in `0x`-prefixed hex
/// - `amount`: amount in the token's smallest unit
/// - `high_risk`: selects the narrower high-risk rate quota
/// - `batch`: present for multi-recipient operations
/// - `arguments`: caller-supplied arguments, recorded (redacted) in the
///   audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Correlation ID threading together all audit records for this operation.
    pub correlation_id: String,

    /// Operation name as exposed to the caller (e.g. "transfer", "swap").
    pub name: String,

    /// Token symbol or contract address used as the spending-cap key.
    pub token: String,

    /// Destination address (`0x`-prefixed hex, any case).
    pub recipient: String,

    /// Amount in the token's smallest unit.
    ///
    /// Uses `U256` to avoid floating-point rounding drift across many small
    /// operations. For batch operations this is the per-recipient amount;
    /// the total is carried in [`BatchInfo::total`].
    pub amount: U256,

    /// Whether this operation is classified as high-risk.
    ///
    /// High-risk operations are additionally checked against the narrower
    /// high-risk rate quota.
    #[serde(default)]
    pub high_risk: bool,

    /// Batch metadata, present for multi-recipient operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchInfo>,

    /// Caller-supplied arguments, recorded (after redaction) in the audit
    /// trail.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, serde_json::Value>,
}

impl OperationRequest {
    /// Creates a new operation request with the given identity and transfer
    /// details.
    ///
    /// The request starts out as a plain (non-high-risk, non-batch)
    /// operation; use [`with_high_risk`](Self::with_high_risk),
    /// [`with_batch`](Self::with_batch), and
    /// [`with_argument`](Self::with_argument) to refine it.
    #[must_use]
    pub fn new(
        correlation_id: impl Into<String>,
        name: impl Into<String>,
        token: impl Into<String>,
        recipient: impl Into<String>,
        amount: U256,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            name: name.into(),
            token: token.into(),
            recipient: recipient.into(),
            amount,
            high_risk: false,
            batch: None,
            arguments: BTreeMap::new(),
        }
    }

    /// Sets the high-risk classification flag.
    #[must_use]
    pub const fn with_high_risk(mut self, high_risk: bool) -> Self {
        self.high_risk = high_risk;
        self
    }

    /// Attaches batch metadata for a multi-recipient operation.
    #[must_use]
    pub const fn with_batch(mut self, batch: BatchInfo) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Records a caller-supplied argument for the audit trail.
    #[must_use]
    pub fn with_argument(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    /// Returns the amount this operation actually spends.
    ///
    /// For batch operations the batch total replaces the per-recipient
    /// amount in every spending check.
    #[must_use]
    pub fn effective_amount(&self) -> U256 {
        self.batch.as_ref().map_or(self.amount, |b| b.total)
    }

    /// Returns `true` if this is a batch (multi-recipient) operation.
    #[must_use]
    pub const fn is_batch(&self) -> bool {
        self.batch.is_some()
    }
}

/// Batch metadata for a multi-recipient operation.
///
/// Spending checks use [`total`](Self::total) in place of the descriptor's
/// per-recipient amount, and the recipient count is gated by the optional
/// batch-size cap in the spending configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    /// Total amount across all recipients, in the token's smallest unit.
    pub total: U256,

    /// Number of recipients in the batch.
    pub recipients: u32,
}

impl BatchInfo {
    /// Creates batch metadata from a total amount and recipient count.
    #[must_use]
    pub const fn new(total: U256, recipients: u32) -> Self {
        Self { total, recipients }
    }
}

/// Confirmed result of an executed operation, handed to `commit`.
///
/// Built by the request layer once the external system reports success.
/// Carries the original request (the gate re-derives the spending and
/// quota keys from it) plus execution metadata for the audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// The request that was previously authorized.
    pub request: OperationRequest,

    /// External reference for the completed operation (e.g. a transaction
    /// identifier), if one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,

    /// Wall-clock duration of the external execution, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl OperationOutcome {
    /// Creates an outcome for a confirmed operation.
    #[must_use]
    pub const fn new(request: OperationRequest) -> Self {
        Self {
            request,
            external_reference: None,
            duration_ms: None,
        }
    }

    /// Attaches the external reference (e.g. transaction identifier).
    #[must_use]
    pub fn with_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    /// Attaches the execution duration in milliseconds.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Classification of rate-limited request classes.
///
/// The category set is fixed: one global per-process quota, a narrower
/// quota for operations flagged high-risk, and a per-destination quota
/// keyed by recipient address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateCategory {
    /// Global per-process quota; every operation consumes it.
    Global,

    /// Narrower quota consumed only by operations flagged high-risk.
    HighRisk,

    /// Per-destination quota keyed by normalized recipient address.
    Destination,
}

impl RateCategory {
    /// Stable string form used in error payloads and audit records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::HighRisk => "high-risk",
            Self::Destination => "destination",
        }
    }
}

impl fmt::Display for RateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The spending dimension a limit check reports when it fails.
///
/// Checks run in the order the variants are declared; the first violated
/// dimension is reported and the remaining checks are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitDimension {
    /// Number of recipients in a single batch operation.
    BatchRecipients,

    /// Amount of a single operation (batch total for batches).
    PerOperation,

    /// Cumulative amount for one token within the accounting period.
    TokenPeriod,

    /// Cumulative amount across all tokens within the accounting period.
    AggregatePeriod,
}

impl LimitDimension {
    /// Stable string form used in error payloads and audit records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BatchRecipients => "batch-recipients",
            Self::PerOperation => "per-operation",
            Self::TokenPeriod => "token-period",
            Self::AggregatePeriod => "aggregate-period",
        }
    }
}

impl fmt::Display for LimitDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
