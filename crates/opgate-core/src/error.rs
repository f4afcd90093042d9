//! Error types for the `OpGate` policy gateway.
//!
//! This module provides the error taxonomy for every failure mode the gate
//! can report to the surrounding request layer:
//!
//! - [`GateError`] - Authorization failures and engine faults
//! - [`ConfigError`] - Configuration validation failures
//! - [`GateErrorCode`] - Wire-level error codes for RPC-style callers
//! - [`ErrorPayload`] - The structured error shape surfaced at the boundary
//!
//! Every rejection carries enough structured detail (which dimension, the
//! current remaining allowance or reset time) to be rendered as an
//! actionable message without the caller needing internal state.
//!
//! # Example
//!
//! ```rust
//! use opgate_core::error::GateError;
//! use std::time::Duration;
//! use opgate_core::types::RateCategory;
//!
//! let err = GateError::RateLimitExceeded {
//!     category: RateCategory::Global,
//!     retry_after: Duration::from_secs(12),
//! };
//!
//! // Only quota rejections are recoverable by waiting.
//! assert!(err.is_recoverable());
//! assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
//! ```

use crate::types::{LimitDimension, RateCategory};
use alloy_primitives::U256;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Authorization failures and engine faults reported by the gate.
///
/// All variants abort the governed operation before it reaches the
/// external system. None are retried automatically by the gate; retry, if
/// any, is the caller's decision, informed by
/// [`is_recoverable`](Self::is_recoverable) and
/// [`retry_after`](Self::retry_after).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// A spending cap was exceeded.
    #[error("{dimension} limit exceeded: attempted {attempted}, limit {limit}, remaining {remaining}")]
    LimitExceeded {
        /// The first violated spending dimension.
        dimension: LimitDimension,
        /// The configured cap for that dimension.
        limit: U256,
        /// The amount the operation would have brought the dimension to.
        attempted: U256,
        /// Allowance remaining before this operation.
        remaining: U256,
    },

    /// A request-rate quota was exhausted.
    ///
    /// Recoverable: the caller may retry once `retry_after` has elapsed.
    #[error("rate limit exceeded for {category} requests: retry after {}s", retry_after.as_secs())]
    RateLimitExceeded {
        /// The exhausted quota category.
        category: RateCategory,
        /// Time until the current window resets.
        retry_after: Duration,
    },

    /// The destination address was rejected by the address policy.
    ///
    /// Not recoverable without an out-of-band policy change.
    #[error("recipient address rejected: {reason}")]
    AddressRejected {
        /// The normalized address that was rejected.
        address: String,
        /// Why the policy rejected it.
        reason: String,
    },

    /// The input could not be parsed or normalized (e.g. malformed address).
    ///
    /// Reported distinctly from a policy denial: a malformed address is
    /// never silently treated as "denied".
    #[error("malformed input: {context}")]
    MalformedInput {
        /// What was malformed.
        context: String,
    },

    /// An unexpected engine fault.
    #[error("internal policy engine error: {context}")]
    Internal {
        /// What went wrong.
        context: String,
    },
}

impl GateError {
    /// Create a `MalformedInput` error with context.
    #[must_use]
    pub fn malformed_input(context: impl Into<String>) -> Self {
        Self::MalformedInput {
            context: context.into(),
        }
    }

    /// Create an `Internal` error with context.
    #[must_use]
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    /// Create an `AddressRejected` error.
    #[must_use]
    pub fn address_rejected(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AddressRejected {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the caller can recover by waiting and retrying.
    ///
    /// Only quota rejections are recoverable; spending and address
    /// rejections require an out-of-band configuration change.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// Returns how long the caller should wait before retrying, if the
    /// failure is recoverable at all.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Returns the wire-level error code for this failure.
    #[must_use]
    pub const fn code(&self) -> GateErrorCode {
        match self {
            Self::LimitExceeded { .. } => GateErrorCode::LimitExceeded,
            Self::RateLimitExceeded { .. } => GateErrorCode::RateLimited,
            Self::AddressRejected { .. } => GateErrorCode::AddressRejected,
            Self::MalformedInput { .. } => GateErrorCode::InvalidParams,
            Self::Internal { .. } => GateErrorCode::InternalError,
        }
    }

    /// Builds the structured error payload surfaced to callers.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        let details = match self {
            Self::LimitExceeded {
                dimension,
                limit,
                attempted,
                remaining,
            } => serde_json::json!({
                "dimension": dimension.as_str(),
                "limit": limit.to_string(),
                "attempted": attempted.to_string(),
                "remaining": remaining.to_string(),
            }),
            Self::RateLimitExceeded {
                category,
                retry_after,
            } => serde_json::json!({
                "category": category.as_str(),
                "retry_after_ms": u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            }),
            Self::AddressRejected { address, reason } => serde_json::json!({
                "address": address,
                "reason": reason,
            }),
            Self::MalformedInput { context } | Self::Internal { context } => {
                serde_json::json!({ "context": context })
            }
        };

        ErrorPayload {
            code: self.code().code(),
            message: self.to_string(),
            details,
            recoverable: self.is_recoverable(),
            retry_after_ms: self
                .retry_after()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Wire-level error codes for RPC-style callers.
///
/// Standard JSON-RPC codes are used for input and internal faults;
/// gate-specific rejections use the application range (-32000 to -32099).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum GateErrorCode {
    /// Invalid method parameter(s), including unparseable addresses.
    InvalidParams = -32602,
    /// Internal engine error.
    InternalError = -32603,

    // Application-specific codes (-32000 to -32099)
    /// A spending cap was exceeded.
    LimitExceeded = -32001,
    /// A request-rate quota was exhausted.
    RateLimited = -32002,
    /// The destination address was rejected by policy.
    AddressRejected = -32003,
}

impl GateErrorCode {
    /// Get the numeric error code value.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Get a human-readable message for this error code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::LimitExceeded => "Spending limit exceeded",
            Self::RateLimited => "Rate limit exceeded",
            Self::AddressRejected => "Address rejected",
        }
    }
}

impl fmt::Display for GateErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl From<&GateError> for GateErrorCode {
    fn from(error: &GateError) -> Self {
        error.code()
    }
}

/// The structured error shape surfaced at the gateway boundary.
///
/// `recoverable` is `true` only for rate-limit rejections, in which case
/// `retry_after_ms` carries the wait until the window resets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    /// Wire-level error code (see [`GateErrorCode`]).
    pub code: i32,

    /// Human-readable one-line message.
    pub message: String,

    /// Structured, variant-specific detail (dimension, limits, reset time).
    pub details: serde_json::Value,

    /// Whether the caller can recover by waiting and retrying.
    pub recoverable: bool,

    /// Milliseconds until retry is worthwhile, for recoverable failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Configuration validation failures.
///
/// Raised at construction time, before any operation is gated; a gate is
/// never built from an invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The configuration is structurally invalid.
    #[error("invalid configuration: {context}")]
    InvalidConfiguration {
        /// What was invalid.
        context: String,
    },

    /// A configured address entry could not be normalized.
    #[error("invalid address in configuration: {address}")]
    InvalidAddress {
        /// The malformed entry.
        address: String,
    },

    /// An address appears in both the allow and deny lists.
    #[error("address present in both allow and deny lists: {address}")]
    ConflictingEntry {
        /// The conflicting entry.
        address: String,
    },
}

impl ConfigError {
    /// Create an `InvalidConfiguration` error with context.
    #[must_use]
    pub fn invalid_configuration(context: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            context: context.into(),
        }
    }

    /// Create an `InvalidAddress` error.
    #[must_use]
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }
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

    #[test]
    fn test_limit_exceeded_display_carries_all_fields() {
        let err = GateError::LimitExceeded {
            dimension: LimitDimension::TokenPeriod,
            limit: U256::from(1000u64),
            attempted: U256::from(1050u64),
            remaining: U256::from(50u64),
        };

        let msg = err.to_string();
        assert!(msg.contains("token-period"));
        assert!(msg.contains("1050"));
        assert!(msg.contains("1000"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_only_rate_limit_is_recoverable() {
        let rate = GateError::RateLimitExceeded {
            category: RateCategory::Destination,
            retry_after: Duration::from_secs(30),
        };
        assert!(rate.is_recoverable());
        assert_eq!(rate.retry_after(), Some(Duration::from_secs(30)));

        let limit = GateError::LimitExceeded {
            dimension: LimitDimension::PerOperation,
            limit: U256::from(10u64),
            attempted: U256::from(20u64),
            remaining: U256::from(10u64),
        };
        assert!(!limit.is_recoverable());
        assert!(limit.retry_after().is_none());

        let addr = GateError::address_rejected("0xbad", "deny-listed");
        assert!(!addr.is_recoverable());

        let malformed = GateError::malformed_input("no 0x prefix");
        assert!(!malformed.is_recoverable());

        let internal = GateError::internal("lock poisoned");
        assert!(!internal.is_recoverable());
    }

    #[test]
    fn test_error_code_mapping() {
        let err = GateError::LimitExceeded {
            dimension: LimitDimension::AggregatePeriod,
            limit: U256::ZERO,
            attempted: U256::from(1u64),
            remaining: U256::ZERO,
        };
        assert_eq!(err.code(), GateErrorCode::LimitExceeded);
        assert_eq!(err.code().code(), -32001);

        let rate = GateError::RateLimitExceeded {
            category: RateCategory::Global,
            retry_after: Duration::ZERO,
        };
        assert_eq!(rate.code(), GateErrorCode::RateLimited);

        assert_eq!(
            GateError::address_rejected("0xbad", "x").code(),
            GateErrorCode::AddressRejected
        );
        assert_eq!(
            GateError::malformed_input("x").code(),
            GateErrorCode::InvalidParams
        );
        assert_eq!(
            GateError::internal("x").code(),
            GateErrorCode::InternalError
        );

        // From<&GateError> agrees with code()
        assert_eq!(GateErrorCode::from(&rate), GateErrorCode::RateLimited);
    }

    #[test]
    fn test_payload_for_spending_rejection() {
        let err = GateError::LimitExceeded {
            dimension: LimitDimension::TokenPeriod,
            limit: U256::from(1000u64),
            attempted: U256::from(1050u64),
            remaining: U256::from(50u64),
        };

        let payload = err.to_payload();
        assert_eq!(payload.code, -32001);
        assert!(!payload.recoverable);
        assert!(payload.retry_after_ms.is_none());
        assert_eq!(payload.details["dimension"], "token-period");
        assert_eq!(payload.details["limit"], "1000");
        assert_eq!(payload.details["attempted"], "1050");
        assert_eq!(payload.details["remaining"], "50");
    }

    #[test]
    fn test_payload_for_rate_rejection_is_recoverable() {
        let err = GateError::RateLimitExceeded {
            category: RateCategory::HighRisk,
            retry_after: Duration::from_millis(2500),
        };

        let payload = err.to_payload();
        assert_eq!(payload.code, -32002);
        assert!(payload.recoverable);
        assert_eq!(payload.retry_after_ms, Some(2500));
        assert_eq!(payload.details["category"], "high-risk");

        // The payload serializes with the retry hint inline.
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["retry_after_ms"], 2500);
    }

    #[test]
    fn test_payload_omits_retry_hint_when_absent() {
        let payload = GateError::malformed_input("bad hex").to_payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("retry_after_ms").is_none());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            GateErrorCode::RateLimited.to_string(),
            "Rate limit exceeded (-32002)"
        );
    }

    #[test]
    fn test_config_error_constructors() {
        let err = ConfigError::invalid_configuration("period_secs must be non-zero");
        assert!(err.to_string().contains("period_secs"));

        let err = ConfigError::invalid_address("0zZZ");
        assert!(err.to_string().contains("0zZZ"));

        let err = ConfigError::ConflictingEntry {
            address: "0xaaa".to_string(),
        };
        assert!(err.to_string().contains("both allow and deny"));
    }
}
