//! # opgate-core
//!
//! Core types, errors, and configuration for the `OpGate` policy gateway.
//!
//! `OpGate` gates financially-sensitive operations issued by an automated
//! agent against a layered policy: spending caps, address allow/deny
//! rules, request-rate quotas, and an immutable audit trail. This crate
//! provides the vocabulary shared across all `OpGate` crates:
//!
//! ## Modules
//!
//! - [`types`] - Operation descriptors and policy dimensions
//!   ([`OperationRequest`], [`RateCategory`], [`LimitDimension`])
//! - [`error`] - The error taxonomy and boundary payload
//!   ([`GateError`], [`ErrorPayload`])
//! - [`config`] - The immutable configuration object ([`GateConfig`])
//!
//! ## Error Handling
//!
//! ```rust
//! use opgate_core::{GateError, LimitDimension, U256};
//!
//! let err = GateError::LimitExceeded {
//!     dimension: LimitDimension::TokenPeriod,
//!     limit: U256::from(1000u64),
//!     attempted: U256::from(1050u64),
//!     remaining: U256::from(50u64),
//! };
//!
//! // The boundary payload carries everything a caller needs to render
//! // an actionable message.
//! let payload = err.to_payload();
//! assert!(!payload.recoverable);
//! assert_eq!(payload.details["dimension"], "token-period");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AddressPolicyConfig, AddressPolicyMode, AuditConfig, GateConfig, RateConfig, RateRule,
    SpendingConfig,
};
pub use error::{ConfigError, ErrorPayload, GateError, GateErrorCode};
pub use types::{BatchInfo, LimitDimension, OperationOutcome, OperationRequest, RateCategory};

/// Re-export of the amount type used throughout `OpGate`.
pub use alloy_primitives::U256;
