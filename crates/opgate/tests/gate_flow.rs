//! End-to-end flows through the policy gate.
//!
//! These tests drive the gate exactly as the surrounding request layer
//! would: build a descriptor, authorize, execute (simulated), then
//! commit or report the failure — and inspect the audit trail and error
//! payloads that callers see.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::unreadable_literal
)]

use alloy_primitives::U256;
use opgate::logging::new_correlation_id;
use opgate::{AuditLog, AuditOutcome, AuditSink, GateError, PolicyGate};
use opgate_core::config::{
    AddressPolicyConfig, AddressPolicyMode, AuditConfig, GateConfig, RateConfig, RateRule,
    SpendingConfig,
};
use opgate_core::types::{LimitDimension, OperationOutcome, OperationRequest, RateCategory};
use std::sync::Arc;

const DEST: &str = "0x00000000000000000000000000000000000000aa";

fn transfer(correlation_id: &str, amount: u64) -> OperationRequest {
    OperationRequest::new(correlation_id, "transfer", "ETH", DEST, U256::from(amount))
}

#[test]
fn daily_cap_rejection_carries_actionable_detail() {
    // Cap 1000 per period with 950 already committed: a 100 transfer is
    // rejected with the full structured detail a caller needs.
    let config = GateConfig {
        spending: SpendingConfig::default().with_period_cap("ETH", U256::from(1000u64)),
        ..GateConfig::default()
    };
    let gate = PolicyGate::new(&config).unwrap();

    let first = transfer("seed", 950);
    gate.authorize(&first).unwrap();
    gate.commit(&OperationOutcome::new(first)).unwrap();

    let err = gate.authorize(&transfer("over", 100)).unwrap_err();
    let payload = err.to_payload();
    assert!(!payload.recoverable);
    assert_eq!(payload.details["dimension"], "token-period");
    assert_eq!(payload.details["limit"], "1000");
    assert_eq!(payload.details["attempted"], "1050");
    assert_eq!(payload.details["remaining"], "50");
}

#[test]
fn fourth_request_in_window_is_rate_limited() {
    // Capacity 3 per 60s: three committed operations pass, the fourth is
    // rejected with a retry hint inside the window.
    let config = GateConfig {
        rate: RateConfig::default().with_global(RateRule::new(3, 60)),
        ..GateConfig::default()
    };
    let gate = PolicyGate::new(&config).unwrap();

    for i in 0..3 {
        let op = transfer(&format!("ok-{i}"), 10);
        gate.authorize(&op).unwrap();
        gate.commit(&OperationOutcome::new(op)).unwrap();
    }

    let err = gate.authorize(&transfer("limited", 10)).unwrap_err();
    let GateError::RateLimitExceeded {
        category,
        retry_after,
    } = &err
    else {
        panic!("expected RateLimitExceeded, got {err}");
    };
    assert_eq!(*category, RateCategory::Global);
    assert!(retry_after.as_secs() <= 60);

    let payload = err.to_payload();
    assert!(payload.recoverable);
    assert!(payload.retry_after_ms.is_some());
}

#[test]
fn deny_list_matches_case_insensitively() {
    let config = GateConfig {
        address: AddressPolicyConfig::default()
            .with_mode(AddressPolicyMode::DenyList)
            .with_deny(vec!["0xBAD".to_string()])
            .with_deny_reason("0xBAD", "known drainer"),
        ..GateConfig::default()
    };
    let gate = PolicyGate::new(&config).unwrap();

    let check = gate.preview_address("0xbad").unwrap();
    assert!(!check.allowed);
    assert_eq!(check.reason.as_deref(), Some("known drainer"));

    let op = OperationRequest::new("deny-1", "transfer", "ETH", "0xbad", U256::from(1u64));
    let err = gate.authorize(&op).unwrap_err();
    let GateError::AddressRejected { address, reason } = err else {
        panic!("expected AddressRejected");
    };
    assert_eq!(address, "0xbad");
    assert_eq!(reason, "known drainer");
}

#[test]
fn allow_only_mode_blocks_everything_not_listed() {
    let config = GateConfig {
        address: AddressPolicyConfig::default()
            .with_mode(AddressPolicyMode::AllowOnly)
            .with_allow(vec![DEST.to_string()]),
        ..GateConfig::default()
    };
    let gate = PolicyGate::new(&config).unwrap();

    assert!(gate.authorize(&transfer("listed", 5)).is_ok());

    let other = OperationRequest::new("unlisted", "transfer", "ETH", "0xcafe", U256::from(5u64));
    assert!(matches!(
        gate.authorize(&other).unwrap_err(),
        GateError::AddressRejected { .. }
    ));
}

#[test]
fn correlation_history_tells_the_full_story() {
    let config = GateConfig {
        spending: SpendingConfig::default().with_per_operation_cap("ETH", U256::from(100u64)),
        ..GateConfig::default()
    };
    let gate = PolicyGate::new(&config).unwrap();
    let correlation_id = new_correlation_id();

    // Attempt 1: rejected outright.
    let oversized = transfer(&correlation_id, 500);
    assert!(gate.authorize(&oversized).is_err());

    // Attempt 2 (same logical operation, retried smaller): authorized,
    // but execution fails externally.
    let retried = transfer(&correlation_id, 80);
    gate.authorize(&retried).unwrap();
    gate.record_execution_failure(&retried, "nonce too low", Some(1200));

    // Attempt 3: authorized and confirmed.
    let succeeded = transfer(&correlation_id, 80);
    gate.authorize(&succeeded).unwrap();
    gate.commit(
        &OperationOutcome::new(succeeded)
            .with_external_reference("0xfinal")
            .with_duration_ms(900),
    )
    .unwrap();

    let history = gate.by_correlation_id(&correlation_id);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].outcome, AuditOutcome::Rejected);
    assert_eq!(history[1].outcome, AuditOutcome::ExecutionFailed);
    assert_eq!(history[2].outcome, AuditOutcome::Accepted);
    assert_eq!(history[2].external_reference.as_deref(), Some("0xfinal"));

    // Records are in append order, and seq confirms it.
    assert!(history[0].seq < history[1].seq);
    assert!(history[1].seq < history[2].seq);
}

#[test]
fn recent_reflects_completion_order_across_operations() {
    let gate = PolicyGate::new(&GateConfig::default()).unwrap();

    for name in ["first", "second", "third"] {
        let op = transfer(name, 1);
        gate.authorize(&op).unwrap();
        gate.commit(&OperationOutcome::new(op)).unwrap();
    }

    let recent = gate.recent(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].correlation_id, "third");
    assert_eq!(recent[1].correlation_id, "second");
}

#[test]
fn retention_bound_applies_to_gate_trail() {
    let config = GateConfig {
        audit: AuditConfig::default().with_max_records(2),
        ..GateConfig::default()
    };
    let gate = PolicyGate::new(&config).unwrap();

    for i in 0..4 {
        let op = transfer(&format!("op-{i}"), 1);
        gate.authorize(&op).unwrap();
        gate.commit(&OperationOutcome::new(op)).unwrap();
    }

    assert_eq!(gate.recent(10).len(), 2);
    assert!(gate.by_correlation_id("op-0").is_empty());
    assert_eq!(gate.by_correlation_id("op-3").len(), 1);
}

#[test]
fn sink_backed_gate_persists_a_verifiable_chain() {
    let dir = tempfile::tempdir().unwrap();
    let key = [0x07u8; 32];
    let sink = AuditSink::new(dir.path(), &key).unwrap();
    let audit = Arc::new(AuditLog::with_sink(100, sink));

    let gate = PolicyGate::with_audit_log(&GateConfig::default(), audit).unwrap();

    for i in 0..5 {
        let op = transfer(&format!("persisted-{i}"), 10);
        gate.authorize(&op).unwrap();
        gate.commit(&OperationOutcome::new(op)).unwrap();
    }

    // A fresh sink over the same directory verifies the chain written
    // through the gate.
    let verifier = AuditSink::new(dir.path(), &key).unwrap();
    let result = verifier.verify_chain().unwrap();
    assert!(result.valid);
    assert_eq!(result.records_checked, 5);
}

#[test]
fn aggregate_cap_spans_tokens_end_to_end() {
    let config = GateConfig {
        spending: SpendingConfig::default().with_aggregate_period_cap(U256::from(100u64)),
        ..GateConfig::default()
    };
    let gate = PolicyGate::new(&config).unwrap();

    let eth = OperationRequest::new("agg-1", "transfer", "ETH", DEST, U256::from(60u64));
    gate.authorize(&eth).unwrap();
    gate.commit(&OperationOutcome::new(eth)).unwrap();

    let usdc = OperationRequest::new("agg-2", "swap", "USDC", DEST, U256::from(50u64));
    let err = gate.authorize(&usdc).unwrap_err();
    assert!(matches!(
        err,
        GateError::LimitExceeded {
            dimension: LimitDimension::AggregatePeriod,
            ..
        }
    ));

    let headroom = gate.spending_headroom("USDC");
    assert_eq!(headroom.aggregate_remaining, Some(U256::from(40u64)));
    assert_eq!(headroom.token_remaining, None);
}
