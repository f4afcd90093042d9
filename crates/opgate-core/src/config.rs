//! Configuration types for the `OpGate` policy gateway.
//!
//! The gate consumes a single immutable [`GateConfig`] at construction
//! time. The config is a plain `serde` struct so the surrounding layer can
//! load it from TOML (or build it programmatically with the `with_*`
//! helpers); loading and file discovery are the caller's job, not this
//! crate's.
//!
//! # Examples
//!
//! ```
//! use opgate_core::config::{GateConfig, AddressPolicyMode};
//! use alloy_primitives::U256;
//!
//! let config = GateConfig {
//!     spending: GateConfig::default().spending
//!         .with_per_operation_cap("ETH", U256::from(5_000_000_000_000_000_000u64))
//!         .with_period_cap("ETH", U256::from(10_000_000_000_000_000_000u64)),
//!     address: GateConfig::default().address
//!         .with_mode(AddressPolicyMode::DenyList)
//!         .with_deny(vec!["0xBAD".to_string()]),
//!     ..GateConfig::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::error::ConfigError;
use crate::types::RateCategory;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Top-level configuration for the `OpGate` policy gateway.
///
/// Contains one section per policy engine plus the audit retention bound.
/// The struct is immutable once handed to the gate; runtime policy changes
/// require constructing a new gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateConfig {
    /// Spending caps and accounting-period length.
    #[serde(default)]
    pub spending: SpendingConfig,

    /// Request-rate quotas per category.
    #[serde(default)]
    pub rate: RateConfig,

    /// Destination address policy.
    #[serde(default)]
    pub address: AddressPolicyConfig,

    /// Audit trail retention.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl GateConfig {
    /// Creates a configuration with every engine at its defaults
    /// (no spending caps, default quotas, address policy disabled).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any section is structurally invalid,
    /// e.g. a zero period length or an address present in both the allow
    /// and deny lists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.spending.validate()?;
        self.rate.validate()?;
        self.address.validate()?;
        self.audit.validate()
    }
}

/// Returns the default accounting-period length: one UTC day.
#[must_use]
const fn default_period_secs() -> u64 {
    86_400
}

/// Spending caps and accounting-period length.
///
/// Caps are keyed by token symbol or contract address, in the token's
/// smallest unit. A missing cap means the dimension is unbounded for that
/// token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpendingConfig {
    /// Per-token cap on a single operation's amount.
    #[serde(default)]
    pub per_operation_caps: HashMap<String, U256>,

    /// Per-token cap on cumulative spending within one period.
    #[serde(default)]
    pub period_caps: HashMap<String, U256>,

    /// Cap on cumulative spending across all tokens within one period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_period_cap: Option<U256>,

    /// Length of the accounting period in seconds.
    ///
    /// Default: 86 400 (one UTC day). Periods are aligned to the unix
    /// epoch, so the default produces calendar-day windows.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Maximum recipients allowed in a single batch operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch_recipients: Option<u32>,
}

impl Default for SpendingConfig {
    fn default() -> Self {
        Self {
            per_operation_caps: HashMap::new(),
            period_caps: HashMap::new(),
            aggregate_period_cap: None,
            period_secs: default_period_secs(),
            max_batch_recipients: None,
        }
    }
}

impl SpendingConfig {
    /// Sets the per-operation cap for a token.
    #[must_use]
    pub fn with_per_operation_cap(mut self, token: impl Into<String>, cap: U256) -> Self {
        self.per_operation_caps.insert(token.into(), cap);
        self
    }

    /// Sets the period cap for a token.
    #[must_use]
    pub fn with_period_cap(mut self, token: impl Into<String>, cap: U256) -> Self {
        self.period_caps.insert(token.into(), cap);
        self
    }

    /// Sets the aggregate cross-token period cap.
    #[must_use]
    pub const fn with_aggregate_period_cap(mut self, cap: U256) -> Self {
        self.aggregate_period_cap = Some(cap);
        self
    }

    /// Sets the accounting-period length in seconds.
    #[must_use]
    pub const fn with_period_secs(mut self, period_secs: u64) -> Self {
        self.period_secs = period_secs;
        self
    }

    /// Caps the number of recipients in a single batch.
    #[must_use]
    pub const fn with_max_batch_recipients(mut self, max: u32) -> Self {
        self.max_batch_recipients = Some(max);
        self
    }

    /// Validates the section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfiguration`] if the period length
    /// is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_secs == 0 {
            return Err(ConfigError::invalid_configuration(
                "spending.period_secs must be non-zero",
            ));
        }
        Ok(())
    }
}

/// One request-rate quota: `capacity` accepted operations per fixed window
/// of `window_secs`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateRule {
    /// Accepted operations allowed per window.
    pub capacity: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateRule {
    /// Creates a rule from a capacity and window length.
    #[must_use]
    pub const fn new(capacity: u32, window_secs: u64) -> Self {
        Self {
            capacity,
            window_secs,
        }
    }
}

/// Returns the default global quota: 60 operations per minute.
#[must_use]
const fn default_global_rule() -> RateRule {
    RateRule::new(60, 60)
}

/// Returns the default high-risk quota: 10 operations per minute.
#[must_use]
const fn default_high_risk_rule() -> RateRule {
    RateRule::new(10, 60)
}

/// Returns the default per-destination quota: 10 operations per hour.
#[must_use]
const fn default_per_destination_rule() -> RateRule {
    RateRule::new(10, 3_600)
}

/// Request-rate quotas for the fixed category set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateConfig {
    /// Global per-process quota; every operation consumes it.
    #[serde(default = "default_global_rule")]
    pub global: RateRule,

    /// Narrower quota for operations flagged high-risk.
    #[serde(default = "default_high_risk_rule")]
    pub high_risk: RateRule,

    /// Per-destination quota, keyed by normalized recipient address.
    #[serde(default = "default_per_destination_rule")]
    pub per_destination: RateRule,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            global: default_global_rule(),
            high_risk: default_high_risk_rule(),
            per_destination: default_per_destination_rule(),
        }
    }
}

impl RateConfig {
    /// Replaces the global quota.
    #[must_use]
    pub const fn with_global(mut self, rule: RateRule) -> Self {
        self.global = rule;
        self
    }

    /// Replaces the high-risk quota.
    #[must_use]
    pub const fn with_high_risk(mut self, rule: RateRule) -> Self {
        self.high_risk = rule;
        self
    }

    /// Replaces the per-destination quota.
    #[must_use]
    pub const fn with_per_destination(mut self, rule: RateRule) -> Self {
        self.per_destination = rule;
        self
    }

    /// Returns the rule governing a category.
    #[must_use]
    pub const fn rule(&self, category: RateCategory) -> RateRule {
        match category {
            RateCategory::Global => self.global,
            RateCategory::HighRisk => self.high_risk,
            RateCategory::Destination => self.per_destination,
        }
    }

    /// Validates the section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfiguration`] if any window length
    /// is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, rule) in [
            ("global", self.global),
            ("high_risk", self.high_risk),
            ("per_destination", self.per_destination),
        ] {
            if rule.window_secs == 0 {
                return Err(ConfigError::invalid_configuration(format!(
                    "rate.{name}.window_secs must be non-zero"
                )));
            }
        }
        Ok(())
    }
}

/// Evaluation mode of the destination address policy.
///
/// The mode is fixed at configuration time; the gate never switches modes
/// at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressPolicyMode {
    /// Default deny: only explicitly allowed addresses pass.
    AllowOnly,

    /// Default allow: only explicitly denied addresses are blocked.
    DenyList,

    /// Every address passes.
    #[default]
    Disabled,
}

impl AddressPolicyMode {
    /// Stable string form used in logs and denial reasons.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllowOnly => "allow-only",
            Self::DenyList => "deny-list",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AddressPolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination address policy configuration.
///
/// Address comparisons are case-insensitive; entries are normalized at
/// engine construction. An address must not appear in both lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressPolicyConfig {
    /// Evaluation mode.
    #[serde(default)]
    pub mode: AddressPolicyMode,

    /// Addresses allowed in `allow-only` mode.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Addresses blocked in `deny-list` mode.
    #[serde(default)]
    pub deny: Vec<String>,

    /// Optional human-readable reason per denied address.
    ///
    /// Keyed by the address as written in `deny` (comparison is
    /// case-insensitive).
    #[serde(default)]
    pub deny_reasons: HashMap<String, String>,
}

impl AddressPolicyConfig {
    /// Sets the evaluation mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: AddressPolicyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replaces the allow list.
    #[must_use]
    pub fn with_allow(mut self, allow: Vec<String>) -> Self {
        self.allow = allow;
        self
    }

    /// Replaces the deny list.
    #[must_use]
    pub fn with_deny(mut self, deny: Vec<String>) -> Self {
        self.deny = deny;
        self
    }

    /// Attaches a reason to a denied address.
    #[must_use]
    pub fn with_deny_reason(
        mut self,
        address: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.deny_reasons.insert(address.into(), reason.into());
        self
    }

    /// Validates the section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConflictingEntry`] if an address appears in
    /// both lists (case-insensitive comparison).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for allowed in &self.allow {
            for denied in &self.deny {
                if allowed.eq_ignore_ascii_case(denied) {
                    return Err(ConfigError::ConflictingEntry {
                        address: allowed.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Returns the default audit retention bound.
#[must_use]
const fn default_max_records() -> usize {
    1_000
}

/// Audit trail retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditConfig {
    /// Maximum records retained in memory; the oldest are evicted first
    /// once the bound is exceeded.
    ///
    /// Default: 1000.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

impl AuditConfig {
    /// Sets the retention bound.
    #[must_use]
    pub const fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Validates the section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfiguration`] if the retention
    /// bound is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_records == 0 {
            return Err(ConfigError::invalid_configuration(
                "audit.max_records must be non-zero",
            ));
        }
        Ok(())
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
    fn test_default_config_is_valid() {
        let config = GateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.spending.period_secs, 86_400);
        assert_eq!(config.audit.max_records, 1_000);
        assert_eq!(config.address.mode, AddressPolicyMode::Disabled);
    }

    #[test]
    fn test_spending_builders() {
        let spending = SpendingConfig::default()
            .with_per_operation_cap("ETH", U256::from(100u64))
            .with_period_cap("ETH", U256::from(1000u64))
            .with_aggregate_period_cap(U256::from(5000u64))
            .with_period_secs(3600)
            .with_max_batch_recipients(16);

        assert_eq!(spending.per_operation_caps["ETH"], U256::from(100u64));
        assert_eq!(spending.period_caps["ETH"], U256::from(1000u64));
        assert_eq!(spending.aggregate_period_cap, Some(U256::from(5000u64)));
        assert_eq!(spending.period_secs, 3600);
        assert_eq!(spending.max_batch_recipients, Some(16));
    }

    #[test]
    fn test_zero_period_rejected() {
        let spending = SpendingConfig::default().with_period_secs(0);
        assert!(matches!(
            spending.validate(),
            Err(ConfigError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_rate_rule_lookup_by_category() {
        let rate = RateConfig::default()
            .with_global(RateRule::new(100, 60))
            .with_high_risk(RateRule::new(5, 60))
            .with_per_destination(RateRule::new(3, 600));

        assert_eq!(rate.rule(RateCategory::Global).capacity, 100);
        assert_eq!(rate.rule(RateCategory::HighRisk).capacity, 5);
        assert_eq!(rate.rule(RateCategory::Destination).window_secs, 600);
    }

    #[test]
    fn test_zero_rate_window_rejected() {
        let rate = RateConfig::default().with_high_risk(RateRule::new(10, 0));
        let err = rate.validate().unwrap_err();
        assert!(err.to_string().contains("high_risk"));
    }

    #[test]
    fn test_address_conflict_is_case_insensitive() {
        let address = AddressPolicyConfig::default()
            .with_allow(vec!["0xAAA".to_string()])
            .with_deny(vec!["0xaaa".to_string()]);

        assert!(matches!(
            address.validate(),
            Err(ConfigError::ConflictingEntry { .. })
        ));
    }

    #[test]
    fn test_disjoint_address_lists_are_valid() {
        let address = AddressPolicyConfig::default()
            .with_mode(AddressPolicyMode::AllowOnly)
            .with_allow(vec!["0xAAA".to_string()])
            .with_deny(vec!["0xBBB".to_string()])
            .with_deny_reason("0xBBB", "sanctioned");

        assert!(address.validate().is_ok());
        assert_eq!(address.deny_reasons["0xBBB"], "sanctioned");
    }

    #[test]
    fn test_zero_audit_retention_rejected() {
        let audit = AuditConfig::default().with_max_records(0);
        assert!(audit.validate().is_err());
    }

    #[test]
    fn test_mode_strings() {
        assert_eq!(AddressPolicyMode::AllowOnly.to_string(), "allow-only");
        assert_eq!(AddressPolicyMode::DenyList.to_string(), "deny-list");
        assert_eq!(AddressPolicyMode::Disabled.to_string(), "disabled");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = GateConfig {
            spending: SpendingConfig::default()
                .with_per_operation_cap("ETH", U256::from(5u64))
                .with_period_cap("ETH", U256::from(50u64))
                .with_aggregate_period_cap(U256::from(100u64)),
            rate: RateConfig::default().with_global(RateRule::new(30, 60)),
            address: AddressPolicyConfig::default()
                .with_mode(AddressPolicyMode::DenyList)
                .with_deny(vec!["0xBAD".to_string()]),
            audit: AuditConfig::default().with_max_records(64),
        };

        let toml_str = toml::to_string(&config).unwrap();
        let back: GateConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_toml_partial_file_uses_defaults() {
        let toml_str = r#"
            [rate.global]
            capacity = 5
            window_secs = 10

            [address]
            mode = "allow-only"
            allow = ["0xAAA"]
        "#;

        let config: GateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rate.global.capacity, 5);
        assert_eq!(config.rate.high_risk, default_high_risk_rule());
        assert_eq!(config.address.mode, AddressPolicyMode::AllowOnly);
        assert_eq!(config.spending.period_secs, 86_400);
    }
}
