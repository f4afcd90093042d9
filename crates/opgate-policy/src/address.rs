//! Destination address policy.
//!
//! Evaluates a destination address against an allow/deny ruleset. The
//! policy operates in exactly one of three modes, fixed at configuration
//! time:
//!
//! 1. **Allow-only** - Default deny. An explicit allow-list entry is
//!    required for every destination.
//! 2. **Deny-list** - Default allow. Only explicitly listed destinations
//!    are blocked.
//! 3. **Disabled** - Every destination passes.
//!
//! Addresses are compared case-insensitively after canonical
//! normalization; a malformed address is reported as a distinct
//! validation failure, never silently treated as "denied".
//!
//! # Example
//!
//! ```
//! use opgate_policy::address::AddressPolicy;
//! use opgate_core::config::{AddressPolicyConfig, AddressPolicyMode};
//!
//! let config = AddressPolicyConfig::default()
//!     .with_mode(AddressPolicyMode::DenyList)
//!     .with_deny(vec!["0xBAD".to_string()]);
//!
//! let policy = AddressPolicy::new(&config).unwrap();
//!
//! // Comparison is case-insensitive after normalization.
//! let check = policy.check("0xbad").unwrap();
//! assert!(!check.allowed);
//! ```

use alloy_primitives::Address;
use opgate_core::config::{AddressPolicyConfig, AddressPolicyMode};
use opgate_core::error::{ConfigError, GateError};
use std::collections::{HashMap, HashSet};

/// Result of a non-mutating address policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCheck {
    /// Whether the address passes the policy.
    pub allowed: bool,

    /// Why the address was rejected, when it was.
    pub reason: Option<String>,
}

impl AddressCheck {
    const fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Normalizes a destination address to its canonical comparison form.
///
/// The canonical form is the lowercased `0x`-prefixed hex body. Inputs
/// that are exactly 40 hex characters and mixed-case must additionally
/// carry a valid EIP-55 checksum; all-lowercase and all-uppercase forms
/// are accepted as unchecksummed.
///
/// # Errors
///
/// Returns [`GateError::MalformedInput`] if the input lacks the `0x`
/// prefix, contains non-hex characters, is empty, or fails checksum
/// verification.
pub fn normalize_address(address: &str) -> Result<String, GateError> {
    let trimmed = address.trim();
    let Some(body) = trimmed.strip_prefix("0x") else {
        return Err(GateError::malformed_input(format!(
            "address missing 0x prefix: {trimmed}"
        )));
    };

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GateError::malformed_input(format!(
            "address is not hex: {trimmed}"
        )));
    }

    // Full-length mixed-case addresses carry an EIP-55 checksum; a failed
    // checksum is a malformed input, not a policy denial.
    let mixed_case = body.chars().any(|c| c.is_ascii_uppercase())
        && body.chars().any(|c| c.is_ascii_lowercase());
    if body.len() == 40 && mixed_case {
        Address::parse_checksummed(trimmed, None).map_err(|_| {
            GateError::malformed_input(format!("address checksum mismatch: {trimmed}"))
        })?;
    }

    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// Destination address policy engine.
///
/// Holds the normalized rule set; evaluation is read-only and requires no
/// locking, so the engine is trivially `Send + Sync`.
#[derive(Debug, Clone)]
pub struct AddressPolicy {
    /// Evaluation mode, fixed at construction.
    mode: AddressPolicyMode,
    /// Normalized allow-list entries.
    allow: HashSet<String>,
    /// Normalized deny-list entries.
    deny: HashSet<String>,
    /// Denial reasons keyed by normalized address.
    reasons: HashMap<String, String>,
}

impl AddressPolicy {
    /// Builds the policy from configuration, normalizing every entry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConflictingEntry`] if an address appears in
    /// both lists, or [`ConfigError::InvalidAddress`] if any entry cannot
    /// be normalized.
    pub fn new(config: &AddressPolicyConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let normalize_all = |entries: &[String]| -> Result<HashSet<String>, ConfigError> {
            entries
                .iter()
                .map(|entry| {
                    normalize_address(entry)
                        .map_err(|_| ConfigError::invalid_address(entry.clone()))
                })
                .collect()
        };

        let allow = normalize_all(&config.allow)?;
        let deny = normalize_all(&config.deny)?;

        let mut reasons = HashMap::new();
        for (address, reason) in &config.deny_reasons {
            let normalized = normalize_address(address)
                .map_err(|_| ConfigError::invalid_address(address.clone()))?;
            reasons.insert(normalized, reason.clone());
        }

        Ok(Self {
            mode: config.mode,
            allow,
            deny,
            reasons,
        })
    }

    /// The evaluation mode this policy was built with.
    #[must_use]
    pub const fn mode(&self) -> AddressPolicyMode {
        self.mode
    }

    /// Non-mutating, mode-dependent evaluation of a destination address.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::MalformedInput`] if the address cannot be
    /// normalized. Policy denials are reported through
    /// [`AddressCheck::allowed`], not as errors.
    pub fn check(&self, address: &str) -> Result<AddressCheck, GateError> {
        let normalized = normalize_address(address)?;

        let check = match self.mode {
            AddressPolicyMode::Disabled => AddressCheck::allowed(),
            AddressPolicyMode::AllowOnly => {
                if self.allow.contains(&normalized) {
                    AddressCheck::allowed()
                } else {
                    AddressCheck::denied(format!("address not in allow list: {normalized}"))
                }
            }
            AddressPolicyMode::DenyList => {
                if self.deny.contains(&normalized) {
                    let reason = self.reasons.get(&normalized).cloned().unwrap_or_else(|| {
                        format!("address is deny-listed: {normalized}")
                    });
                    AddressCheck::denied(reason)
                } else {
                    AddressCheck::allowed()
                }
            }
        };

        Ok(check)
    }

    /// Evaluates a destination and raises on rejection.
    ///
    /// Returns the normalized address on success so callers can reuse it
    /// as a lookup key without normalizing twice.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::AddressRejected`] if the policy blocks the
    /// address, or [`GateError::MalformedInput`] if it cannot be
    /// normalized.
    pub fn validate(&self, address: &str) -> Result<String, GateError> {
        let normalized = normalize_address(address)?;
        let check = self.check(address)?;

        if check.allowed {
            Ok(normalized)
        } else {
            Err(GateError::AddressRejected {
                address: normalized,
                reason: check
                    .reason
                    .unwrap_or_else(|| "address rejected by policy".to_string()),
            })
        }
    }
}
