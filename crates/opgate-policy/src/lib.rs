//! # opgate-policy
//!
//! Policy engines for the `OpGate` gateway: spending caps, request-rate
//! quotas, and destination address rules.
//!
//! Each engine is an explicit service object constructed once from its
//! section of the immutable [`GateConfig`](opgate_core::config::GateConfig)
//! and shared by reference into every call path; there is no hidden
//! global state, and a fresh instance per test gives full isolation.
//!
//! ## Modules
//!
//! - [`spending`] - Cumulative exposure caps over accounting periods
//! - [`rate`] - Fixed-window request quotas per category and key
//! - [`address`] - Allow/deny destination rules with canonical
//!   normalization
//!
//! All engines are `Send + Sync`, hold their mutable state behind
//! per-key locks, and complete every check in bounded time without I/O.
//!
//! ## Example
//!
//! ```
//! use opgate_policy::{AddressPolicy, RateLimiter, SpendingLimiter};
//! use opgate_core::config::GateConfig;
//! use opgate_core::types::RateCategory;
//! use alloy_primitives::U256;
//!
//! let config = GateConfig::default();
//!
//! let spending = SpendingLimiter::new(config.spending.clone());
//! let rate = RateLimiter::new(config.rate.clone());
//! let address = AddressPolicy::new(&config.address).unwrap();
//!
//! assert!(spending.validate("ETH", U256::from(1u64), None).is_ok());
//! assert!(rate.check(RateCategory::Global, None).allowed);
//! assert!(address.check("0xdeadbeef").unwrap().allowed);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod address;
pub mod rate;
pub mod spending;

pub use address::{normalize_address, AddressCheck, AddressPolicy};
pub use rate::{RateLimiter, RateStatus};
pub use spending::{SpendingHeadroom, SpendingLimiter};
