//! Spending caps over rolling accounting periods.
//!
//! Tracks cumulative monetary exposure per token, and in aggregate across
//! tokens, against configured caps. Amounts are `U256` values in the
//! token's smallest unit; accumulation is saturating, never floating
//! point, so many small operations cannot drift.
//!
//! The check/record split mirrors the authorize/commit protocol:
//!
//! - [`SpendingLimiter::validate`] evaluates an operation against the
//!   caps without changing any total.
//! - [`SpendingLimiter::record`] adds a confirmed spend, and must be
//!   called only after the underlying operation is known to have
//!   executed. Calling it speculatively would under- or over-count
//!   relative to real exposure.
//!
//! # Periods
//!
//! Totals accumulate within fixed accounting periods aligned to the unix
//! epoch (one UTC day by default). A period boundary crossing resets the
//! running total and advances the period key before any check or update
//! is applied.
//!
//! # Example
//!
//! ```
//! use opgate_policy::spending::SpendingLimiter;
//! use opgate_core::config::SpendingConfig;
//! use alloy_primitives::U256;
//!
//! let config = SpendingConfig::default()
//!     .with_period_cap("ETH", U256::from(1000u64));
//! let limiter = SpendingLimiter::new(config);
//!
//! assert!(limiter.validate("ETH", U256::from(400u64), None).is_ok());
//! limiter.record("ETH", U256::from(400u64));
//!
//! let headroom = limiter.remaining("ETH");
//! assert_eq!(headroom.token_remaining, Some(U256::from(600u64)));
//! ```

use alloy_primitives::U256;
use opgate_core::config::SpendingConfig;
use opgate_core::error::GateError;
use opgate_core::types::{BatchInfo, LimitDimension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Allowance left in the current period for one token and in aggregate.
///
/// `None` means the corresponding dimension has no configured cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendingHeadroom {
    /// Remaining allowance for the queried token.
    pub token_remaining: Option<U256>,

    /// Remaining allowance across all tokens.
    pub aggregate_remaining: Option<U256>,
}

/// Running total for one token (or the aggregate) within one period.
///
/// Invariant: after every successful commit, `spent` does not exceed the
/// period cap the commit was validated against. A period boundary
/// crossing resets `spent` and advances `period_key` before any check or
/// update touches the window.
#[derive(Debug, Clone, Copy)]
struct SpendingWindow {
    /// Index of the accounting period this window covers.
    period_key: i64,
    /// Amount spent within the period, in smallest units.
    spent: U256,
}

impl SpendingWindow {
    const fn new(period_key: i64) -> Self {
        Self {
            period_key,
            spent: U256::ZERO,
        }
    }

    /// Applies the period rollover and returns the current total.
    fn rolled_spent(&mut self, period_key: i64) -> U256 {
        if self.period_key != period_key {
            self.period_key = period_key;
            self.spent = U256::ZERO;
        }
        self.spent
    }
}

/// Spending limiter over per-token and aggregate period windows.
///
/// Windows are created lazily on first reference to a token and live for
/// the process lifetime. Each token window has its own lock, so
/// operations on different tokens do not contend; the aggregate window is
/// a single shared counter and is always locked after the token window,
/// giving a fixed lock order.
pub struct SpendingLimiter {
    /// Caps and period length.
    config: SpendingConfig,
    /// Lazily-created per-token windows, one lock per token.
    windows: RwLock<HashMap<String, Arc<Mutex<SpendingWindow>>>>,
    /// Cross-token aggregate window.
    aggregate: Mutex<SpendingWindow>,
}

impl std::fmt::Debug for SpendingLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpendingLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpendingLimiter {
    /// Creates a limiter from the configured caps.
    #[must_use]
    pub fn new(config: SpendingConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
            aggregate: Mutex::new(SpendingWindow::new(0)),
        }
    }

    /// Checks an operation against the caps without consuming allowance.
    ///
    /// Checks run in a fixed order and the first violated dimension is
    /// reported, skipping the rest: batch recipient count (batches only),
    /// per-operation cap (the batch total replaces `amount` for batches),
    /// per-token period cap, aggregate period cap.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::LimitExceeded`] carrying the violated
    /// dimension, the configured limit, the attempted total, and the
    /// remaining allowance.
    pub fn validate(
        &self,
        token: &str,
        amount: U256,
        batch: Option<&BatchInfo>,
    ) -> Result<(), GateError> {
        self.validate_at(token, amount, batch, now_secs())
    }

    /// Adds a confirmed spend to the token's period total and to the
    /// aggregate.
    ///
    /// Must be called only after the underlying operation is confirmed to
    /// have executed.
    pub fn record(&self, token: &str, amount: U256) {
        self.record_at(token, amount, now_secs());
    }

    /// Read-only allowance remaining in the current period.
    #[must_use]
    pub fn remaining(&self, token: &str) -> SpendingHeadroom {
        self.remaining_at(token, now_secs())
    }

    fn validate_at(
        &self,
        token: &str,
        amount: U256,
        batch: Option<&BatchInfo>,
        now: i64,
    ) -> Result<(), GateError> {
        if let (Some(max), Some(info)) = (self.config.max_batch_recipients, batch) {
            if info.recipients > max {
                return Err(GateError::LimitExceeded {
                    dimension: LimitDimension::BatchRecipients,
                    limit: U256::from(max),
                    attempted: U256::from(info.recipients),
                    remaining: U256::from(max),
                });
            }
        }

        let effective = batch.map_or(amount, |info| info.total);

        if let Some(cap) = self.config.per_operation_caps.get(token) {
            if effective > *cap {
                return Err(GateError::LimitExceeded {
                    dimension: LimitDimension::PerOperation,
                    limit: *cap,
                    attempted: effective,
                    remaining: *cap,
                });
            }
        }

        let period_key = self.period_key(now);

        if let Some(cap) = self.config.period_caps.get(token) {
            let window = self.token_window(token, period_key);
            let mut window = mutex_lock(&window);
            let spent = window.rolled_spent(period_key);
            let attempted = spent.saturating_add(effective);
            if attempted > *cap {
                return Err(GateError::LimitExceeded {
                    dimension: LimitDimension::TokenPeriod,
                    limit: *cap,
                    attempted,
                    remaining: cap.saturating_sub(spent),
                });
            }
        }

        if let Some(cap) = self.config.aggregate_period_cap {
            let mut aggregate = mutex_lock(&self.aggregate);
            let spent = aggregate.rolled_spent(period_key);
            let attempted = spent.saturating_add(effective);
            if attempted > cap {
                return Err(GateError::LimitExceeded {
                    dimension: LimitDimension::AggregatePeriod,
                    limit: cap,
                    attempted,
                    remaining: cap.saturating_sub(spent),
                });
            }
        }

        Ok(())
    }

    fn record_at(&self, token: &str, amount: U256, now: i64) {
        let period_key = self.period_key(now);

        {
            let window = self.token_window(token, period_key);
            let mut window = mutex_lock(&window);
            let spent = window.rolled_spent(period_key);
            window.spent = spent.saturating_add(amount);
        }

        let mut aggregate = mutex_lock(&self.aggregate);
        let spent = aggregate.rolled_spent(period_key);
        aggregate.spent = spent.saturating_add(amount);

        tracing::debug!(token, amount = %amount, "recorded confirmed spend");
    }

    fn remaining_at(&self, token: &str, now: i64) -> SpendingHeadroom {
        let period_key = self.period_key(now);

        let token_remaining = self.config.period_caps.get(token).map(|cap| {
            let window = self.token_window(token, period_key);
            let mut window = mutex_lock(&window);
            cap.saturating_sub(window.rolled_spent(period_key))
        });

        let aggregate_remaining = self.config.aggregate_period_cap.map(|cap| {
            let mut aggregate = mutex_lock(&self.aggregate);
            cap.saturating_sub(aggregate.rolled_spent(period_key))
        });

        SpendingHeadroom {
            token_remaining,
            aggregate_remaining,
        }
    }

    /// Index of the accounting period containing `now`.
    fn period_key(&self, now: i64) -> i64 {
        let period = i64::try_from(self.config.period_secs)
            .unwrap_or(i64::MAX)
            .max(1);
        now.div_euclid(period)
    }

    /// Returns the window for a token, creating it lazily.
    fn token_window(&self, token: &str, period_key: i64) -> Arc<Mutex<SpendingWindow>> {
        if let Some(window) = self
            .windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
        {
            return Arc::clone(window);
        }

        let mut map = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(token.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SpendingWindow::new(period_key)))),
        )
    }
}

/// Current unix timestamp in seconds.
fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn mutex_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
