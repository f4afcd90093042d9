//! Request-rate quotas over fixed time windows.
//!
//! Tracks per-category (and, for the destination category, per-key)
//! request counts against configured windows. Three properties shape the
//! API:
//!
//! - [`RateLimiter::check`] is a non-mutating preview: calling it N times
//!   yields the same result as calling it once.
//! - [`RateLimiter::validate`] performs the same evaluation but raises a
//!   structured, retryable failure.
//! - [`RateLimiter::record_request`] consumes quota, and is invoked only
//!   on the path where the governed operation is actually accepted, so
//!   previewing availability never spends it.
//!
//! # Window semantics
//!
//! Buckets use fixed windows: once `now` reaches the end of the current
//! window the count resets and the window start advances to the boundary
//! at or before `now`, on the original grid. Requests clustered at a
//! window edge can therefore reach up to twice the capacity across the
//! boundary; substitute a sliding-window log where stricter smoothing is
//! required.
//!
//! # Example
//!
//! ```
//! use opgate_policy::rate::RateLimiter;
//! use opgate_core::config::{RateConfig, RateRule};
//! use opgate_core::types::RateCategory;
//!
//! let config = RateConfig::default().with_global(RateRule::new(3, 60));
//! let limiter = RateLimiter::new(config);
//!
//! let status = limiter.check(RateCategory::Global, None);
//! assert!(status.allowed);
//! assert_eq!(status.remaining, 3);
//! ```

use opgate_core::config::{RateConfig, RateRule};
use opgate_core::error::GateError;
use opgate_core::types::RateCategory;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Result of a non-mutating quota preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    /// Whether the next request would be accepted.
    pub allowed: bool,

    /// Requests left in the current window.
    pub remaining: u32,

    /// Unix timestamp (seconds) at which the current window resets.
    pub reset_at: i64,
}

/// One fixed-window counter.
///
/// Invariant: `count <= capacity` within
/// `[window_start, window_start + window)`; expiry resets the count and
/// advances `window_start` along the original window grid.
#[derive(Debug, Clone, Copy)]
struct RateBucket {
    /// Start of the current window (unix seconds).
    window_start: i64,
    /// Requests recorded in the current window.
    count: u32,
}

/// Key identifying one bucket: the category plus, for per-destination
/// quotas, the normalized destination address.
type BucketKey = (RateCategory, Option<String>);

/// Request-rate limiter over the fixed category set.
///
/// Buckets are created lazily on first reference and live for the process
/// lifetime. Each bucket has its own lock, so operations against
/// different categories or destinations do not contend; the outer map
/// lock is held only briefly for lookup or insertion.
pub struct RateLimiter {
    /// Quota rules per category.
    config: RateConfig,
    /// Lazily-created buckets, one lock per bucket.
    buckets: RwLock<HashMap<BucketKey, Arc<Mutex<RateBucket>>>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a limiter from the configured quota rules.
    #[must_use]
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Non-mutating preview of a category/key quota.
    #[must_use]
    pub fn check(&self, category: RateCategory, key: Option<&str>) -> RateStatus {
        self.check_at(category, key, now_secs())
    }

    /// Performs the same evaluation as [`check`](Self::check) but raises a
    /// structured, retryable failure.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RateLimitExceeded`] with the time until the
    /// window resets when the quota is exhausted.
    pub fn validate(&self, category: RateCategory, key: Option<&str>) -> Result<(), GateError> {
        self.validate_at(category, key, now_secs())
    }

    /// Consumes one unit of quota for the category/key.
    ///
    /// Invoked only on the path where the governed operation is actually
    /// accepted; callers must have validated first.
    pub fn record_request(&self, category: RateCategory, key: Option<&str>) {
        self.record_request_at(category, key, now_secs());
    }

    fn check_at(&self, category: RateCategory, key: Option<&str>, now: i64) -> RateStatus {
        let rule = self.config.rule(category);
        let window = window_len(rule);

        let existing = {
            let map = read_lock(&self.buckets);
            map.get(&(category, key.map(ToString::to_string))).cloned()
        };

        existing.map_or_else(
            || RateStatus {
                allowed: rule.capacity > 0,
                remaining: rule.capacity,
                reset_at: now.saturating_add(window),
            },
            |bucket| {
                let bucket = mutex_lock(&bucket);
                let (start, count) = effective_window(&bucket, window, now);
                RateStatus {
                    allowed: count < rule.capacity,
                    remaining: rule.capacity.saturating_sub(count),
                    reset_at: start.saturating_add(window),
                }
            },
        )
    }

    fn validate_at(
        &self,
        category: RateCategory,
        key: Option<&str>,
        now: i64,
    ) -> Result<(), GateError> {
        let status = self.check_at(category, key, now);
        if status.allowed {
            return Ok(());
        }

        let wait = status.reset_at.saturating_sub(now).max(0);
        tracing::debug!(
            category = %category,
            key = key.unwrap_or_default(),
            retry_after_secs = wait,
            "rate quota exhausted"
        );
        Err(GateError::RateLimitExceeded {
            category,
            retry_after: Duration::from_secs(wait.unsigned_abs()),
        })
    }

    fn record_request_at(&self, category: RateCategory, key: Option<&str>, now: i64) {
        let rule = self.config.rule(category);
        let window = window_len(rule);
        let bucket = self.bucket(category, key, now);

        let mut bucket = mutex_lock(&bucket);
        let (start, count) = effective_window(&bucket, window, now);
        bucket.window_start = start;
        bucket.count = count.saturating_add(1);
    }

    /// Returns the bucket for a key, creating it lazily.
    fn bucket(
        &self,
        category: RateCategory,
        key: Option<&str>,
        now: i64,
    ) -> Arc<Mutex<RateBucket>> {
        let owned_key = (category, key.map(ToString::to_string));

        if let Some(bucket) = read_lock(&self.buckets).get(&owned_key) {
            return Arc::clone(bucket);
        }

        let mut map = write_lock(&self.buckets);
        Arc::clone(map.entry(owned_key).or_insert_with(|| {
            Arc::new(Mutex::new(RateBucket {
                window_start: now,
                count: 0,
            }))
        }))
    }
}

/// Window length as a signed offset, clamped for arithmetic safety.
fn window_len(rule: RateRule) -> i64 {
    i64::try_from(rule.window_secs).unwrap_or(i64::MAX).max(1)
}

/// Computes the window a bucket is effectively in at `now` without
/// mutating it: expired windows evaluate as a fresh count with the start
/// advanced along the original grid.
fn effective_window(bucket: &RateBucket, window: i64, now: i64) -> (i64, u32) {
    let end = bucket.window_start.saturating_add(window);
    if now < end {
        (bucket.window_start, bucket.count)
    } else {
        let elapsed = now.saturating_sub(bucket.window_start);
        let aligned = bucket
            .window_start
            .saturating_add((elapsed / window).saturating_mul(window));
        (aligned, 0)
    }
}

/// Current unix timestamp in seconds.
fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn read_lock<'a, K, V>(
    lock: &'a RwLock<HashMap<K, V>>,
) -> std::sync::RwLockReadGuard<'a, HashMap<K, V>> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<'a, K, V>(
    lock: &'a RwLock<HashMap<K, V>>,
) -> std::sync::RwLockWriteGuard<'a, HashMap<K, V>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn mutex_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
