//! # Logging Infrastructure
//!
//! Structured logging with tracing for observability.
//!
//! This module provides the logging surface for the gateway: multiple
//! output formats, optional non-blocking file output, sensitive data
//! redaction, and correlation IDs for tracing one operation across its
//! audit records and log lines.
//!
//! ## Quick Start
//!
//! ```no_run
//! use opgate::logging::{init_logging, LogConfig};
//!
//! // Initialize with defaults (INFO level, pretty format, stdout)
//! let config = LogConfig::default();
//! let _guard = init_logging(&config).expect("Failed to initialize logging");
//!
//! tracing::info!("gateway started");
//! ```
//!
//! ## Sensitive Data Redaction
//!
//! ```
//! use opgate::logging::redact_sensitive;
//!
//! let api_key = "sk-1234567890abcdef";
//! assert_eq!(redact_sensitive(api_key), "sk-1***cdef");
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Error type for logging initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Failed to create the log file or its directory.
    #[error("failed to create log file: {0}")]
    FileCreation(String),

    /// Failed to initialize the subscriber.
    #[error("failed to initialize logging: {0}")]
    SubscriberInit(String),

    /// Invalid configuration.
    #[error("invalid log configuration: {0}")]
    InvalidConfig(String),
}

/// Log level configuration.
///
/// Determines the minimum severity of messages that will be logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Most verbose: trace, debug, info, warn, error
    Trace,
    /// Verbose: debug, info, warn, error
    Debug,
    /// Standard: info, warn, error
    #[default]
    Info,
    /// Quiet: warn, error
    Warn,
    /// Quietest: error only
    Error,
}

impl LogLevel {
    /// Convert to tracing Level.
    #[must_use]
    pub const fn as_tracing_level(self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }

    /// Get the string representation for the env filter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format with colors (default).
    #[default]
    Pretty,
    /// JSON structured format, for log aggregation systems.
    Json,
    /// Compact single-line format.
    Compact,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
            Self::Compact => f.write_str("compact"),
        }
    }
}

/// Configuration for the logging system.
///
/// # Example
///
/// ```
/// use opgate::logging::{LogConfig, LogLevel, LogFormat};
///
/// let config = LogConfig {
///     level: LogLevel::Debug,
///     format: LogFormat::Json,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Minimum severity of messages that will be logged.
    pub level: LogLevel,

    /// Output format for log messages.
    pub format: LogFormat,

    /// Optional file path; when set, logs are written there in addition
    /// to stdout. The directory is created if it doesn't exist.
    pub file_path: Option<PathBuf>,
}

/// Guard that flushes logs on drop.
///
/// Must be kept alive for the program's lifetime so file logging
/// continues and buffered lines are flushed on shutdown.
pub struct LogGuard {
    /// Worker guard for the non-blocking file appender, when file
    /// logging is configured.
    guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl LogGuard {
    const fn new(guard: Option<tracing_appender::non_blocking::WorkerGuard>) -> Self {
        Self { guard }
    }
}

impl std::fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGuard")
            .field("has_file_guard", &self.guard.is_some())
            .finish()
    }
}

/// Initialize the logging system.
///
/// Sets up the tracing subscriber with the specified configuration and
/// returns a guard that must be kept alive for the duration of logging.
///
/// # Errors
///
/// Returns [`LogError`] if:
/// - The log file directory cannot be created
/// - The subscriber cannot be initialized (e.g. already initialized)
pub fn init_logging(config: &LogConfig) -> Result<LogGuard, LogError> {
    let filter = EnvFilter::try_new(config.level.as_str())
        .map_err(|e| LogError::InvalidConfig(e.to_string()))?;

    let (file_writer, guard) = if let Some(ref path) = config.file_path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LogError::FileCreation(format!("{}: {}", parent.display(), e)))?;
        }

        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LogError::InvalidConfig("invalid log file name".to_string()))?;

        let file_appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        (Some(non_blocking), Some(guard))
    } else {
        (None, None)
    };

    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE);

            if let Some(writer) = file_writer {
                let file_layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LogError::SubscriberInit(e.to_string()))?;
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
                    .map_err(|e| LogError::SubscriberInit(e.to_string()))?;
            }
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true);

            if let Some(writer) = file_writer {
                let file_layer = fmt::layer().json().with_writer(writer).with_target(true);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LogError::SubscriberInit(e.to_string()))?;
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
                    .map_err(|e| LogError::SubscriberInit(e.to_string()))?;
            }
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer().compact().with_target(true);

            if let Some(writer) = file_writer {
                let file_layer = fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LogError::SubscriberInit(e.to_string()))?;
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
                    .map_err(|e| LogError::SubscriberInit(e.to_string()))?;
            }
        }
    }

    Ok(LogGuard::new(guard))
}

/// Redact a sensitive value.
///
/// Shows only the first 4 and last 4 characters with `***` in between;
/// values shorter than 12 characters are fully redacted to `***`.
///
/// # Example
///
/// ```
/// use opgate::logging::redact_sensitive;
///
/// assert_eq!(redact_sensitive("sk-1234567890abcdef"), "sk-1***cdef");
/// assert_eq!(redact_sensitive("secret"), "***");
/// ```
#[must_use]
pub fn redact_sensitive(value: &str) -> String {
    const MIN_LENGTH_FOR_PARTIAL: usize = 12;
    const VISIBLE_CHARS: usize = 4;

    let chars: Vec<char> = value.chars().collect();
    if chars.len() < MIN_LENGTH_FOR_PARTIAL {
        return "***".to_string();
    }

    let prefix: String = chars.iter().take(VISIBLE_CHARS).collect();
    let suffix: String = chars.iter().skip(chars.len() - VISIBLE_CHARS).collect();
    format!("{prefix}***{suffix}")
}

/// Argument keys whose values are redacted before reaching the audit
/// trail.
const SENSITIVE_KEY_MARKERS: [&str; 5] = ["key", "secret", "passphrase", "password", "seed"];

/// Redact the values of sensitive-looking keys in an argument map.
///
/// String values are partially redacted via [`redact_sensitive`];
/// non-string values under sensitive keys are replaced wholesale.
///
/// # Example
///
/// ```
/// use opgate::logging::redact_arguments;
/// use std::collections::BTreeMap;
///
/// let mut args = BTreeMap::new();
/// args.insert("api_key".to_string(), serde_json::json!("sk-1234567890abcdef"));
/// args.insert("memo".to_string(), serde_json::json!("invoice 42"));
///
/// let redacted = redact_arguments(&args);
/// assert_eq!(redacted["api_key"], serde_json::json!("sk-1***cdef"));
/// assert_eq!(redacted["memo"], serde_json::json!("invoice 42"));
/// ```
#[must_use]
pub fn redact_arguments(
    arguments: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, serde_json::Value> {
    arguments
        .iter()
        .map(|(key, value)| {
            let lower = key.to_ascii_lowercase();
            if SENSITIVE_KEY_MARKERS.iter().any(|m| lower.contains(m)) {
                let redacted = match value {
                    serde_json::Value::String(s) => redact_sensitive(s),
                    _ => "***".to_string(),
                };
                (key.clone(), serde_json::Value::String(redacted))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}

/// Generate a new correlation ID.
///
/// Creates a unique identifier that threads together the log lines and
/// audit records of one operation. The ID is 32 hex characters: 8 bytes
/// derived from the timestamp plus 8 bytes from a counter-seeded PRNG —
/// unique, not cryptographic.
///
/// # Example
///
/// ```
/// use opgate::logging::new_correlation_id;
///
/// let id = new_correlation_id();
/// assert_eq!(id.len(), 32);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn new_correlation_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    // Counter keeps IDs unique even within one timestamp tick.
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = timestamp.wrapping_add(u128::from(counter));

    let random_part = {
        let mut state = mixed;
        let mut result = [0u8; 8];
        for byte in &mut result {
            state = state.wrapping_mul(6_364_136_223_846_793_005);
            state = state.wrapping_add(1_442_695_040_888_963_407);
            *byte = (state >> 56) as u8;
        }
        result
    };

    let timestamp_bytes = (mixed as u64).to_be_bytes();

    let mut hex = String::with_capacity(32);
    for byte in timestamp_bytes.iter().chain(random_part.iter()) {
        use std::fmt::Write;
        // write! to String is infallible
        let _ = write!(hex, "{byte:02x}");
    }

    hex
}

/// Create a span carrying a correlation ID.
///
/// # Example
///
/// ```ignore
/// use opgate::with_correlation_id;
/// use opgate::logging::new_correlation_id;
///
/// let correlation_id = new_correlation_id();
/// let span = with_correlation_id!(correlation_id, "authorize", token = "ETH");
/// ```
#[macro_export]
macro_rules! with_correlation_id {
    ($id:expr, $name:expr) => {
        tracing::info_span!($name, correlation_id = %$id)
    };
    ($id:expr, $name:expr, $($fields:tt)*) => {
        tracing::info_span!($name, correlation_id = %$id, $($fields)*)
    };
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
    fn test_redact_sensitive() {
        // Long values show partial content
        assert_eq!(redact_sensitive("sk-1234567890abcdef"), "sk-1***cdef");
        assert_eq!(redact_sensitive("my-super-secret-api-key"), "my-s***-key");

        // Exactly at the boundary
        assert_eq!(redact_sensitive("123456789012"), "1234***9012");

        // Short values are fully redacted
        assert_eq!(redact_sensitive("short"), "***");
        assert_eq!(redact_sensitive("12345678901"), "***");
        assert_eq!(redact_sensitive(""), "***");
    }

    #[test]
    fn test_redact_arguments_targets_sensitive_keys_only() {
        let mut args = BTreeMap::new();
        args.insert(
            "private_key".to_string(),
            serde_json::json!("0x0123456789abcdef0123"),
        );
        args.insert("Passphrase".to_string(), serde_json::json!("hunter2"));
        args.insert("seed_words".to_string(), serde_json::json!(["a", "b"]));
        args.insert("amount".to_string(), serde_json::json!("1000"));
        args.insert("memo".to_string(), serde_json::json!("rent"));

        let redacted = redact_arguments(&args);
        assert_eq!(redacted["private_key"], serde_json::json!("0x01***0123"));
        assert_eq!(redacted["Passphrase"], serde_json::json!("***"));
        assert_eq!(redacted["seed_words"], serde_json::json!("***"));
        assert_eq!(redacted["amount"], serde_json::json!("1000"));
        assert_eq!(redacted["memo"], serde_json::json!("rent"));
    }

    #[test]
    fn test_correlation_id_format() {
        let id = new_correlation_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_correlation_id_uniqueness() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(new_correlation_id()));
        }
    }

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file_path.is_none());
    }

    #[test]
    fn test_log_level_conversions() {
        assert_eq!(LogLevel::Debug.as_str(), "debug");
        assert_eq!(LogLevel::Debug.as_tracing_level(), Level::DEBUG);
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_log_format_display() {
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(LogFormat::Compact.to_string(), "compact");
    }

    #[test]
    fn test_log_guard_debug() {
        let guard = LogGuard::new(None);
        let debug_str = format!("{guard:?}");
        assert!(debug_str.contains("has_file_guard"));
    }
}
