//! Tamper-evident JSONL persistence for the audit trail.
//!
//! Each persisted record carries an HMAC-SHA256 computed over the record
//! data concatenated with the previous record's HMAC, creating a chain
//! that detects any modification to historical entries. Files rotate when
//! they exceed a size threshold; rotated files are gzip-compressed and
//! each file carries its own chain.
//!
//! The sink is an optional attachment to
//! [`AuditLog`](crate::log::AuditLog) — the in-memory log and the gate's
//! accounting never depend on it, and a sink failure is reported through
//! a side channel only.
//!
//! ## Security Properties
//!
//! - Forward integrity: tampering with any record invalidates every
//!   subsequent HMAC
//! - Key protection: the HMAC key must be stored separately from the logs
//!
//! # Example
//!
//! ```no_run
//! use opgate_audit::sink::AuditSink;
//! use std::path::Path;
//!
//! let key = [0u8; 32]; // Use a secure random key in production
//! let sink = AuditSink::new(Path::new("/var/log/opgate"), &key)?;
//!
//! let result = sink.verify_chain()?;
//! assert!(result.valid);
//! # Ok::<(), opgate_audit::sink::AuditError>(())
//! ```

use crate::log::AuditRecord;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Type alias for HMAC-SHA256.
type HmacSha256 = Hmac<Sha256>;

/// Default maximum file size before rotation (10 MB).
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Name of the active audit log file.
const AUDIT_LOG_FILENAME: &str = "audit.jsonl";

/// Initial HMAC value for the first record in a chain.
///
/// Fixed "previous HMAC" for the first record, giving deterministic
/// verification.
const INITIAL_HMAC: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Errors raised by audit persistence operations.
///
/// These never propagate to the governed operation; the log reports them
/// through `tracing` and keeps the record in memory.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize a record.
    #[error("failed to serialize record: {0}")]
    Serialization(String),

    /// The HMAC key file was missing or unreadable.
    #[error("failed to read audit key")]
    KeyNotFound,

    /// The key data had an invalid format or length.
    #[error("invalid audit key: {0}")]
    InvalidKey(String),

    /// Log rotation failed.
    #[error("log rotation failed: {0}")]
    RotationFailed(String),
}

/// Result of HMAC chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    /// Whether the entire chain is valid.
    pub valid: bool,

    /// Number of records successfully verified.
    pub records_checked: u64,

    /// Sequence number of the first invalid record, if any.
    pub first_invalid_seq: Option<u64>,

    /// Description of the verification failure, if any.
    pub error_message: Option<String>,
}

impl VerifyResult {
    const fn success(records_checked: u64) -> Self {
        Self {
            valid: true,
            records_checked,
            first_invalid_seq: None,
            error_message: None,
        }
    }

    fn failure(records_checked: u64, first_invalid_seq: u64, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            records_checked,
            first_invalid_seq: Some(first_invalid_seq),
            error_message: Some(message.into()),
        }
    }
}

/// A persisted record: the audit record plus its chain HMAC.
#[derive(Debug, Serialize, Deserialize)]
struct ChainedRecord {
    /// The audit record as appended to the in-memory log.
    #[serde(flatten)]
    record: AuditRecord,

    /// HMAC-SHA256 over the serialized record and the previous HMAC.
    hmac: String,
}

/// Tamper-evident JSONL audit sink.
///
/// Chain state (the last HMAC) is guarded by a mutex so concurrent
/// writers cannot interleave and break the chain.
pub struct AuditSink {
    /// Directory containing log files.
    log_dir: PathBuf,

    /// Path of the active log file.
    log_path: PathBuf,

    /// HMAC key (32 bytes for HMAC-SHA256).
    hmac_key: [u8; 32],

    /// HMAC of the last persisted record.
    last_hmac: Mutex<String>,

    /// Maximum file size before rotation, in bytes.
    max_file_size: u64,
}

impl std::fmt::Debug for AuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditSink")
            .field("log_path", &self.log_path)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

impl AuditSink {
    /// Creates a sink writing to `<log_dir>/audit.jsonl`.
    ///
    /// If an existing log file is found, its last record's HMAC is
    /// restored so the chain continues across restarts.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] if the directory cannot be created or an
    /// existing file cannot be read.
    pub fn new(log_dir: &Path, hmac_key: &[u8; 32]) -> Result<Self, AuditError> {
        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(AUDIT_LOG_FILENAME);
        let last_hmac = Self::restore_last_hmac(&log_path)?;

        Ok(Self {
            log_dir: log_dir.to_path_buf(),
            log_path,
            hmac_key: *hmac_key,
            last_hmac: Mutex::new(last_hmac),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    /// Creates a sink reading its HMAC key from a key file.
    ///
    /// The key file must contain exactly 32 raw bytes or 64 hex
    /// characters.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::KeyNotFound`] if the file does not exist,
    /// [`AuditError::InvalidKey`] if its contents are malformed, or any
    /// error [`new`](Self::new) can produce.
    pub fn from_key_file(log_dir: &Path, key_path: &Path) -> Result<Self, AuditError> {
        let key_data = fs::read(key_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuditError::KeyNotFound
            } else {
                AuditError::Io(e)
            }
        })?;

        let hmac_key = Self::parse_key(&key_data)?;
        Self::new(log_dir, &hmac_key)
    }

    /// Overrides the rotation threshold.
    #[must_use]
    pub const fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Persists one record, extending the HMAC chain.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] if serialization, the file append, or a
    /// needed rotation fails. Callers treat this as a side-channel
    /// report; the in-memory log is unaffected.
    pub fn write(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut last_hmac = lock(&self.last_hmac);

        self.rotate_if_needed(&mut last_hmac)?;

        let hmac = self.compute_hmac(record, &last_hmac)?;
        let chained = ChainedRecord {
            record: record.clone(),
            hmac: hmac.clone(),
        };
        let json = serde_json::to_string(&chained)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{json}")?;
        file.flush()?;

        *last_hmac = hmac;
        Ok(())
    }

    /// Verifies the HMAC chain of the active log file.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] only for I/O failures; chain breaks are
    /// reported through [`VerifyResult`], not as errors.
    pub fn verify_chain(&self) -> Result<VerifyResult, AuditError> {
        if !self.log_path.exists() {
            return Ok(VerifyResult::success(0));
        }

        let file = File::open(&self.log_path)?;
        let reader = BufReader::new(file);

        let mut prev_hmac = INITIAL_HMAC.to_string();
        let mut checked: u64 = 0;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let chained: ChainedRecord = match serde_json::from_str(&line) {
                Ok(chained) => chained,
                Err(e) => {
                    return Ok(VerifyResult::failure(
                        checked,
                        checked,
                        format!("unparseable record: {e}"),
                    ));
                }
            };

            let expected = self.compute_hmac(&chained.record, &prev_hmac)?;
            if expected != chained.hmac {
                return Ok(VerifyResult::failure(
                    checked,
                    chained.record.seq,
                    "HMAC mismatch",
                ));
            }

            prev_hmac = chained.hmac;
            checked += 1;
        }

        Ok(VerifyResult::success(checked))
    }

    /// Parses an HMAC key from raw bytes or hex text.
    fn parse_key(data: &[u8]) -> Result<[u8; 32], AuditError> {
        if data.len() == 32 {
            let mut key = [0u8; 32];
            key.copy_from_slice(data);
            return Ok(key);
        }

        let text = std::str::from_utf8(data)
            .map_err(|_| AuditError::InvalidKey("key is neither 32 bytes nor hex".to_string()))?
            .trim();
        let decoded = hex::decode(text)
            .map_err(|e| AuditError::InvalidKey(format!("invalid hex key: {e}")))?;

        <[u8; 32]>::try_from(decoded.as_slice()).map_err(|_| {
            AuditError::InvalidKey(format!("key must be 32 bytes, got {}", decoded.len()))
        })
    }

    /// HMAC over the serialized record concatenated with the previous
    /// HMAC.
    fn compute_hmac(&self, record: &AuditRecord, prev_hmac: &str) -> Result<String, AuditError> {
        let data =
            serde_json::to_vec(record).map_err(|e| AuditError::Serialization(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(&self.hmac_key)
            .map_err(|e| AuditError::InvalidKey(e.to_string()))?;
        mac.update(&data);
        mac.update(prev_hmac.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Reads the HMAC of the last record in an existing file, if any.
    fn restore_last_hmac(log_path: &Path) -> Result<String, AuditError> {
        if !log_path.exists() {
            return Ok(INITIAL_HMAC.to_string());
        }

        let file = File::open(log_path)?;
        let reader = BufReader::new(file);

        let mut last = INITIAL_HMAC.to_string();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let chained: ChainedRecord = serde_json::from_str(&line)
                .map_err(|e| AuditError::Serialization(e.to_string()))?;
            last = chained.hmac;
        }

        Ok(last)
    }

    /// Rotates the active file once it exceeds the size threshold.
    ///
    /// The rotated file is gzip-compressed and the chain restarts, so
    /// each file verifies on its own.
    fn rotate_if_needed(&self, last_hmac: &mut String) -> Result<(), AuditError> {
        let size = match fs::metadata(&self.log_path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AuditError::Io(e)),
        };
        if size < self.max_file_size {
            return Ok(());
        }

        let rotated_name = format!("audit-{}.jsonl.gz", Utc::now().format("%Y%m%d%H%M%S%3f"));
        let rotated_path = self.log_dir.join(rotated_name);

        let contents = fs::read(&self.log_path)?;
        let file = File::create(&rotated_path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(&contents)
            .map_err(|e| AuditError::RotationFailed(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| AuditError::RotationFailed(e.to_string()))?;

        fs::remove_file(&self.log_path)?;
        *last_hmac = INITIAL_HMAC.to_string();

        tracing::info!(
            target: "opgate::audit",
            rotated = %rotated_path.display(),
            "rotated audit log"
        );
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
