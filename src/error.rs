//! Error types for the sample triage pipeline.
//!
//! Only `ScanError::Io` on the top-level input aborts a scan. Every other
//! variant is produced at a component boundary and degraded by the
//! orchestrator into a recorded issue.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for triage operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Path unreadable or missing
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Structural parse failure in a format extractor
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Executable headers could not be validated
    #[error("Malformed executable: {0}")]
    MalformedExecutable(String),

    /// A signature rule file failed solo compilation
    #[error("Invalid rule file {path}: {message}")]
    RuleValidation { path: PathBuf, message: String },

    /// The signature matcher failed on a sample
    #[error("Signature match failed: {0}")]
    Match(String),

    /// Container extraction or unpacker subprocess failure
    #[error("Unpack failed: {0}")]
    Unpack(String),

    /// Operation exceeded its time budget
    #[error("Operation '{operation}' timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// A size or read budget was exhausted
    #[error("Budget exceeded: {0}")]
    Budget(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for triage operations
pub type Result<T> = std::result::Result<T, ScanError>;

impl ScanError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the scan of the file it was raised for.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::Io { .. })
    }
}

impl From<crate::io::error::IoError> for ScanError {
    fn from(err: crate::io::error::IoError) -> Self {
        use crate::io::error::IoError;
        match err {
            IoError::StdIo { path, source } => ScanError::Io { path, source },
            e @ (IoError::FileTooLarge { .. } | IoError::ReadLimitExceeded { .. }) => {
                ScanError::Budget(e.to_string())
            }
            other => ScanError::Io {
                path: other.path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
            },
        }
    }
}
