//! Custom error types for the I/O module.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("{path}: file size of {found} bytes exceeds the maximum allowed size of {limit} bytes.")]
    FileTooLarge {
        path: PathBuf,
        limit: u64,
        found: u64,
    },

    #[error(
        "{path}: a read operation would exceed the total read limit of {limit} bytes. (already read: {current})"
    )]
    ReadLimitExceeded {
        path: PathBuf,
        limit: u64,
        current: u64,
    },

    #[error("{path} is not a regular file.")]
    NotAFile { path: PathBuf },

    #[error("An underlying I/O error occurred on {path}: {source}")]
    StdIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IoError {
    /// The path the failed operation targeted.
    pub fn path(&self) -> &Path {
        match self {
            IoError::FileTooLarge { path, .. }
            | IoError::ReadLimitExceeded { path, .. }
            | IoError::NotAFile { path }
            | IoError::StdIo { path, .. } => path,
        }
    }
}

pub type Result<T> = std::result::Result<T, IoError>;
