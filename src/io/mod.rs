//! Bounded and safe I/O for sample access.
//!
//! Samples are adversarial, so every read goes through a `SafeReader`: the
//! file is memory-mapped read-only, its size is checked against
//! `IOLimits::max_file_size`, and the bytes handed out are charged against a
//! per-reader read budget.

pub mod error;

use crate::io::error::{IoError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Length of the buffer sampled for the diagnostic cross-check classification.
pub const BUFFER_SNIFF_SIZE: u64 = 1024;
/// Maximum prefix examined by the content sniffer (64KB).
pub const MAX_SNIFF_SIZE: u64 = 65536;

/// Defines the resource limits for I/O operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
    /// The maximum total number of bytes that can be handed out across all operations.
    pub max_read_bytes: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024 * 1024, // 512MB
            max_read_bytes: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// A bounded, memory-mapped view of one sample.
pub struct SafeReader {
    path: PathBuf,
    // memmap cannot map empty files
    mmap: Option<Mmap>,
    limits: IOLimits,
    bytes_read: u64,
    file_size: u64,
}

impl SafeReader {
    /// Opens a regular file and maps it read-only.
    ///
    /// Fails with `IoError::FileTooLarge` if the file exceeds `limits.max_file_size`
    /// and with `IoError::NotAFile` for directories and other special files.
    pub fn open<P: AsRef<Path>>(path: P, limits: IOLimits) -> Result<Self> {
        let path = path.as_ref();
        let with_path = |source| IoError::StdIo {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(with_path)?;
        let metadata = file.metadata().map_err(with_path)?;
        if !metadata.is_file() {
            return Err(IoError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let file_size = metadata.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limits.max_file_size = limits.max_file_size,
            "Opening file for safe reading"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "File is too large"
            );
            return Err(IoError::FileTooLarge {
                path: path.to_path_buf(),
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file; the sample is never written while mapped.
            Some(unsafe { Mmap::map(&file) }.map_err(with_path)?)
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            limits,
            bytes_read: 0,
            file_size,
        })
    }

    /// Returns the total size of the underlying file in bytes.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Returns the total number of bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn charge(&mut self, len: u64) -> Result<()> {
        if self.bytes_read.saturating_add(len) > self.limits.max_read_bytes {
            warn!(
                path = %self.path.display(),
                current_read = self.bytes_read,
                requested = len,
                limit = self.limits.max_read_bytes,
                "Read limit exceeded"
            );
            return Err(IoError::ReadLimitExceeded {
                path: self.path.clone(),
                limit: self.limits.max_read_bytes,
                current: self.bytes_read,
            });
        }
        self.bytes_read += len;
        Ok(())
    }

    /// Borrow the complete file contents without copying.
    pub fn contents(&mut self) -> Result<&[u8]> {
        self.charge(self.file_size)?;
        trace!(path = %self.path.display(), len = self.file_size, "Mapped full contents");
        Ok(self.mmap.as_deref().unwrap_or(&[]))
    }

    /// Copy out at most `len` bytes from the start of the file.
    pub fn read_prefix(&mut self, len: u64) -> Result<Bytes> {
        let actual = len.min(self.file_size);
        self.charge(actual)?;
        let map = match &self.mmap {
            Some(m) => m,
            None => return Ok(Bytes::new()),
        };
        Ok(Bytes::copy_from_slice(&map[..actual as usize]))
    }
}

/// Read at most `len` bytes from the start of `path` without mapping it.
///
/// Samples over `max_file_size` are only ever examined through this head.
pub fn read_head<P: AsRef<Path>>(path: P, len: u64) -> Result<Bytes> {
    let path = path.as_ref();
    let with_path = |source| IoError::StdIo {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(with_path)?;
    if !file.metadata().map_err(with_path)?.is_file() {
        return Err(IoError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let mut buf = Vec::new();
    file.take(len).read_to_end(&mut buf).map_err(with_path)?;
    trace!(path = %path.display(), len = buf.len(), "Read file head");
    Ok(Bytes::from(buf))
}
