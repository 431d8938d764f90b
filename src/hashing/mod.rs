//! Centralized module for the digests recorded on every sample.

use md5::Context as Md5Context;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Computes the MD5 digest of the given data and returns it as a hex string.
pub fn md5_digest(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Computes the SHA-1 digest of the given data and returns it as a hex string.
pub fn sha1_digest(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the SHA-256 digest of the given data and returns it as a hex string.
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// The three digests of one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigests {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl FileDigests {
    /// Hash `data` with all three algorithms, feeding each in 64KB blocks.
    pub fn compute(data: &[u8]) -> Self {
        let mut md5 = Md5Context::new();
        let mut sha1 = Sha1::new();
        let mut sha256 = Sha256::new();
        for block in data.chunks(64 * 1024) {
            md5.consume(block);
            sha1.update(block);
            sha256.update(block);
        }
        Self {
            md5: format!("{:x}", md5.compute()),
            sha1: hex::encode(sha1.finalize()),
            sha256: hex::encode(sha256.finalize()),
        }
    }
}
