//! Entropy primitives used by the aggregation record and the executable extractor.

use std::ops::Range;

/// Calculates the Shannon entropy of a byte slice.
///
/// Returns a value between 0.0 and 8.0, where:
/// - 0.0 represents no randomness (e.g., all bytes are the same)
/// - 8.0 represents maximum randomness (uniform distribution)
#[inline]
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    // Build histogram in a single pass
    let mut histogram = [0usize; 256];
    for &byte in data {
        histogram[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in &histogram {
        if count == 0 {
            continue;
        }
        let p = (count as f64) / len;
        entropy -= p * p.log2();
    }

    entropy
}

/// Calculates entropy for a byte range, clamped to the slice bounds.
#[inline]
pub fn entropy_range(data: &[u8], range: Range<usize>) -> f64 {
    let start = range.start.min(data.len());
    let end = range.end.min(data.len());
    if start >= end {
        return 0.0;
    }
    shannon_entropy(&data[start..end])
}

/// Size-derived metrics stored alongside the entropy of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeMetrics {
    pub entropy: f64,
    /// `entropy * size`, a rough lower bound on the compressed size in bits per byte units.
    pub min_possible_size: f64,
    pub size_mod_8: u64,
}

impl SizeMetrics {
    pub fn from_bytes(data: &[u8]) -> Self {
        let entropy = shannon_entropy(data);
        let size = data.len() as u64;
        Self {
            entropy,
            min_possible_size: entropy * size as f64,
            size_mod_8: size % 8,
        }
    }
}
