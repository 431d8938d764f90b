//! Configuration for the triage pipeline.
//!
//! Every section has sensible defaults and may be omitted from a JSON
//! config file; command-line flags override individual fields afterwards.

use crate::error::{Result, ScanError};
use crate::io::IOLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Master configuration for the triage pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// I/O limits for sample access.
    pub io: IOConfig,
    /// Signature rule compilation and matching.
    pub rules: RulesConfig,
    /// Container extraction.
    pub unpack: UnpackConfig,
    /// Stage toggles and batch parallelism.
    pub pipeline: PipelineConfig,
    /// Subscriber setup for the binary.
    pub logging: LoggingConfig,
}

impl ScanConfig {
    /// Load a JSON config file. Missing sections fall back to their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_json(&text)
            .map_err(|e| ScanError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ScanError::Config(e.to_string()))
    }
}

/// I/O configuration for file reading and buffering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IOConfig {
    /// Maximum prefix used for content sniffing (default: 65536).
    pub max_sniff_size: u64,
    /// Prefix classified on its own for the `magic_buffer` cross-check (default: 1024).
    pub buffer_sniff_size: u64,
    /// Maximum file size to process (default: 536870912 = 512MB).
    pub max_file_size: u64,
    /// Maximum bytes handed out per file (default: 1073741824 = 1GB).
    pub max_read_bytes: u64,
}

impl Default for IOConfig {
    fn default() -> Self {
        Self {
            max_sniff_size: crate::io::MAX_SNIFF_SIZE,
            buffer_sniff_size: crate::io::BUFFER_SNIFF_SIZE,
            max_file_size: 536_870_912,
            max_read_bytes: 1_073_741_824,
        }
    }
}

impl IOConfig {
    pub fn limits(&self) -> IOLimits {
        IOLimits {
            max_file_size: self.max_file_size,
            max_read_bytes: self.max_read_bytes,
        }
    }
}

/// Signature rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Directory walked recursively for rule files. No directory means no matching.
    pub rule_dir: Option<PathBuf>,
    /// Accepted rule file extensions, without the dot.
    pub extensions: Vec<String>,
    /// Per-scan timeout of the matcher in seconds (default: 60).
    pub scan_timeout_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rule_dir: None,
            extensions: vec!["yar".to_string(), "yara".to_string()],
            scan_timeout_secs: 60,
        }
    }
}

/// Container extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpackConfig {
    /// Appended to the container path to name its scratch directory.
    pub scratch_suffix: String,
    /// Password tried on encrypted archive entries.
    pub archive_password: String,
    /// Maximum members written per container (default: 1000).
    pub max_members: usize,
    /// Maximum uncompressed size of one member (default: 268435456 = 256MB).
    pub max_member_size: u64,
    /// Name of the file that receives extracted macro source.
    pub macro_file_name: String,
    /// External unpacker executable.
    pub upx_program: PathBuf,
    /// Unpacker subprocess timeout in seconds (default: 60).
    pub upx_timeout_secs: u64,
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self {
            scratch_suffix: "_tmp".to_string(),
            archive_password: "infected".to_string(),
            max_members: 1000,
            max_member_size: 268_435_456,
            macro_file_name: "macros.txt".to_string(),
            upx_program: PathBuf::from("upx"),
            upx_timeout_secs: 60,
        }
    }
}

/// Pipeline stage toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run the per-format feature extractors.
    pub extract_features: bool,
    /// Match signatures on the sample and its members.
    pub match_signatures: bool,
    /// Unpack containers and scan their members.
    pub unpack_containers: bool,
    /// Byte-pattern packer detection.
    pub detect_packers: bool,
    /// Maximum bytes scanned for packer signatures (default: 524288 = 512KB).
    pub packer_scan_limit: usize,
    /// Batch worker threads; `None` uses one per core.
    pub jobs: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extract_features: true,
            match_signatures: true,
            unpack_containers: true,
            detect_packers: true,
            packer_scan_limit: 524_288,
            jobs: None,
        }
    }
}

/// Logging configuration consumed by `logging::init_logging`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of text.
    pub json: bool,
    /// Optional log file, written in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}
