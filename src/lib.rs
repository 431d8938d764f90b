//! Static triage of malware samples.
//!
//! A [`Scanner`] classifies a file from its content, extracts Office, PDF or
//! PE features, matches it against a compiled signature rule set, and when
//! the file is a container unpacks it into a scratch directory next to the
//! sample, scans each member once and removes the scratch directory again.
//!
//! ```no_run
//! use sample_triage::{ScanConfig, Scanner};
//!
//! let (scanner, _report) = Scanner::from_config(ScanConfig::default())?;
//! let record = scanner.scan("sample.bin")?;
//! println!("{}", serde_json::to_string(&record).unwrap());
//! # Ok::<(), sample_triage::ScanError>(())
//! ```

/// Core data types
pub mod core;
pub mod entropy;
pub mod error;
pub mod formats;
pub mod hashing;
pub mod io;
pub mod logging;
pub mod rules;
pub mod timeout;
pub mod triage;

pub use crate::core::triage::{
    AggregationRecord, ContainerFlags, ContainerKind, FeatureMap, FeatureRecord, FeatureValue,
    FileClassification, FormatCategory, IssueKind, MemberRecord, ScanIssue, ScanStage,
};
pub use crate::error::{Result, ScanError};
pub use crate::rules::{CompileReport, RuleSet};
pub use crate::triage::config::ScanConfig;
pub use crate::triage::recurse::Scanner;
