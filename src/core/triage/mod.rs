//! Core triage data types organized by submodule.

pub mod containers;
pub mod errors;
pub mod features;
pub mod formats;
pub mod hints;
pub mod packers;
pub mod record;

// Re-exports for convenient access under crate::core::triage::*
pub use containers::{ContainerFlags, ContainerKind, MemberRecord};
pub use errors::{IssueKind, ScanIssue, ScanStage};
pub use features::{FeatureMap, FeatureRecord, FeatureValue};
pub use formats::FormatCategory;
pub use hints::{FileClassification, SnifferSource, TriageHint};
pub use packers::PackerMatch;
pub use record::{AggregationRecord, FileStat};
