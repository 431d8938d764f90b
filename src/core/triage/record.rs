//! The per-file aggregation record.

use super::containers::{ContainerFlags, ContainerKind, MemberRecord};
use super::errors::{IssueKind, ScanIssue, ScanStage};
use super::features::FeatureRecord;
use super::formats::FormatCategory;
use super::hints::FileClassification;
use super::packers::PackerMatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::Metadata;
use std::path::PathBuf;

/// Filesystem metadata of a sample. Fields the platform does not expose stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileStat {
    pub accessed: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub changed: Option<DateTime<Utc>>,
    pub mode: Option<u32>,
    pub inode: Option<u64>,
    pub device: Option<u64>,
    pub nlink: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl FileStat {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            changed: DateTime::<Utc>::from_timestamp(meta.ctime(), meta.ctime_nsec() as u32),
            mode: Some(meta.mode()),
            inode: Some(meta.ino()),
            device: Some(meta.dev()),
            nlink: Some(meta.nlink()),
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            changed: meta.created().ok().map(DateTime::<Utc>::from),
            ..Default::default()
        }
    }
}

/// Everything learned about one top-level file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRecord {
    pub path: PathBuf,
    pub file_name: String,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub size: u64,
    pub entropy: f64,
    pub min_possible_size: f64,
    pub size_mod_8: u64,
    #[serde(flatten)]
    pub classification: FileClassification,
    /// Classification of the leading 1024 bytes alone; diagnostic only.
    pub magic_buffer: Option<String>,
    pub extension_mime: Option<String>,
    pub category: FormatCategory,
    pub container_kind: ContainerKind,
    pub container_flags: ContainerFlags,
    pub features: Option<FeatureRecord>,
    pub signature_matches: BTreeSet<String>,
    pub macro_presence_possible: bool,
    pub packers: Vec<PackerMatch>,
    pub members: Vec<MemberRecord>,
    pub issues: Vec<ScanIssue>,
    pub stat: Option<FileStat>,
    pub scanned_at: DateTime<Utc>,
}

impl AggregationRecord {
    /// A record with identity fields filled and every derived field empty.
    pub fn new(path: PathBuf, classification: FileClassification) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            md5: String::new(),
            sha1: String::new(),
            sha256: String::new(),
            size: 0,
            entropy: 0.0,
            min_possible_size: 0.0,
            size_mod_8: 0,
            classification,
            magic_buffer: None,
            extension_mime: None,
            category: FormatCategory::Unknown,
            container_kind: ContainerKind::None,
            container_flags: ContainerFlags::default(),
            features: None,
            signature_matches: BTreeSet::new(),
            macro_presence_possible: true,
            packers: Vec::new(),
            members: Vec::new(),
            issues: Vec::new(),
            stat: None,
            scanned_at: Utc::now(),
        }
    }

    pub fn push_issue(&mut self, issue: ScanIssue) {
        self.issues.push(issue);
    }

    pub fn has_issue(&self, stage: ScanStage, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.stage == stage && i.kind == kind)
    }
}
