//! Container classification and extracted-member types.

use super::errors::ScanIssue;
use super::hints::FileClassification;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// How a file holds further content, reduced to a single label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContainerKind {
    #[default]
    None,
    ZipFamily,
    Rar,
    MacroOffice,
    PackedExecutable,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerKind::None => "None",
            ContainerKind::ZipFamily => "ZipFamily",
            ContainerKind::Rar => "Rar",
            ContainerKind::MacroOffice => "MacroOffice",
            ContainerKind::PackedExecutable => "PackedExecutable",
        };
        f.write_str(s)
    }
}

/// Every container marker a classification carries.
///
/// An OOXML document is both `macro_office` and `zip_family`; the unpacking
/// engine acts on each set flag while the record reports `primary()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ContainerFlags {
    pub macro_office: bool,
    pub zip_family: bool,
    pub rar: bool,
    pub packed_executable: bool,
}

impl ContainerFlags {
    pub fn is_container(&self) -> bool {
        self.macro_office || self.zip_family || self.rar || self.packed_executable
    }

    /// Highest-precedence kind: MacroOffice, ZipFamily, Rar, PackedExecutable.
    pub fn primary(&self) -> ContainerKind {
        if self.macro_office {
            ContainerKind::MacroOffice
        } else if self.zip_family {
            ContainerKind::ZipFamily
        } else if self.rar {
            ContainerKind::Rar
        } else if self.packed_executable {
            ContainerKind::PackedExecutable
        } else {
            ContainerKind::None
        }
    }
}

/// Result of the one-level scan of an extracted member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Path relative to the scratch area
    pub path: PathBuf,
    pub size: u64,
    #[serde(flatten)]
    pub classification: Option<FileClassification>,
    pub signature_matches: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ScanIssue>,
}
