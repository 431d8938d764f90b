//! Classification and sniffer hint types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content classification of one file, produced once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileClassification {
    /// libmagic-style description, e.g. "PE32 executable (GUI) Intel 80386, for MS Windows".
    pub raw_description: String,
    pub mime_type: String,
}

impl FileClassification {
    pub fn new(raw_description: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            raw_description: raw_description.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Source of a sniffer hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnifferSource {
    /// Own magic table and structure probes
    Magic,
    Infer,
    MimeGuess,
    Other,
}

impl fmt::Display for SnifferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnifferSource::Magic => write!(f, "Magic"),
            SnifferSource::Infer => write!(f, "Infer"),
            SnifferSource::MimeGuess => write!(f, "MimeGuess"),
            SnifferSource::Other => write!(f, "Other"),
        }
    }
}

/// A single sniffer hint derived from content or extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageHint {
    pub source: SnifferSource,
    /// MIME type if available
    pub mime: Option<String>,
    /// File extension hint if available (e.g., from `mime_guess` or path)
    pub extension: Option<String>,
    /// A coarse label/class (e.g., "zip", "pe", "ole")
    pub label: Option<String>,
}

impl TriageHint {
    pub fn new(
        source: SnifferSource,
        mime: Option<String>,
        extension: Option<String>,
        label: Option<String>,
    ) -> Self {
        Self {
            source,
            mime,
            extension,
            label,
        }
    }
}
