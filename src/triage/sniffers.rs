//! Content and extension sniffers for initial classification.
//!
//! Content detection runs the structure probes in `magic`, then `infer`,
//! then a text/binary fallback. `mime_guess` supplies an extension hint that
//! is only ever compared against the content result, never used for dispatch.

use crate::core::triage::{
    FileClassification, IssueKind, ScanIssue, ScanStage, SnifferSource, TriageHint,
};
use crate::error::Result;
use crate::io::{read_head, SafeReader};
use crate::triage::config::IOConfig;
use crate::triage::magic::{self, PROBES};
use std::path::Path;
use tracing::{debug, info, warn};

pub const MIME_EMPTY: &str = "application/x-empty";
pub const MIME_OCTET: &str = "application/octet-stream";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_HTML: &str = "text/html";

/// Coarse label used to compare content and extension hints.
pub fn label_for_mime(mime: &str) -> Option<&'static str> {
    let m = mime.to_ascii_lowercase();
    if m == magic::MIME_DOSEXEC
        || m.contains("msdownload")
        || m.contains("portable-executable")
        || m.contains("msdos-program")
    {
        Some("pe")
    } else if m.contains("openxmlformats") || m.contains("macroenabled") || m.contains("zip") || m == magic::MIME_JAR {
        Some("zip")
    } else if m == magic::MIME_MSWORD
        || m == magic::MIME_MSEXCEL
        || m == magic::MIME_MSPPT
        || m.contains("cdfv2")
        || m.contains("ole-storage")
    {
        Some("ole")
    } else if m.contains("rar") {
        Some("rar")
    } else if m.contains("pdf") {
        Some("pdf")
    } else {
        None
    }
}

fn text_fallback(data: &[u8]) -> (String, &'static str) {
    if data.is_empty() {
        return ("empty".to_string(), MIME_EMPTY);
    }
    let head = &data[..data.len().min(512)];
    let lowered = String::from_utf8_lossy(head).to_ascii_lowercase();
    let trimmed = lowered.trim_start();
    let text = data
        .iter()
        .all(|&b| matches!(b, 0x09 | 0x0a | 0x0c | 0x0d | 0x20..=0x7e));
    if trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html") {
        let desc = if text {
            "HTML document, ASCII text"
        } else {
            "HTML document"
        };
        return (desc.to_string(), MIME_HTML);
    }
    if text {
        return ("ASCII text".to_string(), MIME_TEXT);
    }
    if !data.contains(&0) && std::str::from_utf8(data).is_ok() {
        return ("UTF-8 Unicode text".to_string(), MIME_TEXT);
    }
    ("data".to_string(), MIME_OCTET)
}

/// Sniffer for content-based file type detection.
pub struct ContentSniffer;

impl ContentSniffer {
    /// Classify `data` and report which detector produced the answer.
    pub fn sniff_bytes(data: &[u8]) -> (FileClassification, TriageHint) {
        debug!(len = data.len(), "sniffing content");

        for probe in PROBES {
            if let Some((desc, mime)) = probe(data) {
                let hint = TriageHint::new(
                    SnifferSource::Magic,
                    Some(mime.to_string()),
                    None,
                    label_for_mime(mime).map(str::to_string),
                );
                return (FileClassification::new(desc, mime), hint);
            }
        }

        if let Some(kind) = infer::get(data) {
            let hint = TriageHint::new(
                SnifferSource::Infer,
                Some(kind.mime_type().to_string()),
                None,
                Some(kind.extension().to_string()),
            );
            return (
                FileClassification::new(format!("{} data", kind.extension()), kind.mime_type()),
                hint,
            );
        }

        let (desc, mime) = text_fallback(data);
        let hint = TriageHint::new(SnifferSource::Other, Some(mime.to_string()), None, None);
        (FileClassification::new(desc, mime), hint)
    }

    /// Classify from at most `limit` leading bytes of `data`.
    ///
    /// Compound-file and zip refinement read their directory, which sits
    /// past any prefix, so those two probes see the whole of `data`.
    pub fn sniff_bounded(data: &[u8], limit: usize) -> (FileClassification, TriageHint) {
        let head = &data[..data.len().min(limit)];
        if head.len() < data.len() {
            let indexed = if head.starts_with(magic::OLE_MAGIC) {
                magic::probe_ole(data)
            } else {
                magic::probe_zip(head).and_then(|_| magic::probe_zip(data))
            };
            if let Some((desc, mime)) = indexed {
                let hint = TriageHint::new(
                    SnifferSource::Magic,
                    Some(mime.to_string()),
                    None,
                    label_for_mime(mime).map(str::to_string),
                );
                return (FileClassification::new(desc, mime), hint);
            }
        }
        Self::sniff_bytes(head)
    }
}

/// Classify an in-memory buffer.
pub fn classify_bytes(data: &[u8]) -> FileClassification {
    ContentSniffer::sniff_bytes(data).0
}

/// Sniffer for extension-based file type detection using `mime_guess`.
pub struct ExtensionSniffer;

impl ExtensionSniffer {
    pub fn sniff_path(path: &Path) -> Option<TriageHint> {
        let extension_str = path.extension()?.to_str()?;
        let mime = mime_guess::from_ext(extension_str).first()?.to_string();
        let label = label_for_mime(&mime).map(str::to_string);
        Some(TriageHint::new(
            SnifferSource::MimeGuess,
            Some(mime),
            Some(extension_str.to_string()),
            label,
        ))
    }
}

/// Detect a disagreement between content and extension labels.
pub fn detect_conflict(content: &TriageHint, extension: &TriageHint) -> Option<ScanIssue> {
    let (Some(c), Some(e)) = (&content.label, &extension.label) else {
        return None;
    };
    if c == e {
        return None;
    }
    Some(ScanIssue::new(
        ScanStage::Sniffing,
        IssueKind::SnifferMismatch,
        format!(
            "content suggests {} but extension .{} suggests {}",
            c,
            extension.extension.as_deref().unwrap_or(""),
            e
        ),
    ))
}

/// Full sniffing result for one file.
#[derive(Debug, Clone)]
pub struct SniffReport {
    pub classification: FileClassification,
    /// Description of the leading buffer classified on its own.
    pub magic_buffer: String,
    pub content_hint: TriageHint,
    pub extension_hint: Option<TriageHint>,
    pub issues: Vec<ScanIssue>,
}

/// Path-level classifier.
#[derive(Debug, Clone, Default)]
pub struct TypeSniffer {
    config: IOConfig,
}

impl TypeSniffer {
    pub fn new(config: IOConfig) -> Self {
        Self { config }
    }

    fn sniff_limit(&self) -> usize {
        usize::try_from(self.config.max_sniff_size).unwrap_or(usize::MAX)
    }

    /// Classify the file at `path` from its content.
    pub fn classify<P: AsRef<Path>>(&self, path: P) -> Result<FileClassification> {
        let mut reader = SafeReader::open(path.as_ref(), self.config.limits())?;
        let data = reader.contents()?;
        Ok(ContentSniffer::sniff_bounded(data, self.sniff_limit()).0)
    }

    /// Classify plus the buffer cross-check and extension hint.
    pub fn sniff<P: AsRef<Path>>(&self, path: P) -> Result<SniffReport> {
        let path = path.as_ref();
        let mut reader = SafeReader::open(path, self.config.limits())?;
        let buffer = reader.read_prefix(self.config.buffer_sniff_size)?;
        let data = reader.contents()?;
        Ok(self.report(path, &buffer, data))
    }

    /// Like [`TypeSniffer::sniff`], but only the first `max_sniff_size`
    /// bytes are read and the size limits do not apply.
    pub fn sniff_head<P: AsRef<Path>>(&self, path: P) -> Result<SniffReport> {
        let path = path.as_ref();
        let head = read_head(path, self.config.max_sniff_size)?;
        let buffer_len = usize::try_from(self.config.buffer_sniff_size)
            .unwrap_or(usize::MAX)
            .min(head.len());
        Ok(self.report(path, &head[..buffer_len], &head))
    }

    fn report(&self, path: &Path, buffer: &[u8], data: &[u8]) -> SniffReport {
        let magic_buffer = classify_bytes(buffer).raw_description;
        let (classification, content_hint) = ContentSniffer::sniff_bounded(data, self.sniff_limit());

        let extension_hint = ExtensionSniffer::sniff_path(path);
        let mut issues = Vec::new();
        if let Some(ext) = &extension_hint {
            if let Some(issue) = detect_conflict(&content_hint, ext) {
                warn!(path = %path.display(), mime = %classification.mime_type, "{}", issue.message);
                issues.push(issue);
            }
        }

        info!(
            path = %path.display(),
            mime = %classification.mime_type,
            description = %classification.raw_description,
            source = %content_hint.source,
            "classified"
        );

        SniffReport {
            classification,
            magic_buffer,
            content_hint,
            extension_hint,
            issues,
        }
    }
}
