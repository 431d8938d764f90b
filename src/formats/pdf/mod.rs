//! PDF document features.
//!
//! Documents are loaded with `lopdf`. Indirect objects, their `/Type` names,
//! action keys, the catalog reference and the header version come from the
//! parsed object model. Top-level comments, `xref` tables, trailers and
//! `startxref` markers are not part of that model, so they are counted by a
//! lexical walk over the file body that steps over stream payloads by their
//! declared `/Length`.
//!
//! When `lopdf` rejects a document the lexical walk supplies every count and
//! the report is marked lossy.

use crate::core::triage::{FeatureMap, FeatureRecord};
use crate::error::{Result, ScanError};
use crate::io::{IOLimits, SafeReader};
use crate::timeout::IterationTimeout;
use lopdf::{Dictionary, Document, Object};
use memchr::memmem;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8] = b"%PDF";
const HEADER_WINDOW: usize = 1024;
const MAX_NESTING: usize = 32;
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 60;

/// Dictionary keys tallied across the object model, with their feature names.
const ACTION_KEYS: &[(&[u8], &str)] = &[
    (b"JS", "js"),
    (b"JavaScript", "javascript"),
    (b"OpenAction", "open_action"),
    (b"AA", "aa"),
    (b"Launch", "launch"),
    (b"URI", "uri"),
    (b"AcroForm", "acro_form"),
    (b"EmbeddedFiles", "embedded_files"),
];

static RE_OBJ_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+(\d+)\s+obj\b").expect("valid object header regex"));
static RE_ROOT_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Root\s+(\d+)\s+(\d+)\s+R").expect("valid root reference regex"));
static RE_LENGTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/Length\s+(\d+)(\s+\d+\s+R)?").expect("valid stream length regex")
});
static RE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^%PDF-(\d\.\d)").expect("valid header regex"));

/// One top-level element of a PDF body, as seen by the lexical walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfElement {
    Comment(String),
    Xref(String),
    Trailer { dictionary: String },
    StartXref(Option<u64>),
    IndirectObject {
        id: u32,
        generation: u16,
        object_type: Option<String>,
        dictionary: Option<String>,
    },
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    pos
}

fn line_end(data: &[u8], pos: usize) -> usize {
    data[pos..]
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .map_or(data.len(), |n| pos + n)
}

/// Keyword at `pos` followed by a non-regular byte or end of input.
fn keyword_at(data: &[u8], pos: usize, keyword: &[u8]) -> bool {
    data[pos..].starts_with(keyword)
        && data
            .get(pos + keyword.len())
            .map_or(true, |&b| !is_regular(b))
}

/// Skip a literal string starting at `(`, honouring nesting and escapes.
fn skip_literal_string(data: &[u8], mut pos: usize) -> usize {
    let mut depth = 0usize;
    while pos < data.len() {
        match data[pos] {
            b'\\' => pos += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return pos + 1;
                }
            }
            _ => {}
        }
        pos += 1;
    }
    data.len()
}

/// End (exclusive) of the dictionary opening at `start`; end of input if unbalanced.
fn dictionary_end(data: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < data.len() {
        if data[pos..].starts_with(b"<<") {
            depth += 1;
            pos += 2;
        } else if data[pos..].starts_with(b">>") {
            depth = depth.saturating_sub(1);
            pos += 2;
            if depth == 0 {
                return pos;
            }
        } else if data[pos] == b'(' {
            pos = skip_literal_string(data, pos);
        } else if data[pos] == b'<' {
            // hex string
            pos = memchr::memchr(b'>', &data[pos..]).map_or(data.len(), |n| pos + n + 1);
        } else {
            pos += 1;
        }
    }
    data.len()
}

/// Name value of `key` in the outermost level of `dict`.
pub fn top_level_name(dict: &[u8], key: &[u8]) -> Option<String> {
    let mut depth = 0usize;
    let mut pos = 0;
    while pos < dict.len() {
        if dict[pos..].starts_with(b"<<") {
            depth += 1;
            pos += 2;
        } else if dict[pos..].starts_with(b">>") {
            depth = depth.saturating_sub(1);
            pos += 2;
        } else if dict[pos] == b'(' {
            pos = skip_literal_string(dict, pos);
        } else if dict[pos] == b'<' {
            pos = memchr::memchr(b'>', &dict[pos..]).map_or(dict.len(), |n| pos + n + 1);
        } else if dict[pos] == b'[' {
            depth += 1;
            pos += 1;
        } else if dict[pos] == b']' {
            depth = depth.saturating_sub(1);
            pos += 1;
        } else if depth == 1 && dict[pos] == b'/' && keyword_at(dict, pos + 1, key) {
            let value = skip_whitespace(dict, pos + 1 + key.len());
            if dict.get(value) != Some(&b'/') {
                return None;
            }
            let end = dict[value + 1..]
                .iter()
                .position(|&b| !is_regular(b))
                .map_or(dict.len(), |n| value + 1 + n);
            return Some(String::from_utf8_lossy(&dict[value..end]).into_owned());
        } else {
            pos += 1;
        }
    }
    None
}

/// Walk the body of a PDF and return its top-level elements in file order.
pub fn scan_elements(data: &[u8]) -> Result<Vec<PdfElement>> {
    let mut guard = IterationTimeout::new(DEFAULT_SCAN_TIMEOUT_SECS, "pdf element scan");
    scan_elements_with(data, &mut guard)
}

pub fn scan_elements_with(data: &[u8], guard: &mut IterationTimeout) -> Result<Vec<PdfElement>> {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    let start = memmem::find(window, PDF_MAGIC)
        .ok_or_else(|| ScanError::MalformedInput("no PDF header".into()))?;

    let mut elements = Vec::new();
    let mut pos = start;
    while pos < data.len() {
        guard.check()?;
        pos = skip_whitespace(data, pos);
        if pos >= data.len() {
            break;
        }

        if data[pos] == b'%' {
            let end = line_end(data, pos);
            elements.push(PdfElement::Comment(
                String::from_utf8_lossy(&data[pos..end]).into_owned(),
            ));
            pos = end;
        } else if keyword_at(data, pos, b"xref") {
            let end = memmem::find(&data[pos..], b"trailer").map_or(data.len(), |n| pos + n);
            elements.push(PdfElement::Xref(
                String::from_utf8_lossy(&data[pos + 4..end]).trim().to_string(),
            ));
            pos = end;
        } else if keyword_at(data, pos, b"trailer") {
            let dict_start = skip_whitespace(data, pos + 7);
            let end = if data[dict_start..].starts_with(b"<<") {
                dictionary_end(data, dict_start)
            } else {
                dict_start
            };
            elements.push(PdfElement::Trailer {
                dictionary: String::from_utf8_lossy(&data[dict_start..end]).into_owned(),
            });
            pos = end.max(pos + 7);
        } else if keyword_at(data, pos, b"startxref") {
            let num_start = skip_whitespace(data, pos + 9);
            let num_end = data[num_start..]
                .iter()
                .position(|b| !b.is_ascii_digit())
                .map_or(data.len(), |n| num_start + n);
            let offset = std::str::from_utf8(&data[num_start..num_end])
                .ok()
                .and_then(|s| s.parse().ok());
            elements.push(PdfElement::StartXref(offset));
            pos = num_end.max(pos + 9);
        } else if let Some(caps) = RE_OBJ_HEADER.captures(&data[pos..]) {
            let header_len = caps.get(0).map_or(0, |m| m.end());
            let id = parse_capture(&caps, 1).unwrap_or(0);
            let generation = parse_capture(&caps, 2).unwrap_or(0) as u16;
            let (element, end) = read_object(data, pos + header_len, id, generation);
            elements.push(element);
            pos = end;
        } else {
            // Stray token between elements.
            pos += 1;
            while pos < data.len() && is_regular(data[pos]) {
                pos += 1;
            }
        }
    }

    debug!(elements = elements.len(), iterations = guard.iterations(), "pdf elements scanned");
    Ok(elements)
}

fn parse_capture(caps: &regex::bytes::Captures<'_>, idx: usize) -> Option<u32> {
    let m = caps.get(idx)?;
    std::str::from_utf8(m.as_bytes()).ok()?.parse().ok()
}

/// Direct `/Length` of a stream dictionary; `None` when absent or indirect.
fn direct_length(dict: &[u8]) -> Option<usize> {
    let caps = RE_LENGTH.captures(dict)?;
    if caps.get(2).is_some() {
        return None;
    }
    std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?.parse().ok()
}

/// End (exclusive) of the stream whose keyword starts at `stream_at`.
fn stream_end(data: &[u8], stream_at: usize, length: Option<usize>) -> usize {
    let mut body = stream_at + b"stream".len();
    if data.get(body) == Some(&b'\r') {
        body += 1;
    }
    if data.get(body) == Some(&b'\n') {
        body += 1;
    }
    let search_from = match length {
        Some(len) if body.saturating_add(len) <= data.len() => body + len,
        _ => body,
    };
    memmem::find(&data[search_from..], b"endstream")
        .map_or(data.len(), |n| search_from + n + b"endstream".len())
}

fn read_object(data: &[u8], body: usize, id: u32, generation: u16) -> (PdfElement, usize) {
    let dict_start = skip_whitespace(data, body);
    let (dictionary, mut after) = if data[dict_start..].starts_with(b"<<") {
        let end = dictionary_end(data, dict_start);
        (Some(&data[dict_start..end]), end)
    } else {
        (None, dict_start)
    };

    let stream_at = skip_whitespace(data, after);
    if stream_at < data.len() && keyword_at(data, stream_at, b"stream") {
        after = stream_end(data, stream_at, dictionary.and_then(direct_length));
    }
    let end = memmem::find(&data[after..], b"endobj").map_or(data.len(), |n| after + n + 6);

    let element = PdfElement::IndirectObject {
        id,
        generation,
        object_type: dictionary.and_then(|d| top_level_name(d, b"Type")),
        dictionary: dictionary.map(|d| String::from_utf8_lossy(d).into_owned()),
    };
    (element, end)
}

/// Root object reference, from the last trailer that names one, else from a
/// cross-reference stream dictionary.
pub fn resolve_root(elements: &[PdfElement]) -> Option<String> {
    let from = |dict: &str| {
        let caps = RE_ROOT_REF.captures(dict.as_bytes())?;
        let id = parse_capture(&caps, 1)?;
        let generation = parse_capture(&caps, 2)?;
        Some(format!("{} {} R", id, generation))
    };

    let trailer_root = elements.iter().rev().find_map(|e| match e {
        PdfElement::Trailer { dictionary } => from(dictionary),
        _ => None,
    });
    trailer_root.or_else(|| {
        elements.iter().rev().find_map(|e| match e {
            PdfElement::IndirectObject {
                object_type: Some(t),
                dictionary: Some(d),
                ..
            } if t == "/XRef" => from(d),
            _ => None,
        })
    })
}

fn header_version(elements: &[PdfElement]) -> Option<String> {
    elements.iter().find_map(|e| match e {
        PdfElement::Comment(text) => RE_VERSION
            .captures(text.as_bytes())
            .and_then(|c| c.get(1))
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned()),
        _ => None,
    })
}

/// Counts of the top-level tokens outside the object model.
fn token_counts(elements: &[PdfElement], f: &mut FeatureMap) {
    let count = |pred: fn(&PdfElement) -> bool| elements.iter().filter(|e| pred(e)).count();
    f.insert("comment".into(), count(|e| matches!(e, PdfElement::Comment(_))).into());
    f.insert("xref".into(), count(|e| matches!(e, PdfElement::Xref(_))).into());
    f.insert("trailer".into(), count(|e| matches!(e, PdfElement::Trailer { .. })).into());
    f.insert("start_xref".into(), count(|e| matches!(e, PdfElement::StartXref(_))).into());
}

/// Features from the lexical walk alone.
pub fn document_features(elements: &[PdfElement]) -> FeatureMap {
    let mut f = FeatureMap::new();
    token_counts(elements, &mut f);

    let mut indirect = 0usize;
    let mut names = BTreeSet::new();
    for element in elements {
        if let PdfElement::IndirectObject { object_type, .. } = element {
            indirect += 1;
            if let Some(t) = object_type {
                names.insert(t.clone());
            }
        }
    }
    f.insert("indirect_obj".into(), indirect.into());
    f.insert("names".into(), names.into_iter().collect::<Vec<_>>().into());
    if let Some(root) = resolve_root(elements) {
        f.insert("root".into(), root.into());
    }
    if let Some(v) = header_version(elements) {
        f.insert("version".into(), v.into());
    }
    f
}

fn name_of(object: &Object) -> Option<String> {
    object
        .as_name()
        .ok()
        .map(|n| format!("/{}", String::from_utf8_lossy(n)))
}

/// Visit every dictionary reachable inside `object` without following references.
fn visit_dictionaries(object: &Object, depth: usize, visit: &mut dyn FnMut(&Dictionary)) {
    if depth > MAX_NESTING {
        return;
    }
    match object {
        Object::Dictionary(dict) => {
            visit(dict);
            for (_, value) in dict.iter() {
                visit_dictionaries(value, depth + 1, visit);
            }
        }
        Object::Stream(stream) => {
            visit(&stream.dict);
            for (_, value) in stream.dict.iter() {
                visit_dictionaries(value, depth + 1, visit);
            }
        }
        Object::Array(items) => {
            for item in items {
                visit_dictionaries(item, depth + 1, visit);
            }
        }
        _ => {}
    }
}

fn catalog_reference(doc: &Document) -> Option<String> {
    let from = |dict: &Dictionary| {
        dict.get(b"Root")
            .and_then(Object::as_reference)
            .ok()
            .map(|(id, generation)| format!("{} {} R", id, generation))
    };
    from(&doc.trailer).or_else(|| {
        doc.objects.values().find_map(|object| match object {
            Object::Stream(stream)
                if stream.dict.get(b"Type").ok().and_then(name_of).as_deref() == Some("/XRef") =>
            {
                from(&stream.dict)
            }
            _ => None,
        })
    })
}

/// Features from the parsed object model.
pub fn object_model_features(doc: &Document, guard: &mut IterationTimeout) -> Result<FeatureMap> {
    let mut names = BTreeSet::new();
    let mut streams = 0usize;
    let mut actions = vec![0usize; ACTION_KEYS.len()];

    for object in doc.objects.values() {
        guard.check()?;
        if matches!(object, Object::Stream(_)) {
            streams += 1;
        }
        let top = match object {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        };
        if let Some(name) = top.and_then(|d| d.get(b"Type").ok()).and_then(name_of) {
            names.insert(name);
        }
        visit_dictionaries(object, 0, &mut |dict| {
            for (slot, (key, _)) in actions.iter_mut().zip(ACTION_KEYS) {
                if dict.has(key) {
                    *slot += 1;
                }
            }
        });
    }

    let mut f = FeatureMap::new();
    f.insert("indirect_obj".into(), doc.objects.len().into());
    f.insert("stream".into(), streams.into());
    f.insert("names".into(), names.into_iter().collect::<Vec<_>>().into());
    for (count, (_, feature)) in actions.into_iter().zip(ACTION_KEYS) {
        f.insert((*feature).into(), count.into());
    }
    f.insert("encrypted".into(), doc.trailer.has(b"Encrypt").into());
    if let Some(root) = catalog_reference(doc) {
        f.insert("root".into(), root.into());
    }
    if !doc.version.is_empty() {
        f.insert("version".into(), doc.version.clone().into());
    }
    Ok(f)
}

/// Document features and how they were obtained.
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub features: FeatureMap,
    /// Why the object model was unavailable, when only lexical counts were produced.
    pub lossy: Option<String>,
}

impl DocumentReport {
    pub fn into_feature_record(self) -> FeatureRecord {
        FeatureRecord::Document(self.features)
    }
}

/// Produces document feature records for PDF files.
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    limits: IOLimits,
    timeout_secs: u64,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(IOLimits::default())
    }
}

impl DocumentExtractor {
    pub fn new(limits: IOLimits) -> Self {
        Self {
            limits,
            timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<DocumentReport> {
        let path = path.as_ref();
        let mut reader = SafeReader::open(path, self.limits.clone())?;
        let report = self.extract_bytes(reader.contents()?)?;
        info!(
            path = %path.display(),
            objects = ?report.features.get("indirect_obj").and_then(|v| v.as_int()),
            lossy = report.lossy.is_some(),
            "document features extracted"
        );
        Ok(report)
    }

    pub fn extract_bytes(&self, data: &[u8]) -> Result<DocumentReport> {
        let mut guard = IterationTimeout::new(self.timeout_secs, "pdf element scan");
        let elements = scan_elements_with(data, &mut guard)?;

        match Document::load_mem(data) {
            Ok(doc) => {
                let mut features = object_model_features(&doc, &mut guard)?;
                token_counts(&elements, &mut features);
                Ok(DocumentReport {
                    features,
                    lossy: None,
                })
            }
            Err(e) => {
                warn!(error = %e, "pdf object model unavailable, using lexical counts");
                Ok(DocumentReport {
                    features: document_features(&elements),
                    lossy: Some(e.to_string()),
                })
            }
        }
    }
}
