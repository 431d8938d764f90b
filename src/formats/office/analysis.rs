//! Keyword and IOC analysis over recovered VBA source.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    AutoExec,
    Suspicious,
    Ioc,
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndicatorKind::AutoExec => "AutoExec",
            IndicatorKind::Suspicious => "Suspicious",
            IndicatorKind::Ioc => "IOC",
        };
        f.write_str(s)
    }
}

/// One analysis hit: what kind, which keyword, and what it means.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacroIndicator {
    pub kind: IndicatorKind,
    pub keyword: String,
    pub description: String,
}

impl fmt::Display for MacroIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.keyword, self.description)
    }
}

const AUTOEXEC_KEYWORDS: &[(&str, &str)] = &[
    ("AutoOpen", "Runs when the Word document is opened"),
    ("Document_Open", "Runs when the Word or Publisher document is opened"),
    ("AutoExec", "Runs when Word starts"),
    ("AutoClose", "Runs when the Word document is closed"),
    ("Document_Close", "Runs when the Word document is closed"),
    ("Auto_Open", "Runs when the Excel workbook is opened"),
    ("Workbook_Open", "Runs when the Excel workbook is opened"),
    ("Auto_Close", "Runs when the Excel workbook is closed"),
    ("Workbook_Close", "Runs when the Excel workbook is closed"),
];

const SUSPICIOUS_KEYWORDS: &[(&str, &str)] = &[
    ("Shell", "May run an executable file or a system command"),
    ("WScript.Shell", "May run an executable file or a system command"),
    ("Run", "May run an executable file or a system command"),
    ("CreateObject", "May create an OLE object"),
    ("GetObject", "May get an OLE object with a running instance"),
    ("URLDownloadToFile", "May download files from the Internet"),
    ("Microsoft.XMLHTTP", "May download files from the Internet"),
    ("ADODB.Stream", "May create a text file"),
    ("SaveToFile", "May create a text file"),
    ("Open", "May open a file"),
    ("Write", "May write to a file (if combined with Open)"),
    ("Put", "May write to a file (if combined with Open)"),
    ("Kill", "May delete a file"),
    ("Environ", "May read system environment variables"),
    ("Chr", "May attempt to obfuscate specific strings"),
    ("ChrW", "May attempt to obfuscate specific strings"),
    ("StrReverse", "May attempt to obfuscate specific strings"),
    ("Base64", "May decode Base64 encoded content"),
    ("Lib", "May run code from a DLL"),
    ("CallByName", "May attempt to obfuscate malicious function calls"),
    ("powershell", "May run PowerShell commands"),
    ("cmd.exe", "May run a Windows command"),
    ("VBProject", "May modify the VBA project"),
];

struct KeywordTable {
    matcher: AhoCorasick,
    entries: Vec<(IndicatorKind, &'static str, &'static str)>,
}

static KEYWORDS: Lazy<KeywordTable> = Lazy::new(|| {
    let entries: Vec<_> = AUTOEXEC_KEYWORDS
        .iter()
        .map(|(k, d)| (IndicatorKind::AutoExec, *k, *d))
        .chain(
            SUSPICIOUS_KEYWORDS
                .iter()
                .map(|(k, d)| (IndicatorKind::Suspicious, *k, *d)),
        )
        .collect();
    let matcher = AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::Standard)
        .build(entries.iter().map(|(_, k, _)| *k))
        .expect("valid macro keyword patterns");
    KeywordTable { matcher, entries }
});

static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?|ftp)://[^\s'"<>()]+"#).expect("valid URL regex")
});

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Keyword hits must sit on identifier boundaries (`Shell` but not `ShellExecuteEx`).
fn on_boundary(source: &[u8], start: usize, end: usize) -> bool {
    let before = start == 0 || !is_word_byte(source[start - 1]);
    let after = end == source.len() || !is_word_byte(source[end]);
    before && after
}

/// Analyse macro source, one indicator per distinct keyword or URL.
pub fn analyze(source: &str) -> Vec<MacroIndicator> {
    let bytes = source.as_bytes();
    let table = &*KEYWORDS;
    let mut hits = BTreeSet::new();

    for m in table.matcher.find_overlapping_iter(bytes) {
        if !on_boundary(bytes, m.start(), m.end()) {
            continue;
        }
        let (kind, keyword, description) = table.entries[m.pattern().as_usize()];
        hits.insert(MacroIndicator {
            kind,
            keyword: keyword.to_string(),
            description: description.to_string(),
        });
    }

    for url in RE_URL.find_iter(source) {
        hits.insert(MacroIndicator {
            kind: IndicatorKind::Ioc,
            keyword: url.as_str().trim_end_matches(&['.', ',', ';'][..]).to_string(),
            description: "URL".to_string(),
        });
    }

    hits.into_iter().collect()
}
