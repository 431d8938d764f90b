//! Signature rule compilation and matching.
//!
//! Rule files are community-sourced and frequently broken, so each file is
//! first compiled on its own. Only files that pass are merged, each under its
//! own namespace, into the single rule set shared by every scan.

use crate::error::{Result, ScanError};
use crate::triage::config::RulesConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A rule file excluded from the merged set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRule {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of `RuleSet::compile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileReport {
    pub accepted: Vec<PathBuf>,
    pub rejected: Vec<RejectedRule>,
}

impl CompileReport {
    fn reject(&mut self, path: &Path, reason: String) {
        let err = ScanError::RuleValidation {
            path: path.to_path_buf(),
            message: reason.clone(),
        };
        warn!(path = %path.display(), error = %err, "rule file excluded");
        self.rejected.push(RejectedRule {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Compiled, immutable signature rules.
pub struct RuleSet {
    rules: Option<yara_x::Rules>,
    timeout: Duration,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("compiled", &self.rules.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Namespace for a rule file: its path below the rule directory, dotted, without extension.
fn namespace_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    let ns: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().replace('.', "_"))
        .collect();
    if ns.is_empty() {
        "default".to_string()
    } else {
        ns.join(".")
    }
}

fn has_rule_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

impl RuleSet {
    /// A rule set that matches nothing.
    pub fn empty() -> Self {
        Self {
            rules: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_none()
    }

    /// Walk `dir` for rule files, validate each alone, and compile the survivors once.
    pub fn compile<P: AsRef<Path>>(dir: P, config: &RulesConfig) -> Result<(Self, CompileReport)> {
        let dir = dir.as_ref();
        let meta = std::fs::metadata(dir).map_err(|e| ScanError::io(dir, e))?;
        if !meta.is_dir() {
            return Err(ScanError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| has_rule_extension(p, &config.extensions))
            .collect();
        files.sort();

        let mut report = CompileReport::default();
        let mut valid: Vec<(PathBuf, String)> = Vec::new();
        for path in files {
            let source = match std::fs::read_to_string(&path) {
                Ok(s) => s,
                Err(e) => {
                    report.reject(&path, e.to_string());
                    continue;
                }
            };
            let mut solo = yara_x::Compiler::new();
            match solo.add_source(source.as_bytes()) {
                Ok(_) => valid.push((path, source)),
                Err(e) => report.reject(&path, e.to_string()),
            }
        }

        let mut compiler = yara_x::Compiler::new();
        for (path, source) in valid {
            let namespace = namespace_for(dir, &path);
            compiler.new_namespace(&namespace);
            match compiler.add_source(source.as_bytes()) {
                Ok(_) => {
                    debug!(path = %path.display(), namespace = %namespace, "rule file accepted");
                    report.accepted.push(path);
                }
                Err(e) => report.reject(&path, e.to_string()),
            }
        }

        let rules = if report.accepted.is_empty() {
            None
        } else {
            Some(compiler.build())
        };

        info!(
            dir = %dir.display(),
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "signature rules compiled"
        );

        Ok((
            Self {
                rules,
                timeout: Duration::from_secs(config.scan_timeout_secs),
            },
            report,
        ))
    }

    /// Identifiers of every rule matching `data`.
    pub fn try_match_bytes(&self, data: &[u8]) -> Result<BTreeSet<String>> {
        let Some(rules) = &self.rules else {
            return Ok(BTreeSet::new());
        };
        let mut scanner = yara_x::Scanner::new(rules);
        scanner.set_timeout(self.timeout);
        let results = scanner.scan(data).map_err(|e| self.scan_error(e))?;
        Ok(results
            .matching_rules()
            .map(|r| r.identifier().to_string())
            .collect())
    }

    /// Identifiers of every rule matching the file at `path`.
    pub fn try_match_file<P: AsRef<Path>>(&self, path: P) -> Result<BTreeSet<String>> {
        let Some(rules) = &self.rules else {
            return Ok(BTreeSet::new());
        };
        let mut scanner = yara_x::Scanner::new(rules);
        scanner.set_timeout(self.timeout);
        let results = scanner
            .scan_file(path.as_ref())
            .map_err(|e| self.scan_error(e))?;
        Ok(results
            .matching_rules()
            .map(|r| r.identifier().to_string())
            .collect())
    }

    /// Like `try_match_file`, but any failure yields the empty set.
    pub fn match_file<P: AsRef<Path>>(&self, path: P) -> BTreeSet<String> {
        let path = path.as_ref();
        self.try_match_file(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "signature matching failed");
            BTreeSet::new()
        })
    }

    fn scan_error(&self, err: yara_x::ScanError) -> ScanError {
        match err {
            yara_x::ScanError::Timeout => ScanError::Timeout {
                operation: "signature scan".to_string(),
                seconds: self.timeout.as_secs(),
            },
            other => ScanError::Match(other.to_string()),
        }
    }
}
