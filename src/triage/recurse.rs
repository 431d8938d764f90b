//! Scan orchestration: one top-level file, one level of container members.
//!
//! A scan walks `Sniffing → Dispatching → Extracting → SignatureMatching →
//! ContainerCheck → Unpacking → MemberScanning → Teardown → Done`. Every
//! stage failure other than an unreadable top-level file is recorded on the
//! record as an issue and the scan continues.

use crate::core::triage::{
    AggregationRecord, FeatureRecord, FileStat, FormatCategory, IssueKind, MemberRecord,
    ScanIssue, ScanStage,
};
use crate::entropy::SizeMetrics;
use crate::error::{Result, ScanError};
use crate::formats::office::{MacroExtractor, MacroMode};
use crate::formats::pdf::DocumentExtractor;
use crate::formats::pe::ExecutableExtractor;
use crate::hashing::FileDigests;
use crate::io::error::IoError;
use crate::io::SafeReader;
use crate::rules::{CompileReport, RuleSet};
use crate::triage::config::ScanConfig;
use crate::triage::containers;
use crate::triage::packers::detect_packers;
use crate::triage::sniffers::TypeSniffer;
use crate::triage::unpack::{ScratchArea, Unpacker};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use walkdir::WalkDir;

/// Result of one file in a batch scan.
pub type BatchEntry = (PathBuf, Result<AggregationRecord>);

/// Runs the triage pipeline against files with a shared rule set.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: ScanConfig,
    rules: Arc<RuleSet>,
    sniffer: TypeSniffer,
    unpacker: Unpacker,
}

impl Scanner {
    pub fn new(config: ScanConfig, rules: Arc<RuleSet>) -> Self {
        let sniffer = TypeSniffer::new(config.io.clone());
        let unpacker = Unpacker::new(config.unpack.clone(), config.io.limits());
        Self {
            config,
            rules,
            sniffer,
            unpacker,
        }
    }

    /// Compile the configured rule directory, if any, and build a scanner around it.
    pub fn from_config(config: ScanConfig) -> Result<(Self, Option<CompileReport>)> {
        let (rules, report) = match &config.rules.rule_dir {
            Some(dir) => {
                let (rules, report) = RuleSet::compile(dir, &config.rules)?;
                (rules, Some(report))
            }
            None => (RuleSet::empty(), None),
        };
        Ok((Self::new(config, Arc::new(rules)), report))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    /// Scan one file. Only an unreadable `path` is an error.
    pub fn scan<P: AsRef<Path>>(&self, path: P) -> Result<AggregationRecord> {
        let path = path.as_ref();
        let span = info_span!("scan", path = %path.display());
        let _guard = span.enter();

        let pipeline = &self.config.pipeline;
        let mut reader = match SafeReader::open(path, self.config.io.limits()) {
            Ok(reader) => reader,
            Err(e @ IoError::FileTooLarge { .. }) => return self.scan_head_only(path, e),
            Err(e) => return Err(e.into()),
        };
        let data = match reader.contents() {
            Ok(data) => data,
            Err(e @ IoError::ReadLimitExceeded { .. }) => return self.scan_head_only(path, e),
            Err(e) => return Err(e.into()),
        };

        // Sniffing
        let sniff = self.sniffer.sniff(path)?;
        let mut record = AggregationRecord::new(path.to_path_buf(), sniff.classification);
        record.magic_buffer = Some(sniff.magic_buffer);
        record.extension_mime = sniff.extension_hint.and_then(|h| h.mime);
        record.issues.extend(sniff.issues);
        record.stat = std::fs::metadata(path).ok().map(|m| FileStat::from_metadata(&m));

        let digests = FileDigests::compute(data);
        let metrics = SizeMetrics::from_bytes(data);
        record.md5 = digests.md5;
        record.sha1 = digests.sha1;
        record.sha256 = digests.sha256;
        record.size = data.len() as u64;
        record.entropy = metrics.entropy;
        record.min_possible_size = metrics.min_possible_size;
        record.size_mod_8 = metrics.size_mod_8;

        // Dispatching
        record.category = FormatCategory::dispatch(&record.classification.mime_type);
        record.macro_presence_possible = record.category.macro_presence_possible();
        debug!(
            stage = %ScanStage::Dispatching,
            mime = %record.classification.mime_type,
            category = ?record.category,
            "dispatched"
        );

        // Extracting
        if pipeline.extract_features {
            match self.extract_features(path, record.category, &mut record.issues) {
                Ok(features) => record.features = features,
                Err(e) => {
                    warn!(
                        stage = %ScanStage::Extracting,
                        mime = %record.classification.mime_type,
                        error = %e,
                        "feature extraction failed"
                    );
                    record.push_issue(ScanIssue::from_error(ScanStage::Extracting, &e));
                }
            }
        }

        // SignatureMatching
        if pipeline.match_signatures {
            match self.rules.try_match_file(path) {
                Ok(matches) => record.signature_matches = matches,
                Err(e) => {
                    warn!(stage = %ScanStage::SignatureMatching, error = %e, "signature matching failed");
                    record.push_issue(ScanIssue::from_error(ScanStage::SignatureMatching, &e));
                }
            }
        }
        if pipeline.detect_packers {
            record.packers = detect_packers(data, pipeline.packer_scan_limit);
        }
        drop(reader);

        // ContainerCheck
        record.container_flags = containers::inspect(&record.classification);
        record.container_kind = record.container_flags.primary();

        if pipeline.unpack_containers && record.container_flags.is_container() {
            self.unpack_and_scan(&mut record);
        }

        info!(
            stage = %ScanStage::Done,
            mime = %record.classification.mime_type,
            container = %record.container_kind,
            matches = record.signature_matches.len(),
            members = record.members.len(),
            issues = record.issues.len(),
            "scan complete"
        );
        Ok(record)
    }

    /// Record for a sample over the size or read caps: stat, size and a
    /// classification of its head. Hashing and every later stage are skipped.
    fn scan_head_only(&self, path: &Path, cause: IoError) -> Result<AggregationRecord> {
        let sniff = self.sniffer.sniff_head(path)?;
        let mut record = AggregationRecord::new(path.to_path_buf(), sniff.classification);
        record.magic_buffer = Some(sniff.magic_buffer);
        record.extension_mime = sniff.extension_hint.and_then(|h| h.mime);
        record.issues.extend(sniff.issues);

        let metadata = std::fs::metadata(path).map_err(|e| ScanError::io(path, e))?;
        record.size = metadata.len();
        record.size_mod_8 = record.size % 8;
        record.stat = Some(FileStat::from_metadata(&metadata));
        record.category = FormatCategory::dispatch(&record.classification.mime_type);
        record.macro_presence_possible = record.category.macro_presence_possible();

        let err = ScanError::from(cause);
        warn!(
            stage = %ScanStage::Sniffing,
            size = record.size,
            error = %err,
            "sample over size cap, head classified only"
        );
        record.push_issue(ScanIssue::from_error(ScanStage::Sniffing, &err));
        Ok(record)
    }

    fn extract_features(
        &self,
        path: &Path,
        category: FormatCategory,
        issues: &mut Vec<ScanIssue>,
    ) -> Result<Option<FeatureRecord>> {
        let limits = self.config.io.limits();
        match category {
            FormatCategory::Office => {
                let report = MacroExtractor::new(MacroMode::Strict, limits).extract(path)?;
                if report.is_none() {
                    info!(path = %path.display(), "no macro content");
                }
                Ok(report.map(|r| r.to_feature_record()))
            }
            FormatCategory::Document => {
                let report = DocumentExtractor::new(limits).extract(path)?;
                if let Some(reason) = &report.lossy {
                    warn!(stage = %ScanStage::Extracting, path = %path.display(), reason = %reason, "lexical pdf counts only");
                    issues.push(ScanIssue::new(
                        ScanStage::Extracting,
                        IssueKind::MalformedInput,
                        format!("pdf object model unavailable, lexical counts only: {}", reason),
                    ));
                }
                Ok(Some(report.into_feature_record()))
            }
            FormatCategory::Executable => ExecutableExtractor::new(limits).extract(path).map(Some),
            FormatCategory::Compressed
            | FormatCategory::Packed
            | FormatCategory::Web
            | FormatCategory::NonMacro => {
                info!(path = %path.display(), category = ?category, "no feature extractor for category");
                Ok(None)
            }
            FormatCategory::Unknown => Ok(None),
        }
    }

    fn unpack_and_scan(&self, record: &mut AggregationRecord) {
        let mut scratch =
            ScratchArea::for_container(&record.path, &self.config.unpack.scratch_suffix);
        let scratch_path = scratch.path().to_path_buf();

        // Unpacking
        let outcome = self
            .unpacker
            .unpack(&record.path, &record.container_flags, &mut scratch);
        record.issues.extend(outcome.issues);
        debug!(
            stage = %ScanStage::Unpacking,
            scratch = %scratch_path.display(),
            members = outcome.members.len(),
            "container unpacked"
        );

        // MemberScanning
        for member in &outcome.members {
            record.members.push(self.scan_member(member, &scratch_path));
        }

        // Teardown
        drop(scratch);
        if scratch_path.exists() {
            record.push_issue(ScanIssue::new(
                ScanStage::Teardown,
                IssueKind::Io,
                format!("scratch area {} was not removed", scratch_path.display()),
            ));
        }
    }

    /// Sniff and match one extracted member. Members are never unpacked further.
    fn scan_member(&self, member: &Path, scratch: &Path) -> MemberRecord {
        let relative = member.strip_prefix(scratch).unwrap_or(member).to_path_buf();
        let mut out = MemberRecord {
            path: relative,
            size: std::fs::metadata(member).map(|m| m.len()).unwrap_or(0),
            classification: None,
            signature_matches: Default::default(),
            issues: Vec::new(),
        };

        match self.sniffer.classify(member) {
            Ok(classification) => {
                debug!(
                    member = %out.path.display(),
                    mime = %classification.mime_type,
                    "member classified"
                );
                out.classification = Some(classification);
            }
            Err(e) => {
                warn!(member = %member.display(), error = %e, "member sniffing failed");
                if matches!(e, ScanError::Budget(_)) {
                    out.classification = self
                        .sniffer
                        .sniff_head(member)
                        .ok()
                        .map(|r| r.classification);
                }
                out.issues.push(ScanIssue::from_error(ScanStage::MemberScanning, &e));
            }
        }

        if self.config.pipeline.match_signatures {
            match self.rules.try_match_file(member) {
                Ok(matches) => out.signature_matches = matches,
                Err(e) => {
                    warn!(member = %member.display(), error = %e, "member signature matching failed");
                    out.issues.push(ScanIssue::from_error(ScanStage::MemberScanning, &e));
                }
            }
        }
        out
    }

    /// Every regular file below `dir`, sorted. Collected before any scan starts.
    pub fn collect_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ScanError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Scan every regular file below `dir` in parallel, in path order.
    pub fn scan_directory<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<BatchEntry>> {
        let files = Self::collect_files(dir.as_ref())?;
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = self.config.pipeline.jobs {
            builder = builder.num_threads(jobs);
        }
        let pool = builder
            .build()
            .map_err(|e| ScanError::Config(format!("cannot build worker pool: {}", e)))?;

        info!(dir = %dir.as_ref().display(), files = files.len(), "batch scan started");
        let results = pool.install(|| {
            files
                .par_iter()
                .map(|path| (path.clone(), self.scan(path)))
                .collect::<Vec<_>>()
        });
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(files = results.len(), failed, "batch scan finished");
        Ok(results)
    }
}
