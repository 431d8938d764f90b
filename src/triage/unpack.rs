//! Container extraction into per-container scratch areas.
//!
//! Every extractor writes only below the scratch directory it is given.
//! Entry names are sanitized, symlinks are never materialized and member
//! count and size are capped by [`UnpackConfig`].

use crate::core::triage::{ContainerFlags, IssueKind, ScanIssue, ScanStage};
use crate::error::{Result, ScanError};
use crate::formats::office::{MacroExtractor, MacroMode};
use crate::io::IOLimits;
use crate::timeout::{block_on_with_timeout, TimeoutConfig};
use crate::triage::config::UnpackConfig;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// File name of the unpacker's output inside the scratch area.
pub const UPX_ARTIFACT: &str = "upx_unpacked";

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Transient extraction directory owned by one container scan.
///
/// Created on first use and removed with all its contents when dropped.
#[derive(Debug)]
pub struct ScratchArea {
    path: PathBuf,
    created: bool,
}

impl ScratchArea {
    /// Scratch area for `container`: the container path with `suffix` appended.
    pub fn for_container(container: &Path, suffix: &str) -> Self {
        let mut name: OsString = container.as_os_str().to_owned();
        name.push(suffix);
        Self {
            path: PathBuf::from(name),
            created: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Create the directory if this is the first need for it.
    ///
    /// Anything already at the scratch path belongs to someone else and is
    /// never touched; the container is then not unpacked.
    pub fn ensure(&mut self) -> Result<&Path> {
        if !self.created {
            if let Ok(meta) = fs::symlink_metadata(&self.path) {
                let what = if meta.is_dir() { "directory" } else { "file" };
                return Err(ScanError::Unpack(format!(
                    "scratch path {} is occupied by an existing {}",
                    self.path.display(),
                    what
                )));
            }
            fs::create_dir(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
            self.created = true;
            debug!(path = %self.path.display(), "scratch area created");
        }
        Ok(&self.path)
    }

    /// Regular files below the scratch area, in sorted order.
    pub fn members(&self) -> Vec<PathBuf> {
        if !self.created {
            return Vec::new();
        }
        let mut members: Vec<PathBuf> = WalkDir::new(&self.path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        members.sort();
        members
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        if !self.created {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "scratch area removed"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove scratch area"),
        }
    }
}

/// Join an archive entry name onto `dest`, refusing anything that would land outside it.
pub fn sanitize_entry_path(entry_name: &str, dest: &Path) -> Option<PathBuf> {
    let normalized = entry_name.replace('\\', "/");
    let path = Path::new(&normalized);
    if path.is_absolute() {
        return None;
    }
    let mut out = dest.to_path_buf();
    let mut pushed = false;
    for component in path.components() {
        match component {
            Component::Normal(c) => {
                out.push(c);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => return None,
        }
    }
    (pushed && out.starts_with(dest)).then_some(out)
}

/// An archive entry that was not extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
    pub budget: bool,
}

/// Outcome of one extraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub extracted: usize,
    pub skipped: Vec<SkippedEntry>,
    /// Extraction stopped at the member limit.
    pub truncated: bool,
}

impl ExtractionSummary {
    fn skip(&mut self, name: impl Into<String>, reason: impl Into<String>, budget: bool) {
        let entry = SkippedEntry {
            name: name.into(),
            reason: reason.into(),
            budget,
        };
        debug!(entry = %entry.name, reason = %entry.reason, "archive entry skipped");
        self.skipped.push(entry);
    }

    /// Issues for the orchestrator to record.
    pub fn issues(&self) -> Vec<ScanIssue> {
        let mut out: Vec<ScanIssue> = self
            .skipped
            .iter()
            .map(|s| {
                let kind = if s.budget {
                    IssueKind::BudgetExceeded
                } else {
                    IssueKind::UnpackFailure
                };
                ScanIssue::new(ScanStage::Unpacking, kind, format!("{}: {}", s.name, s.reason))
            })
            .collect();
        if self.truncated {
            out.push(ScanIssue::new(
                ScanStage::Unpacking,
                IssueKind::BudgetExceeded,
                format!("member limit reached after {} members", self.extracted),
            ));
        }
        out
    }
}

/// Reader that fails once more than `limit` bytes have been read.
struct LimitedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n as u64 > self.remaining {
            return Err(std::io::Error::other("member size limit exceeded"));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn write_member<R: Read>(reader: R, out: &Path, limit: u64) -> std::io::Result<u64> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(out)?;
    let mut limited = LimitedReader {
        inner: reader,
        remaining: limit,
    };
    let written = std::io::copy(&mut limited, &mut file);
    if written.is_err() {
        drop(file);
        let _ = fs::remove_file(out);
    }
    written
}

/// Extract every entry of the zip-family archive at `path` into `dest`.
///
/// Entries that cannot be opened are retried once with the configured
/// archive password.
pub fn extract_zip(path: &Path, dest: &Path, config: &UnpackConfig) -> Result<ExtractionSummary> {
    let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| ScanError::Unpack(format!("unreadable zip archive: {}", e)))?;
    let mut summary = ExtractionSummary::default();
    debug!(path = %path.display(), entries = archive.len(), "extracting zip archive");

    for i in 0..archive.len() {
        if summary.extracted >= config.max_members {
            summary.truncated = true;
            break;
        }

        let needs_password = archive.by_index(i).is_err();
        let entry = if needs_password {
            archive.by_index_decrypt(i, config.archive_password.as_bytes())
        } else {
            archive.by_index(i)
        };
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                summary.skip(format!("#{}", i), e.to_string(), false);
                continue;
            }
        };

        let name = entry.name().to_string();
        trace!(entry = %name, encrypted = needs_password, "zip entry");
        let Some(out) = sanitize_entry_path(&name, dest) else {
            summary.skip(name, "path escapes scratch area", false);
            continue;
        };
        if entry.unix_mode().map_or(false, |m| m & S_IFMT == S_IFLNK) {
            summary.skip(name, "symbolic link", false);
            continue;
        }
        if entry.is_dir() {
            if let Err(e) = fs::create_dir_all(&out) {
                summary.skip(name, e.to_string(), false);
            }
            continue;
        }
        if entry.size() > config.max_member_size {
            summary.skip(name, format!("{} bytes exceeds member size limit", entry.size()), true);
            continue;
        }

        match write_member(&mut entry, &out, config.max_member_size) {
            Ok(written) => {
                trace!(entry = %name, bytes = written, "member extracted");
                summary.extracted += 1;
            }
            Err(e) => summary.skip(name, e.to_string(), false),
        }
    }

    info!(
        path = %path.display(),
        extracted = summary.extracted,
        skipped = summary.skipped.len(),
        "zip extraction finished"
    );
    Ok(summary)
}

fn rar_error<E: std::fmt::Display>(err: E) -> ScanError {
    ScanError::Unpack(format!("rar: {}", err))
}

/// Extract every entry of the RAR archive at `path` into `dest`.
pub fn extract_rar(path: &Path, dest: &Path, config: &UnpackConfig) -> Result<ExtractionSummary> {
    let mut archive = unrar::Archive::new(path)
        .open_for_processing()
        .map_err(rar_error)?;
    let mut summary = ExtractionSummary::default();

    while let Some(header) = archive.read_header().map_err(rar_error)? {
        let entry = header.entry();
        let name = entry.filename.to_string_lossy().into_owned();
        let is_file = entry.is_file();
        let size = entry.unpacked_size;

        if !is_file {
            archive = header.skip().map_err(rar_error)?;
            continue;
        }
        if summary.extracted >= config.max_members {
            summary.truncated = true;
            break;
        }
        let Some(out) = sanitize_entry_path(&name, dest) else {
            summary.skip(name, "path escapes scratch area", false);
            archive = header.skip().map_err(rar_error)?;
            continue;
        };
        if size > config.max_member_size {
            summary.skip(name, format!("{} bytes exceeds member size limit", size), true);
            archive = header.skip().map_err(rar_error)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
        }
        archive = header.extract_to(&out).map_err(rar_error)?;
        summary.extracted += 1;
    }

    info!(
        path = %path.display(),
        extracted = summary.extracted,
        skipped = summary.skipped.len(),
        "rar extraction finished"
    );
    Ok(summary)
}

/// Persist the relaxed-mode macro source of `path` as one text file in `dest`.
pub fn write_macros(
    path: &Path,
    dest: &Path,
    config: &UnpackConfig,
    limits: &IOLimits,
) -> Result<ExtractionSummary> {
    let extractor = MacroExtractor::new(MacroMode::Relaxed, limits.clone());
    let mut summary = ExtractionSummary::default();
    if let Some(report) = extractor.extract(path)? {
        let out = dest.join(&config.macro_file_name);
        fs::write(&out, report.source.as_bytes()).map_err(|e| ScanError::io(&out, e))?;
        debug!(path = %out.display(), modules = report.modules.len(), "macro source written");
        summary.extracted = 1;
    }
    Ok(summary)
}

/// Run the external unpacker on `path`, writing its output into `dest`.
///
/// The child is killed when the timeout fires.
pub fn run_upx(path: &Path, dest: &Path, config: &UnpackConfig) -> Result<ExtractionSummary> {
    let out = dest.join(UPX_ARTIFACT);
    let program = config.upx_program.clone();
    let mut command = tokio::process::Command::new(&program);
    command
        .arg("-d")
        .arg(path)
        .arg("-o")
        .arg(&out)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program.display(), path = %path.display(), "running unpacker");
    let output = block_on_with_timeout(
        TimeoutConfig::new(config.upx_timeout_secs, "upx"),
        async move {
            command.output().await.map_err(|e| {
                ScanError::Unpack(format!("failed to run {}: {}", program.display(), e))
            })
        },
    )
    .map_err(|e| match e {
        ScanError::Timeout { .. } => ScanError::Unpack(format!("unpacker killed: {}", e)),
        other => other,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ScanError::Unpack(format!(
            "unpacker exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let mut summary = ExtractionSummary::default();
    if out.is_file() {
        summary.extracted = 1;
    }
    info!(path = %path.display(), produced = summary.extracted, "unpacker finished");
    Ok(summary)
}

/// Everything produced by unpacking one container.
#[derive(Debug, Default)]
pub struct UnpackOutcome {
    pub members: Vec<PathBuf>,
    pub issues: Vec<ScanIssue>,
}

/// Dispatches a container to every extractor its flags call for.
#[derive(Debug, Clone, Default)]
pub struct Unpacker {
    config: UnpackConfig,
    limits: IOLimits,
}

impl Unpacker {
    pub fn new(config: UnpackConfig, limits: IOLimits) -> Self {
        Self { config, limits }
    }

    pub fn config(&self) -> &UnpackConfig {
        &self.config
    }

    /// Unpack `container` into `scratch`. Failures become issues, never errors.
    pub fn unpack(
        &self,
        container: &Path,
        flags: &ContainerFlags,
        scratch: &mut ScratchArea,
    ) -> UnpackOutcome {
        let mut outcome = UnpackOutcome::default();
        let dest = match scratch.ensure() {
            Ok(dest) => dest.to_path_buf(),
            Err(e) => {
                warn!(path = %container.display(), error = %e, "cannot create scratch area");
                outcome.issues.push(ScanIssue::from_error(ScanStage::Unpacking, &e));
                return outcome;
            }
        };

        if flags.zip_family {
            let result = extract_zip(container, &dest, &self.config);
            record_step(&mut outcome, container, "zip", result);
        }
        if flags.rar {
            let result = extract_rar(container, &dest, &self.config);
            record_step(&mut outcome, container, "rar", result);
        }
        if flags.macro_office {
            let result = write_macros(container, &dest, &self.config, &self.limits);
            record_step(&mut outcome, container, "macros", result);
        }
        if flags.packed_executable {
            let result = run_upx(container, &dest, &self.config);
            record_step(&mut outcome, container, "upx", result);
        }

        outcome.members = scratch.members();
        outcome
    }
}

fn record_step(
    outcome: &mut UnpackOutcome,
    container: &Path,
    step: &str,
    result: Result<ExtractionSummary>,
) {
    match result {
        Ok(summary) => outcome.issues.extend(summary.issues()),
        Err(e) => {
            warn!(path = %container.display(), step, error = %e, "unpack step failed");
            outcome.issues.push(ScanIssue::from_error(ScanStage::Unpacking, &e));
        }
    }
}
