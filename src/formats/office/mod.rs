//! Office macro extraction.
//!
//! Finds VBA projects in OLE compound documents and in the `vbaProject.bin`
//! parts of OOXML packages, recovers each module's source and runs the
//! keyword analysis over the concatenated, filtered text.

pub mod analysis;
pub mod ovba;

use crate::core::triage::{FeatureMap, FeatureRecord};
use crate::error::{Result, ScanError};
use crate::io::{IOLimits, SafeReader};
use analysis::MacroIndicator;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use analysis::IndicatorKind;

const OLE_MAGIC: &[u8] = &[0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
const ZIP_MAGIC: &[u8] = b"PK";
const VBA_PART_SUFFIX: &str = "vbaproject.bin";
const ATTRIBUTE_PREFIX: &str = "Attribute VB_";

/// How module-level corruption is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacroMode {
    /// The first unreadable module fails the extraction.
    #[default]
    Strict,
    /// Unreadable modules are logged and skipped.
    Relaxed,
}

/// Recovered macro content of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroReport {
    pub has_macros: bool,
    /// Module names in discovery order.
    pub modules: Vec<String>,
    /// Concatenated module source with attribute lines removed.
    pub source: String,
    pub analysis: Vec<MacroIndicator>,
}

impl MacroReport {
    pub fn to_features(&self) -> FeatureMap {
        let mut f = FeatureMap::new();
        f.insert("has_macros".into(), self.has_macros.into());
        f.insert("modules".into(), self.modules.clone().into());
        f.insert("code".into(), self.source.clone().into());
        f.insert(
            "analysis".into(),
            self.analysis
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .into(),
        );
        let count = |k: IndicatorKind| self.analysis.iter().filter(|i| i.kind == k).count();
        f.insert("autoexec_count".into(), count(IndicatorKind::AutoExec).into());
        f.insert("suspicious_count".into(), count(IndicatorKind::Suspicious).into());
        f.insert("ioc_count".into(), count(IndicatorKind::Ioc).into());
        f
    }

    pub fn to_feature_record(&self) -> FeatureRecord {
        FeatureRecord::Office(self.to_features())
    }
}

/// Drop `Attribute VB_*` lines, keeping everything else verbatim.
pub fn filter_source(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in code.split_inclusive('\n') {
        if line.trim_start().starts_with(ATTRIBUTE_PREFIX) {
            continue;
        }
        out.push_str(line);
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Recovers VBA macro source from Office documents.
#[derive(Debug, Clone, Default)]
pub struct MacroExtractor {
    mode: MacroMode,
    limits: IOLimits,
}

impl MacroExtractor {
    pub fn new(mode: MacroMode, limits: IOLimits) -> Self {
        Self { mode, limits }
    }

    pub fn mode(&self) -> MacroMode {
        self.mode
    }

    /// Extract macros from the document at `path`; `Ok(None)` when it has none.
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<Option<MacroReport>> {
        let path = path.as_ref();
        let mut reader = SafeReader::open(path, self.limits.clone())?;
        let report = self.extract_bytes(reader.contents()?)?;
        match &report {
            Some(r) => info!(
                path = %path.display(),
                modules = r.modules.len(),
                indicators = r.analysis.len(),
                "macros extracted"
            ),
            None => debug!(path = %path.display(), "no macro content"),
        }
        Ok(report)
    }

    pub fn extract_bytes(&self, data: &[u8]) -> Result<Option<MacroReport>> {
        let modules = if data.starts_with(OLE_MAGIC) {
            self.modules_from_ole(data)?
        } else if data.starts_with(ZIP_MAGIC) {
            self.modules_from_ooxml(data)?
        } else if data.starts_with(b"{\\rtf") {
            // RTF carries embedded objects, not a VBA project.
            Vec::new()
        } else {
            return Err(ScanError::MalformedInput(
                "not an OLE compound file or OOXML package".into(),
            ));
        };

        if modules.is_empty() {
            return Ok(None);
        }

        let mut names = Vec::with_capacity(modules.len());
        let mut source = String::new();
        for (name, code) in modules {
            source.push_str(&filter_source(&code));
            names.push(name);
        }
        let analysis = analysis::analyze(&source);
        Ok(Some(MacroReport {
            has_macros: true,
            modules: names,
            source,
            analysis,
        }))
    }

    fn modules_from_ooxml(&self, data: &[u8]) -> Result<Vec<(String, String)>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))
            .map_err(|e| ScanError::MalformedInput(format!("unreadable OOXML package: {}", e)))?;
        let mut modules = Vec::new();
        for i in 0..archive.len() {
            let mut entry = match archive.by_index(i) {
                Ok(entry) => entry,
                Err(e) => {
                    self.module_failure(format!("zip entry {}: {}", i, e))?;
                    continue;
                }
            };
            if !entry.name().to_ascii_lowercase().ends_with(VBA_PART_SUFFIX) {
                continue;
            }
            if entry.size() > self.limits.max_file_size {
                self.module_failure(format!("{} exceeds size limit", entry.name()))?;
                continue;
            }
            let part_name = entry.name().to_string();
            let mut part = Vec::new();
            if let Err(e) = (&mut entry).take(self.limits.max_file_size + 1).read_to_end(&mut part) {
                self.module_failure(format!("{}: {}", part_name, e))?;
                continue;
            }
            if part.len() as u64 > self.limits.max_file_size {
                self.module_failure(format!("{} exceeds size limit", part_name))?;
                continue;
            }
            debug!(part = %part_name, size = part.len(), "found VBA project part");
            match self.modules_from_ole(&part) {
                Ok(found) => modules.extend(found),
                Err(e) => self.module_failure(format!("{}: {}", part_name, e))?,
            }
        }
        Ok(modules)
    }

    fn modules_from_ole(&self, data: &[u8]) -> Result<Vec<(String, String)>> {
        let mut compound = match cfb::CompoundFile::open(Cursor::new(data)) {
            Ok(compound) => compound,
            Err(e) => {
                self.module_failure(format!("unreadable compound file: {}", e))?;
                return Ok(Vec::new());
            }
        };

        // Every storage holding a `dir` stream is a VBA project.
        let projects: Vec<PathBuf> = compound
            .walk()
            .filter(|e| e.is_stream() && e.name().eq_ignore_ascii_case("dir"))
            .filter_map(|e| e.path().parent().map(Path::to_path_buf))
            .collect();

        let mut modules = Vec::new();
        for storage in projects {
            match self.read_project(&mut compound, &storage) {
                Ok(found) => modules.extend(found),
                Err(e) => self.module_failure(format!("{}: {}", storage.display(), e))?,
            }
        }
        Ok(modules)
    }

    fn read_project<F: Read + Seek>(
        &self,
        compound: &mut cfb::CompoundFile<F>,
        storage: &Path,
    ) -> Result<Vec<(String, String)>> {
        let dir = read_stream(compound, &storage.join("dir"))?;
        let project = ovba::parse_dir(&ovba::decompress(&dir)?)?;
        debug!(
            storage = %storage.display(),
            code_page = project.code_page,
            modules = project.modules.len(),
            "parsed VBA dir stream"
        );

        let mut modules = Vec::with_capacity(project.modules.len());
        for module in &project.modules {
            let recovered = read_stream(compound, &storage.join(&module.stream_name)).and_then(|raw| {
                let text = raw.get(module.text_offset as usize..).ok_or_else(|| {
                    ScanError::MalformedInput(format!(
                        "module {} offset {} past stream end",
                        module.name, module.text_offset
                    ))
                })?;
                ovba::decompress(text)
            });
            match recovered {
                Ok(bytes) => modules.push((
                    module.name.clone(),
                    ovba::decode_source(&bytes, project.code_page),
                )),
                Err(e) => self.module_failure(format!("module {}: {}", module.name, e))?,
            }
        }
        Ok(modules)
    }

    /// Strict mode turns a module failure into an error; relaxed mode logs it.
    fn module_failure(&self, message: String) -> Result<()> {
        match self.mode {
            MacroMode::Strict => Err(ScanError::MalformedInput(message)),
            MacroMode::Relaxed => {
                warn!(error = %message, "skipping unreadable macro content");
                Ok(())
            }
        }
    }
}

fn read_stream<F: Read + Seek>(compound: &mut cfb::CompoundFile<F>, path: &Path) -> Result<Vec<u8>> {
    let mut stream = compound.open_stream(path).map_err(|e| {
        ScanError::MalformedInput(format!("cannot open stream {}: {}", path.display(), e))
    })?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).map_err(|e| {
        ScanError::MalformedInput(format!("cannot read stream {}: {}", path.display(), e))
    })?;
    Ok(buf)
}
