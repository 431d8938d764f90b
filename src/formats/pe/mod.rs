//! Executable feature extraction for PE images.
//!
//! Structure comes from `goblin`; the extractor only validates what the
//! feature set depends on (an optional header with at least the debug data
//! directory) and flattens the rest into a [`FeatureMap`].

pub mod anti;
pub mod checksum;
pub mod sections;
pub mod warnings;

use crate::core::triage::{FeatureMap, FeatureRecord};
use crate::error::{Result, ScanError};
use crate::io::{IOLimits, SafeReader};
use chrono::DateTime;
use goblin::pe::PE;
use std::path::Path;
use tracing::{debug, info, warn};

/// Data directories up to and including DEBUG (index 6).
pub const MIN_DATA_DIRECTORIES: u32 = 7;

const IMAGE_FILE_EXECUTABLE_IMAGE: u16 = 0x0002;
const IMAGE_FILE_MACHINE_I386: u16 = 0x014c;
const IMAGE_SUBSYSTEM_NATIVE: u16 = 1;

/// Imports that only kernel-mode images link against.
const DRIVER_LIBRARIES: &[&str] = &["ntoskrnl.exe", "hal.dll", "ndis.sys", "bootvid.dll", "kdcom.dll"];

/// Parses PE images into executable feature records.
#[derive(Debug, Clone, Default)]
pub struct ExecutableExtractor {
    limits: IOLimits,
}

impl ExecutableExtractor {
    pub fn new(limits: IOLimits) -> Self {
        Self { limits }
    }

    /// Extract the executable features of the file at `path`.
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<FeatureRecord> {
        let path = path.as_ref();
        info!(path = %path.display(), "extracting executable features");
        let mut reader = SafeReader::open(path, self.limits.clone())?;
        let features = self.extract_bytes(reader.contents()?).map_err(|e| {
            warn!(path = %path.display(), error = %e, "executable validation failed");
            e
        })?;
        Ok(FeatureRecord::Executable(features))
    }

    /// Extract features from an in-memory image.
    pub fn extract_bytes(&self, data: &[u8]) -> Result<FeatureMap> {
        let pe = PE::parse(data).map_err(|e| ScanError::MalformedExecutable(e.to_string()))?;
        let optional = pe
            .header
            .optional_header
            .as_ref()
            .ok_or_else(|| ScanError::MalformedExecutable("missing optional header".into()))?;
        let windows = &optional.windows_fields;
        let standard = &optional.standard_fields;
        if windows.number_of_rva_and_sizes < MIN_DATA_DIRECTORIES {
            return Err(ScanError::MalformedExecutable(format!(
                "only {} data directories",
                windows.number_of_rva_and_sizes
            )));
        }

        let coff = &pe.header.coff_header;
        let dirs = &optional.data_directories;
        let dir_size = |d: Option<u32>| d.unwrap_or(0);
        let mut f = FeatureMap::new();

        let generated_check_sum =
            checksum::generate_checksum(data, pe.header.dos_header.pe_pointer as usize);
        f.insert("check_sum".into(), windows.check_sum.into());
        f.insert("generated_check_sum".into(), generated_check_sum.into());
        f.insert("compile_date".into(), coff.time_date_stamp.into());
        if let Some(ts) = DateTime::from_timestamp(coff.time_date_stamp as i64, 0) {
            f.insert("compile_time".into(), ts.to_rfc3339().into());
        }

        f.insert(
            "debug_size".into(),
            dir_size(dirs.get_debug_table().as_ref().map(|d| d.size)).into(),
        );
        f.insert(
            "export_size".into(),
            dir_size(dirs.get_export_table().as_ref().map(|d| d.size)).into(),
        );
        f.insert(
            "iat_rva".into(),
            dir_size(dirs.get_import_table().as_ref().map(|d| d.virtual_address)).into(),
        );
        let named_dirs = [
            ("EXPORT", dirs.get_export_table().as_ref().map(|d| d.size)),
            ("IMPORT", dirs.get_import_table().as_ref().map(|d| d.size)),
            ("RESOURCE", dirs.get_resource_table().as_ref().map(|d| d.size)),
            ("BASERELOC", dirs.get_base_relocation_table().as_ref().map(|d| d.size)),
            ("IAT", dirs.get_import_address_table().as_ref().map(|d| d.size)),
        ];
        for (name, size) in named_dirs {
            f.insert(
                format!("datadir_IMAGE_DIRECTORY_ENTRY_{}_size", name),
                dir_size(size).into(),
            );
        }

        f.insert("major_version".into(), windows.major_image_version.into());
        f.insert("minor_version".into(), windows.minor_image_version.into());
        f.insert("number_of_rva_and_sizes".into(), windows.number_of_rva_and_sizes.into());
        f.insert("number_of_sections".into(), coff.number_of_sections.into());
        f.insert("size_image".into(), windows.size_of_image.into());
        f.insert("size_code".into(), (standard.size_of_code as u64).into());
        f.insert(
            "size_initdata".into(),
            (standard.size_of_initialized_data as u64).into(),
        );
        f.insert(
            "size_uninit".into(),
            (standard.size_of_uninitialized_data as u64).into(),
        );
        f.insert("pe_majorlink".into(), (standard.major_linker_version as u32).into());
        f.insert("pe_minorlink".into(), (standard.minor_linker_version as u32).into());
        f.insert("total_size_pe".into(), data.len().into());

        let driver = windows.subsystem == IMAGE_SUBSYSTEM_NATIVE
            || pe
                .libraries
                .iter()
                .any(|lib| DRIVER_LIBRARIES.contains(&lib.to_ascii_lowercase().as_str()));
        let exe = !pe.is_lib && !driver && coff.characteristics & IMAGE_FILE_EXECUTABLE_IMAGE != 0;
        f.insert("pe_dll".into(), pe.is_lib.into());
        f.insert("pe_driver".into(), driver.into());
        f.insert("pe_exe".into(), exe.into());
        f.insert("pe_i386".into(), (coff.machine == IMAGE_FILE_MACHINE_I386).into());
        f.insert("pe_char".into(), coff.characteristics.into());

        sections::section_features(&pe.sections, data, &mut f);
        insert_imports(&pe, &mut f);
        insert_exports(&pe, &mut f);

        f.insert("anti_vm_capabilities".into(), anti::scan_anti_vm(data).into());

        let (bound_modules, bound_symbols) =
            bound_imports(data, dirs.get_bound_import_table().as_ref().map(|d| d.virtual_address));
        f.insert("number_of_bound_imports".into(), bound_modules.len().into());
        f.insert("number_of_bound_import_symbols".into(), bound_symbols.into());
        f.insert("bound_import_modules".into(), bound_modules.into());

        let facts = warnings::HeaderFacts {
            entry_point: standard.address_of_entry_point as u64,
            size_of_headers: windows.size_of_headers as u64,
            check_sum: windows.check_sum,
            generated_check_sum,
            file_size: data.len() as u64,
        };
        let pe_warnings = warnings::collect(&facts, &pe.sections);
        if !pe_warnings.is_empty() {
            debug!(count = pe_warnings.len(), "executable structure warnings");
        }
        f.insert("pe_warnings".into(), (!pe_warnings.is_empty()).into());
        f.insert("pe_warning_strings".into(), pe_warnings.into());

        debug!(
            sections = pe.sections.len(),
            imports = pe.imports.len(),
            exports = pe.exports.len(),
            "executable features extracted"
        );
        Ok(f)
    }
}

fn insert_imports(pe: &PE, f: &mut FeatureMap) {
    let image_base = pe.image_base as u64;
    let mut symbols = Vec::with_capacity(pe.imports.len());
    let mut anti_debug = Vec::new();

    for import in &pe.imports {
        let name: &str = &import.name;
        let symbol = match name.strip_prefix("ORDINAL ") {
            Some(_) => format!("{}:ordinal={}", import.dll, import.ordinal),
            None => format!("{}:name={}", import.dll, name),
        };
        symbols.push(symbol.to_lowercase());

        if anti::is_anti_debug_import(name) {
            anti_debug.push(anti::format_anti_debug(
                image_base + import.rva as u64,
                name,
            ));
        }
    }
    symbols.sort();
    symbols.dedup();

    f.insert("number_of_imports".into(), pe.libraries.len().into());
    f.insert("number_of_import_symbols".into(), pe.imports.len().into());
    f.insert("imported_symbols".into(), symbols.into());
    f.insert("anti_debugging_capabilities".into(), anti_debug.into());
}

/// Upper bound on bound-import descriptors walked per image.
const MAX_BOUND_DESCRIPTORS: usize = 4096;
const BOUND_DESCRIPTOR_SIZE: usize = 8;

/// Module names and the forwarder-reference total of the bound import
/// directory. Its address is a file offset into the headers, and module
/// names are offsets from the start of the directory.
fn bound_imports(data: &[u8], offset: Option<u32>) -> (Vec<String>, u64) {
    let mut modules = Vec::new();
    let mut forwarders = 0u64;
    let table = match offset.filter(|&o| o != 0).and_then(|o| data.get(o as usize..)) {
        Some(table) => table,
        None => return (modules, forwarders),
    };

    let mut pos = 0usize;
    while let Some(desc) = table.get(pos..pos + BOUND_DESCRIPTOR_SIZE) {
        if desc.iter().all(|&b| b == 0) || modules.len() >= MAX_BOUND_DESCRIPTORS {
            break;
        }
        let name_offset = u16::from_le_bytes([desc[4], desc[5]]) as usize;
        let refs = u16::from_le_bytes([desc[6], desc[7]]) as usize;
        let name = table
            .get(name_offset..)
            .map(|rest| {
                let end = memchr::memchr(0, rest).unwrap_or(rest.len()).min(256);
                String::from_utf8_lossy(&rest[..end]).to_lowercase()
            })
            .unwrap_or_default();
        modules.push(name);
        forwarders += refs as u64;
        pos += BOUND_DESCRIPTOR_SIZE * (1 + refs);
    }
    (modules, forwarders)
}

fn insert_exports(pe: &PE, f: &mut FeatureMap) {
    let mut symbols: Vec<String> = pe
        .exports
        .iter()
        .map(|e| match e.name {
            Some(name) => format!("name={}", name).to_lowercase(),
            None => format!("rva=0x{:x}", e.rva),
        })
        .collect();
    symbols.sort();
    symbols.dedup();

    f.insert("number_of_export_symbols".into(), pe.exports.len().into());
    f.insert("exported_symbols".into(), symbols.into());
}
