//! Section-table features for PE images.

use crate::core::triage::FeatureMap;
use crate::entropy::entropy_range;
use goblin::pe::section_table::SectionTable;

const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;

/// Section names emitted by common toolchains.
const STANDARD_SECTION_NAMES: &[&str] = &[
    ".text", ".bss", ".rdata", ".data", ".rsrc", ".edata", ".idata", ".pdata", ".debug", ".reloc",
    ".stab", ".stabstr", ".tls", ".crt", ".gnu_deb", ".eh_fram", ".exptbl", ".rodata",
];

/// Raw section name up to the first NUL, lowercased.
pub fn section_name(section: &SectionTable) -> String {
    let end = section
        .name
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(section.name.len());
    String::from_utf8_lossy(&section.name[..end])
        .chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Standard names plus the `/N` string-table references (N < 200) emitted by mingw.
pub fn is_standard_section_name(name: &str) -> bool {
    if STANDARD_SECTION_NAMES.contains(&name) {
        return true;
    }
    name.strip_prefix('/')
        .and_then(|n| n.parse::<u32>().ok())
        .map_or(false, |n| n < 200 && !name[1..].starts_with('+'))
}

pub fn is_executable(section: &SectionTable) -> bool {
    section.characteristics & (IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_CNT_CODE) != 0
}

/// Insert per-section geometry, entropy and the executable size totals.
pub fn section_features(sections: &[SectionTable], data: &[u8], features: &mut FeatureMap) {
    let mut names = Vec::with_capacity(sections.len());
    let mut all_standard = true;
    let mut raw_exec_size: u64 = 0;
    let mut va_exec_size: u64 = 0;

    for section in sections {
        let name = section_name(section);
        all_standard &= is_standard_section_name(&name);

        if is_executable(section) {
            raw_exec_size += section.size_of_raw_data as u64;
            va_exec_size += section.virtual_size as u64;
        }

        let key = name.replace('.', "");
        let start = section.pointer_to_raw_data as usize;
        let end = start.saturating_add(section.size_of_raw_data as usize);
        features.insert(
            format!("sec_entropy_{}", key),
            entropy_range(data, start..end).into(),
        );
        features.insert(
            format!("sec_rawptr_{}", key),
            section.pointer_to_raw_data.into(),
        );
        features.insert(
            format!("sec_rawsize_{}", key),
            section.size_of_raw_data.into(),
        );
        features.insert(format!("sec_vasize_{}", key), section.virtual_size.into());
        names.push(name);
    }

    if let Some(first) = sections.first() {
        features.insert("virtual_address".into(), first.virtual_address.into());
        features.insert("virtual_size".into(), first.virtual_size.into());
    }
    if let Some(second) = sections.get(1) {
        features.insert("virtual_size_2".into(), second.virtual_size.into());
    }

    features.insert("std_section_names".into(), all_standard.into());
    features.insert("section_names".into(), names.into());
    features.insert("sec_raw_execsize".into(), raw_exec_size.into());
    features.insert("sec_va_execsize".into(), va_exec_size.into());
}
