//! Structural anomalies of PE images that still parse.

use super::sections::section_name;
use goblin::pe::section_table::SectionTable;

const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

/// Header values the checks compare against the section table.
#[derive(Debug, Clone, Copy)]
pub struct HeaderFacts {
    pub entry_point: u64,
    pub size_of_headers: u64,
    pub check_sum: u32,
    pub generated_check_sum: u32,
    pub file_size: u64,
}

/// One message per anomaly, in header then section-table order.
pub fn collect(facts: &HeaderFacts, sections: &[SectionTable]) -> Vec<String> {
    let mut warnings = Vec::new();

    if facts.check_sum != 0 && facts.check_sum != facts.generated_check_sum {
        warnings.push(format!(
            "checksum 0x{:08x} does not match computed 0x{:08x}",
            facts.check_sum, facts.generated_check_sum
        ));
    }

    let ep = facts.entry_point;
    let in_section = sections.iter().any(|s| {
        let start = s.virtual_address as u64;
        let span = (s.virtual_size as u64).max(s.size_of_raw_data as u64);
        ep >= start && ep < start + span
    });
    if ep != 0 && ep >= facts.size_of_headers && !in_section {
        warnings.push(format!("entry point 0x{:x} lies outside every section", ep));
    }

    for section in sections {
        let name = section_name(section);
        let raw_end = section.pointer_to_raw_data as u64 + section.size_of_raw_data as u64;
        if section.size_of_raw_data != 0 && raw_end > facts.file_size {
            warnings.push(format!(
                "section {} raw data ends at 0x{:x}, past end of file 0x{:x}",
                name, raw_end, facts.file_size
            ));
        }
        let wx = IMAGE_SCN_MEM_WRITE | IMAGE_SCN_MEM_EXECUTE;
        if section.characteristics & wx == wx {
            warnings.push(format!("section {} is both writable and executable", name));
        }
    }
    warnings
}
