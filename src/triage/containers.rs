//! Container inspection over the sniffer's description.
//!
//! Pure substring tests; no bytes are read here.

use crate::core::triage::{ContainerFlags, FileClassification};

const MACRO_OFFICE_MARKERS: &[&str] = &[
    "Composite Document File",
    "Word 2007+",
    "Excel 2007+",
    "PowerPoint 2007+",
    "Rich Text Format data",
];

/// OOXML forms are zip packages as well as office documents.
const OOXML_MARKERS: &[&str] = &["Word 2007+", "Excel 2007+", "PowerPoint 2007+"];

const ZIP_FAMILY_MARKERS: &[&str] = &["Java", "Macromedia Flash data", "Zip"];

const RAR_MARKER: &str = "RAR";

const PE_MARKER: &str = "PE32";

fn any_of(description: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| description.contains(m))
}

/// Every container marker present in `description`.
pub fn inspect_description(description: &str) -> ContainerFlags {
    ContainerFlags {
        macro_office: any_of(description, MACRO_OFFICE_MARKERS),
        zip_family: any_of(description, OOXML_MARKERS)
            || any_of(description, ZIP_FAMILY_MARKERS),
        rar: description.contains(RAR_MARKER),
        packed_executable: description.contains(PE_MARKER),
    }
}

pub fn inspect(classification: &FileClassification) -> ContainerFlags {
    inspect_description(&classification.raw_description)
}
