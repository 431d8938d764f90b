//! MIME dispatch categories.

use serde::{Deserialize, Serialize};

/// Category a MIME type routes to, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatCategory {
    Office,
    Document,
    Compressed,
    Packed,
    Executable,
    Web,
    NonMacro,
    Unknown,
}

const OFFICE_MIMES: &[&str] = &[
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.template",
    "application/vnd.ms-word.document.macroEnabled.12",
    "application/vnd.ms-word.template.macroEnabled.12",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.template",
    "application/vnd.ms-excel.sheet.macroEnabled.12",
    "application/vnd.ms-excel.template.macroEnabled.12",
    "application/vnd.ms-excel.addin.macroEnabled.12",
    "application/vnd.ms-excel.sheet.binary.macroEnabled.12",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.openxmlformats-officedocument.presentationml.template",
    "application/vnd.openxmlformats-officedocument.presentationml.slideshow",
    "application/vnd.ms-powerpoint.addin.macroEnabled.12",
    "application/vnd.ms-powerpoint.presentation.macroEnabled.12",
    "application/vnd.ms-powerpoint.template.macroEnabled.12",
    "application/vnd.ms-powerpoint.slideshow.macroEnabled.12",
];

const DOCUMENT_MIMES: &[&str] = &[
    "application/pdf",
    "application/x-pdf",
    "application/acrobat",
    "application/vnd.pdf",
    "text/pdf",
    "text/x-pdf",
];

const COMPRESSED_MIMES: &[&str] = &[
    "application/zip",
    "application/x-rar",
    "application/vnd.rar",
    "application/x-rar-compressed",
    "application/gzip",
    "application/x-bzip2",
    "application/x-xz",
    "application/x-7z-compressed",
    "application/zstd",
    "application/x-tar",
];

// Reserved; no MIME routes here yet.
const PACKED_MIMES: &[&str] = &[];
const NON_MACRO_MIMES: &[&str] = &[];

const EXECUTABLE_MIMES: &[&str] = &[
    "application/x-dosexec",
    "application/x-msdownload",
    "application/vnd.microsoft.portable-executable",
    "application/exe",
    "application/x-exe",
    "application/dos-exe",
    "vms/exe",
    "application/x-winexe",
    "application/msdos-windows",
    "application/x-msdos-program",
];

const WEB_MIMES: &[&str] = &[
    "text/html",
    "application/x-shockwave-flash",
    "application/vnd.adobe.flash.movie",
    "application/java-archive",
];

/// First match wins.
pub const DISPATCH_ORDER: [FormatCategory; 7] = [
    FormatCategory::Office,
    FormatCategory::Document,
    FormatCategory::Compressed,
    FormatCategory::Packed,
    FormatCategory::Executable,
    FormatCategory::Web,
    FormatCategory::NonMacro,
];

/// One dispatch table entry: a category and the MIME types routed to it.
pub type MimeTable<'a> = (FormatCategory, &'a [&'a str]);

impl FormatCategory {
    pub fn mime_table(&self) -> &'static [&'static str] {
        match self {
            FormatCategory::Office => OFFICE_MIMES,
            FormatCategory::Document => DOCUMENT_MIMES,
            FormatCategory::Compressed => COMPRESSED_MIMES,
            FormatCategory::Packed => PACKED_MIMES,
            FormatCategory::Executable => EXECUTABLE_MIMES,
            FormatCategory::Web => WEB_MIMES,
            FormatCategory::NonMacro => NON_MACRO_MIMES,
            FormatCategory::Unknown => &[],
        }
    }

    pub fn contains(&self, mime: &str) -> bool {
        self.mime_table()
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mime))
    }

    /// Resolve a MIME type against `DISPATCH_ORDER`.
    pub fn dispatch(mime: &str) -> FormatCategory {
        Self::dispatch_in(DISPATCH_ORDER.iter().map(|c| (*c, c.mime_table())), mime)
    }

    /// Resolve a MIME type against `tables`, walked in order; the first
    /// table listing it (case-insensitively) wins.
    pub fn dispatch_in<'a, I>(tables: I, mime: &str) -> FormatCategory
    where
        I: IntoIterator<Item = MimeTable<'a>>,
    {
        tables
            .into_iter()
            .find(|(_, mimes)| mimes.iter().any(|m| m.eq_ignore_ascii_case(mime)))
            .map(|(category, _)| category)
            .unwrap_or(FormatCategory::Unknown)
    }

    /// Whether a file of this category can carry active content.
    pub fn macro_presence_possible(&self) -> bool {
        !matches!(self, FormatCategory::Unknown)
    }
}
