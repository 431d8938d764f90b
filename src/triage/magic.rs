//! Magic-byte and structure probes for the formats the pipeline routes on.
//!
//! Each probe returns a libmagic-style `(description, mime)` pair. The
//! descriptions are what the container inspector matches on, so their
//! wording is load-bearing.

use std::io::Cursor;

pub const MZ: &[u8] = b"MZ";
pub const PE_SIGNATURE: &[u8] = b"PE\0\0";
pub const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
pub const ZIP_LOCAL: &[u8] = b"PK\x03\x04";
pub const ZIP_EMPTY: &[u8] = b"PK\x05\x06";
pub const RAR4: &[u8] = b"Rar!\x1a\x07\x00";
pub const RAR5: &[u8] = b"Rar!\x1a\x07\x01\x00";
pub const PDF: &[u8] = b"%PDF-";
pub const RTF: &[u8] = b"{\\rtf";

/// Offset window in which a PDF header is still recognized.
pub const PDF_HEADER_WINDOW: usize = 1024;

pub const MIME_DOSEXEC: &str = "application/x-dosexec";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_RTF: &str = "text/rtf";
pub const MIME_RAR: &str = "application/x-rar";
pub const MIME_ZIP: &str = "application/zip";
pub const MIME_JAR: &str = "application/java-archive";
pub const MIME_FLASH: &str = "application/x-shockwave-flash";
pub const MIME_CDF: &str = "application/CDFV2";
pub const MIME_MSWORD: &str = "application/msword";
pub const MIME_MSEXCEL: &str = "application/vnd.ms-excel";
pub const MIME_MSPPT: &str = "application/vnd.ms-powerpoint";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOCM: &str = "application/vnd.ms-word.document.macroEnabled.12";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_XLSM: &str = "application/vnd.ms-excel.sheet.macroEnabled.12";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_PPTM: &str = "application/vnd.ms-powerpoint.presentation.macroEnabled.12";

pub type Probe = (String, &'static str);

fn u16_at(data: &[u8], off: usize) -> Option<u16> {
    let b = data.get(off..off.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn u32_at(data: &[u8], off: usize) -> Option<u32> {
    let b = data.get(off..off.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn machine_name(machine: u16) -> &'static str {
    match machine {
        0x014c => "Intel 80386",
        0x8664 => "x86-64",
        0x01c0 | 0x01c4 => "ARM",
        0xaa64 => "Aarch64",
        0x0200 => "Intel Itanium",
        _ => "unknown processor",
    }
}

/// MZ / PE probe. A missing or truncated PE header still reads as a DOS executable.
pub fn probe_pe(data: &[u8]) -> Option<Probe> {
    if !data.starts_with(MZ) {
        return None;
    }
    let dos = ("MS-DOS executable".to_string(), MIME_DOSEXEC);
    let Some(e_lfanew) = u32_at(data, 0x3c).map(|v| v as usize) else {
        return Some(dos);
    };
    let Some(sig) = data.get(e_lfanew..e_lfanew.saturating_add(4)) else {
        return Some(dos);
    };
    if sig != PE_SIGNATURE {
        return Some(dos);
    }

    let coff = e_lfanew + 4;
    let machine = u16_at(data, coff).unwrap_or(0);
    let characteristics = u16_at(data, coff + 18).unwrap_or(0);
    let opt = coff + 20;
    let flavor = match u16_at(data, opt) {
        Some(0x20b) => "PE32+",
        _ => "PE32",
    };
    let subsystem = match u16_at(data, opt + 68) {
        Some(1) => "(native)",
        Some(2) => "(GUI)",
        Some(3) => "(console)",
        Some(10..=13) => "(EFI application)",
        Some(_) => "(unknown subsystem)",
        None => "(truncated)",
    };
    let dll = if characteristics & 0x2000 != 0 {
        "(DLL) "
    } else {
        ""
    };
    Some((
        format!(
            "{} executable {}{} {}, for MS Windows",
            flavor,
            dll,
            subsystem,
            machine_name(machine)
        ),
        MIME_DOSEXEC,
    ))
}

fn ooxml_from_names<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Option<Probe> {
    let mut word = false;
    let mut excel = false;
    let mut ppt = false;
    let mut vba = false;
    let mut jar = false;
    for name in names {
        word |= name.starts_with("word/");
        excel |= name.starts_with("xl/");
        ppt |= name.starts_with("ppt/");
        vba |= name.ends_with("vbaProject.bin");
        jar |= name.eq_ignore_ascii_case("META-INF/MANIFEST.MF") || name.ends_with(".class");
    }
    let probe = match (word, excel, ppt) {
        (true, _, _) => (
            "Microsoft Word 2007+",
            if vba { MIME_DOCM } else { MIME_DOCX },
        ),
        (_, true, _) => (
            "Microsoft Excel 2007+",
            if vba { MIME_XLSM } else { MIME_XLSX },
        ),
        (_, _, true) => (
            "Microsoft PowerPoint 2007+",
            if vba { MIME_PPTM } else { MIME_PPTX },
        ),
        _ if jar => ("Java archive data (JAR)", MIME_JAR),
        _ => return None,
    };
    Some((probe.0.to_string(), probe.1))
}

/// Entry names from the local file headers present in `data`, for buffers
/// too short to hold the central directory.
fn local_header_names(data: &[u8]) -> Vec<String> {
    memchr::memmem::find_iter(data, ZIP_LOCAL)
        .filter_map(|off| {
            let len = u16_at(data, off + 26)? as usize;
            let name = data.get(off + 30..off + 30 + len)?;
            Some(String::from_utf8_lossy(name).into_owned())
        })
        .collect()
}

/// Zip probe with OOXML and JAR refinement from the entry names.
pub fn probe_zip(data: &[u8]) -> Option<Probe> {
    if !(data.starts_with(ZIP_LOCAL) || data.starts_with(ZIP_EMPTY)) {
        return None;
    }
    let refined = match zip::ZipArchive::new(Cursor::new(data)) {
        Ok(archive) => ooxml_from_names(archive.file_names()),
        Err(_) => {
            let names = local_header_names(data);
            ooxml_from_names(names.iter().map(String::as_str))
        }
    };
    Some(refined.unwrap_or_else(|| ("Zip archive data".to_string(), MIME_ZIP)))
}

/// OLE compound file probe with application refinement from the stream names.
pub fn probe_ole(data: &[u8]) -> Option<Probe> {
    if !data.starts_with(OLE_MAGIC) {
        return None;
    }
    let base = "Composite Document File V2 Document";
    let Ok(compound) = cfb::CompoundFile::open(Cursor::new(data)) else {
        return Some((format!("{}, Cannot read section info", base), MIME_CDF));
    };
    let names: Vec<String> = compound
        .walk()
        .filter(|e| e.is_stream())
        .map(|e| e.name().to_string())
        .collect();
    let has = |n: &str| names.iter().any(|s| s == n);
    let (app, mime) = if has("WordDocument") {
        ("Microsoft Office Word", MIME_MSWORD)
    } else if has("Workbook") || has("Book") {
        ("Microsoft Excel", MIME_MSEXCEL)
    } else if has("PowerPoint Document") {
        ("Microsoft Office PowerPoint", MIME_MSPPT)
    } else {
        return Some((format!("{}, Little Endian", base), MIME_CDF));
    };
    Some((
        format!("{}, Little Endian, Name of Creating Application: {}", base, app),
        mime,
    ))
}

pub fn probe_rar(data: &[u8]) -> Option<Probe> {
    if data.starts_with(RAR5) {
        Some(("RAR archive data, v5".to_string(), MIME_RAR))
    } else if data.starts_with(RAR4) {
        Some(("RAR archive data, v4".to_string(), MIME_RAR))
    } else {
        None
    }
}

/// PDF probe; the header may be preceded by junk within the first KB.
pub fn probe_pdf(data: &[u8]) -> Option<Probe> {
    let window = &data[..data.len().min(PDF_HEADER_WINDOW)];
    let off = memchr::memmem::find(window, PDF)?;
    let version: String = data[off + PDF.len()..]
        .iter()
        .take(3)
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    let desc = if version.is_empty() {
        "PDF document".to_string()
    } else {
        format!("PDF document, version {}", version)
    };
    Some((desc, MIME_PDF))
}

pub fn probe_rtf(data: &[u8]) -> Option<Probe> {
    data.starts_with(RTF)
        .then(|| ("Rich Text Format data".to_string(), MIME_RTF))
}

pub fn probe_flash(data: &[u8]) -> Option<Probe> {
    let head = data.get(..3)?;
    let kind = match head {
        b"FWS" => "",
        b"CWS" => ", compressed",
        b"ZWS" => ", LZMA compressed",
        _ => return None,
    };
    let version = data.get(3).copied().unwrap_or(0);
    Some((
        format!("Macromedia Flash data{}, version {}", kind, version),
        MIME_FLASH,
    ))
}

/// Probes in the order they are tried.
pub const PROBES: &[fn(&[u8]) -> Option<Probe>] = &[
    probe_pe, probe_ole, probe_zip, probe_rar, probe_pdf, probe_rtf, probe_flash,
];
