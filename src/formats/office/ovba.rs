//! VBA project storage: compressed containers and the `dir` stream.
//!
//! Layouts follow [MS-OVBA] 2.3.4.2 (dir stream) and 2.4.1 (compression).

use crate::error::{Result, ScanError};
use encoding_rs::Encoding;

const CHUNK_SIGNATURE: u16 = 0b011;
const MAX_CHUNK_PAYLOAD: usize = 4096;

fn malformed(msg: impl Into<String>) -> ScanError {
    ScanError::MalformedInput(msg.into())
}

/// Decompress an MS-OVBA compressed container.
pub fn decompress(container: &[u8]) -> Result<Vec<u8>> {
    match container.first() {
        Some(0x01) => {}
        Some(b) => return Err(malformed(format!("bad container signature 0x{:02x}", b))),
        None => return Err(malformed("empty compressed container")),
    }

    let mut out = Vec::with_capacity(container.len() * 2);
    let mut pos = 1;
    while pos < container.len() {
        let header = read_u16(container, pos)
            .ok_or_else(|| malformed("truncated chunk header"))?;
        if (header >> 12) & 0x07 != CHUNK_SIGNATURE {
            return Err(malformed(format!("bad chunk signature at {}", pos)));
        }
        let chunk_end = (pos + (header & 0x0fff) as usize + 3).min(container.len());
        let compressed = header & 0x8000 != 0;
        pos += 2;

        if !compressed {
            let end = chunk_end.min(pos + MAX_CHUNK_PAYLOAD);
            out.extend_from_slice(&container[pos..end]);
            pos = chunk_end;
            continue;
        }

        let chunk_start = out.len();
        while pos < chunk_end {
            let flags = container[pos];
            pos += 1;
            for bit in 0..8 {
                if pos >= chunk_end {
                    break;
                }
                if flags & (1 << bit) == 0 {
                    out.push(container[pos]);
                    pos += 1;
                    continue;
                }
                let token = read_u16(container, pos)
                    .filter(|_| pos + 1 < chunk_end)
                    .ok_or_else(|| malformed("truncated copy token"))?;
                pos += 2;
                copy_token(&mut out, chunk_start, token)?;
            }
        }
    }
    Ok(out)
}

fn copy_token(out: &mut Vec<u8>, chunk_start: usize, token: u16) -> Result<()> {
    let current = out.len() - chunk_start;
    if current == 0 {
        return Err(malformed("copy token at chunk start"));
    }
    let mut bit_count = 0u32;
    while (1usize << bit_count) < current {
        bit_count += 1;
    }
    let bit_count = bit_count.max(4);
    let length_mask = 0xffffu16 >> bit_count;
    let length = (token & length_mask) as usize + 3;
    let offset = ((token & !length_mask) >> (16 - bit_count)) as usize + 1;
    if offset > current {
        return Err(malformed(format!(
            "copy offset {} beyond {} decompressed bytes",
            offset, current
        )));
    }
    let from = out.len() - offset;
    for i in 0..length {
        let b = out[from + i];
        out.push(b);
    }
    Ok(())
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// One code module declared in the `dir` stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub stream_name: String,
    /// Start of the compressed source within the module stream.
    pub text_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub code_page: u16,
    pub modules: Vec<ModuleInfo>,
}

const PROJECTCODEPAGE: u16 = 0x0003;
const PROJECTVERSION: u16 = 0x0009;
const DIR_TERMINATOR: u16 = 0x0010;
const MODULENAME: u16 = 0x0019;
const MODULESTREAMNAME: u16 = 0x001a;
const MODULE_TERMINATOR: u16 = 0x002b;
const MODULEOFFSET: u16 = 0x0031;

/// Parse a decompressed `dir` stream into the project code page and module list.
pub fn parse_dir(dir: &[u8]) -> Result<ProjectInfo> {
    let mut code_page = 1252u16;
    let mut modules = Vec::new();
    let mut current = ModuleInfo::default();
    let mut pos = 0;

    while pos + 6 <= dir.len() {
        let id = read_u16(dir, pos).ok_or_else(|| malformed("truncated dir record"))?;
        let size = read_u32(dir, pos + 2).ok_or_else(|| malformed("truncated dir record"))? as usize;
        pos += 6;

        // Size field says 4 but the record carries a u32 major and u16 minor.
        let len = if id == PROJECTVERSION { 6 } else { size };
        let body = dir
            .get(pos..pos + len)
            .ok_or_else(|| malformed(format!("dir record 0x{:04x} overruns stream", id)))?;
        pos += len;

        match id {
            PROJECTCODEPAGE => code_page = read_u16(body, 0).unwrap_or(code_page),
            MODULENAME => current.name = String::from_utf8_lossy(body).into_owned(),
            MODULESTREAMNAME => current.stream_name = String::from_utf8_lossy(body).into_owned(),
            MODULEOFFSET => current.text_offset = read_u32(body, 0).unwrap_or(0),
            MODULE_TERMINATOR => {
                let mut module = std::mem::take(&mut current);
                if module.stream_name.is_empty() {
                    module.stream_name = module.name.clone();
                }
                modules.push(module);
            }
            DIR_TERMINATOR => break,
            _ => {}
        }
    }

    if modules.is_empty() {
        return Err(malformed("dir stream declares no modules"));
    }
    Ok(ProjectInfo { code_page, modules })
}

/// Encoding for a Windows code page; unknown pages fall back to windows-1252.
pub fn encoding_for_code_page(code_page: u16) -> &'static Encoding {
    match code_page {
        874 => encoding_rs::WINDOWS_874,
        932 => encoding_rs::SHIFT_JIS,
        936 => encoding_rs::GBK,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1200 => encoding_rs::UTF_16LE,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        10000 => encoding_rs::MACINTOSH,
        20866 => encoding_rs::KOI8_R,
        65001 => encoding_rs::UTF_8,
        _ => encoding_rs::WINDOWS_1252,
    }
}

/// Decode module source bytes using the project code page.
pub fn decode_source(bytes: &[u8], code_page: u16) -> String {
    let (text, _, _) = encoding_for_code_page(code_page).decode(bytes);
    text.into_owned()
}
