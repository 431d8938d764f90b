//! Fixture builders shared by the integration tests.
//!
//! Every sample is generated at test time inside a `tempfile` directory, so
//! no binary fixtures are checked in.

#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

pub const MARKER: &[u8] = b"TRIAGE-MARKER-7f3a";

pub const MARKER_RULE: &str = r#"
rule marker_hit {
    strings:
        $a = "TRIAGE-MARKER-7f3a"
    condition:
        $a
}
"#;

pub const MZ_RULE: &str = r#"
rule starts_with_mz {
    condition:
        uint16(0) == 0x5a4d
}
"#;

pub const BROKEN_RULE: &str = "rule broken { strings: $a = \"x\" condition: $b }";

pub const MACRO_SOURCE: &str = "Attribute VB_Name = \"Module1\"\r\n\
Sub AutoOpen()\r\n\
    Shell \"cmd.exe /c calc\"\r\n\
End Sub\r\n";

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, data).unwrap();
    path
}

/// Zip archive bytes holding `entries` in order.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        for (name, data) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// MS-OVBA container using literal tokens only.
pub fn ovba_compress(data: &[u8]) -> Vec<u8> {
    const CHUNK_INPUT: usize = 3640;
    let mut out = vec![0x01];
    for chunk in data.chunks(CHUNK_INPUT) {
        let mut body = Vec::with_capacity(chunk.len() + chunk.len() / 8 + 1);
        for group in chunk.chunks(8) {
            body.push(0x00);
            body.extend_from_slice(group);
        }
        let header = 0xb000u16 | ((body.len() + 2 - 3) as u16);
        out.extend_from_slice(&header.to_le_bytes());
        out.extend_from_slice(&body);
    }
    out
}

fn dir_record(id: u16, body: &[u8]) -> Vec<u8> {
    let mut out = id.to_le_bytes().to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Decompressed `dir` stream declaring one module at text offset 0.
pub fn vba_dir_stream(module: &str) -> Vec<u8> {
    let mut dir = Vec::new();
    dir.extend(dir_record(0x0001, &3u32.to_le_bytes()));
    dir.extend(dir_record(0x0003, &1252u16.to_le_bytes()));
    dir.extend(dir_record(0x0019, module.as_bytes()));
    dir.extend(dir_record(0x001a, module.as_bytes()));
    dir.extend(dir_record(0x0031, &0u32.to_le_bytes()));
    dir.extend(dir_record(0x002b, &[]));
    dir.extend(dir_record(0x0010, &[]));
    dir
}

/// `vbaProject.bin` compound file with one module holding `source`.
pub fn vba_project_bin(module: &str, source: &str) -> Vec<u8> {
    let mut compound = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    compound.create_storage("/VBA").unwrap();
    {
        let mut dir = compound.create_stream("/VBA/dir").unwrap();
        dir.write_all(&ovba_compress(&vba_dir_stream(module))).unwrap();
        dir.flush().unwrap();
    }
    {
        let mut stream = compound
            .create_stream(format!("/VBA/{}", module))
            .unwrap();
        stream.write_all(&ovba_compress(source.as_bytes())).unwrap();
        stream.flush().unwrap();
    }
    compound.flush().unwrap();
    compound.into_inner().into_inner()
}

/// Macro-enabled Word package.
pub fn docm_bytes(source: &str) -> Vec<u8> {
    let project = vba_project_bin("Module1", source);
    zip_bytes(&[
        ("[Content_Types].xml", &b"<Types/>"[..]),
        ("word/document.xml", &b"<w:document/>"[..]),
        ("word/vbaProject.bin", &project[..]),
    ])
}

/// Minimal valid PE32 console image with one `.text` section.
pub fn pe32_bytes() -> Vec<u8> {
    let e_lfanew = 0x80usize;
    let mut data = vec![0u8; 0x400];
    data[0..2].copy_from_slice(b"MZ");
    data[0x3c..0x40].copy_from_slice(&(e_lfanew as u32).to_le_bytes());
    data[e_lfanew..e_lfanew + 4].copy_from_slice(b"PE\0\0");

    let coff = e_lfanew + 4;
    data[coff..coff + 2].copy_from_slice(&0x014cu16.to_le_bytes());
    data[coff + 2..coff + 4].copy_from_slice(&1u16.to_le_bytes());
    data[coff + 16..coff + 18].copy_from_slice(&0xe0u16.to_le_bytes());
    data[coff + 18..coff + 20].copy_from_slice(&0x0102u16.to_le_bytes());

    let opt = coff + 20;
    data[opt..opt + 2].copy_from_slice(&0x010bu16.to_le_bytes());
    data[opt + 4..opt + 8].copy_from_slice(&0x200u32.to_le_bytes());
    data[opt + 16..opt + 20].copy_from_slice(&0x1000u32.to_le_bytes());
    data[opt + 28..opt + 32].copy_from_slice(&0x0040_0000u32.to_le_bytes());
    data[opt + 32..opt + 36].copy_from_slice(&0x1000u32.to_le_bytes());
    data[opt + 36..opt + 40].copy_from_slice(&0x200u32.to_le_bytes());
    data[opt + 40..opt + 42].copy_from_slice(&6u16.to_le_bytes());
    data[opt + 48..opt + 50].copy_from_slice(&6u16.to_le_bytes());
    data[opt + 56..opt + 60].copy_from_slice(&0x2000u32.to_le_bytes());
    data[opt + 60..opt + 64].copy_from_slice(&0x200u32.to_le_bytes());
    data[opt + 68..opt + 70].copy_from_slice(&3u16.to_le_bytes());
    data[opt + 92..opt + 96].copy_from_slice(&16u32.to_le_bytes());

    let sec = opt + 0xe0;
    data[sec..sec + 8].copy_from_slice(b".text\0\0\0");
    data[sec + 8..sec + 12].copy_from_slice(&0x100u32.to_le_bytes());
    data[sec + 12..sec + 16].copy_from_slice(&0x1000u32.to_le_bytes());
    data[sec + 16..sec + 20].copy_from_slice(&0x200u32.to_le_bytes());
    data[sec + 20..sec + 24].copy_from_slice(&0x200u32.to_le_bytes());
    data[sec + 36..sec + 40].copy_from_slice(&0x6000_0020u32.to_le_bytes());
    data[0x200] = 0xc3;
    data
}

/// PE whose headers stop inside the optional header.
pub fn truncated_pe_bytes() -> Vec<u8> {
    pe32_bytes()[..0xa0].to_vec()
}

/// PDF body with a correct cross-reference table for `objects`, numbered from 1.
pub fn pdf_with_objects(version: &str, objects: &[&[u8]]) -> Vec<u8> {
    let mut out = format!("%PDF-{}\n%\u{e2}\u{e3}\u{cf}\u{d3}\n", version).into_bytes();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

pub fn pdf_bytes() -> Vec<u8> {
    pdf_with_objects(
        "1.5",
        &[
            &b"<< /Type /Catalog /Pages 2 0 R >>"[..],
            &b"<< /Type /Pages /Kids [] /Count 0 >>"[..],
        ],
    )
}

/// Rule directory with the given `(file name, source)` pairs.
pub fn rule_dir(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join("rules");
    fs::create_dir_all(&dir).unwrap();
    for (name, source) in files {
        fs::write(dir.join(name), source).unwrap();
    }
    dir
}

/// Directories below `dir` whose name ends in `suffix`.
pub fn leftover_scratch(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| e.file_name().to_string_lossy().ends_with(suffix))
        .map(|e| e.into_path())
        .collect()
}
