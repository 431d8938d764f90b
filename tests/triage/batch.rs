use crate::common::*;
use sample_triage::{ScanConfig, Scanner};
use std::path::PathBuf;

#[test]
fn directory_scan_covers_every_top_level_file_once() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"alpha\n");
    write_file(dir.path(), "b.zip", &zip_bytes(&[("inner.txt", &b"inner"[..])]));
    write_file(dir.path(), "sub/c.pdf", &pdf_bytes());
    write_file(dir.path(), "sub/d.docm", &docm_bytes(MACRO_SOURCE));

    let mut config = ScanConfig::default();
    config.pipeline.jobs = Some(2);
    let scanner = Scanner::from_config(config).unwrap().0;
    let results = scanner.scan_directory(dir.path()).unwrap();

    let paths: Vec<PathBuf> = results
        .iter()
        .map(|(p, _)| p.strip_prefix(dir.path()).unwrap().to_path_buf())
        .collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("a.txt"),
            PathBuf::from("b.zip"),
            PathBuf::from("sub/c.pdf"),
            PathBuf::from("sub/d.docm"),
        ]
    );
    for (path, result) in &results {
        let record = result.as_ref().unwrap();
        assert_eq!(&record.path, path);
    }

    let zip = results[1].1.as_ref().unwrap();
    assert_eq!(zip.members.len(), 1);
    assert!(leftover_scratch(dir.path(), "_tmp").is_empty());
}

#[test]
fn directory_scan_rejects_missing_directory() {
    let scanner = Scanner::from_config(ScanConfig::default()).unwrap().0;
    let err = scanner.scan_directory("/nonexistent/batch").unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn empty_directory_yields_no_records() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = Scanner::from_config(ScanConfig::default()).unwrap().0;
    assert!(scanner.scan_directory(dir.path()).unwrap().is_empty());
}
