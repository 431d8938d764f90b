use crate::common::*;
use sample_triage::{IssueKind, ScanConfig, ScanError, ScanStage, Scanner};
use std::fs;
use std::path::PathBuf;

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "triage.json",
        br#"{
            "unpack": {"scratch_suffix": ".unpacked", "max_members": 10},
            "pipeline": {"extract_features": false}
        }"#,
    );
    let config = ScanConfig::from_path(&path).unwrap();
    assert_eq!(config.unpack.scratch_suffix, ".unpacked");
    assert_eq!(config.unpack.max_members, 10);
    assert_eq!(config.unpack.archive_password, "infected");
    assert!(!config.pipeline.extract_features);
    assert!(config.pipeline.match_signatures);
}

#[test]
fn custom_scratch_suffix_is_used_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let sample = write_file(dir.path(), "x.zip", &zip_bytes(&[("a.txt", &b"a"[..])]));
    let mut config = ScanConfig::default();
    config.unpack.scratch_suffix = ".unpacked".to_string();
    let record = Scanner::from_config(config).unwrap().0.scan(&sample).unwrap();
    assert_eq!(record.members.len(), 1);
    assert!(!dir.path().join("x.zip.unpacked").exists());
}

#[test]
fn disabled_features_skip_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let sample = write_file(dir.path(), "doc.pdf", &pdf_bytes());
    let mut config = ScanConfig::default();
    config.pipeline.extract_features = false;
    let record = Scanner::from_config(config).unwrap().0.scan(&sample).unwrap();
    assert!(record.features.is_none());
    assert!(record.macro_presence_possible);
}

#[test]
fn malformed_config_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "bad.json", b"{\"unpack\": 5}");
    assert!(matches!(ScanConfig::from_path(&path), Err(ScanError::Config(_))));
}

#[test]
fn sniff_size_bounds_content_classification() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = b"release notes, nothing else\n".repeat(4);
    data.extend_from_slice(b"\x00\x01\x02 binary tail");
    let sample = write_file(dir.path(), "notes.txt", &data);

    let mut config = ScanConfig::default();
    config.io.max_sniff_size = 32;
    let record = Scanner::from_config(config).unwrap().0.scan(&sample).unwrap();
    assert_eq!(record.classification.raw_description, "ASCII text");
    assert_eq!(record.size, data.len() as u64);

    let unbounded = Scanner::from_config(ScanConfig::default())
        .unwrap()
        .0
        .scan(&sample)
        .unwrap();
    assert_eq!(unbounded.classification.raw_description, "data");
}

#[test]
fn small_sniff_size_still_refines_office_packages() {
    let dir = tempfile::tempdir().unwrap();
    let sample = write_file(dir.path(), "invoice.docm", &docm_bytes(MACRO_SOURCE));
    let mut config = ScanConfig::default();
    config.io.max_sniff_size = 64;
    config.pipeline.unpack_containers = false;
    let record = Scanner::from_config(config).unwrap().0.scan(&sample).unwrap();
    assert!(record.classification.raw_description.contains("Word 2007+"));
}

#[test]
fn oversized_sample_is_recorded_from_its_head() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "big.exe", &pe32_bytes());
    let size = fs::metadata(&path).unwrap().len();

    let mut config = ScanConfig::default();
    config.io.max_file_size = 64;
    config.unpack.upx_program = PathBuf::from("/nonexistent/bin/upx");
    let record = Scanner::from_config(config).unwrap().0.scan(&path).unwrap();

    assert_eq!(record.size, size);
    assert!(record.stat.is_some());
    assert_eq!(record.classification.mime_type, "application/x-dosexec");
    assert!(record.has_issue(ScanStage::Sniffing, IssueKind::BudgetExceeded));
    assert!(record.md5.is_empty());
    assert!(record.features.is_none());
    assert!(record.members.is_empty());
}

#[test]
fn read_budget_below_file_size_is_recorded_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "notes.txt", &b"line of plain text\n".repeat(20));

    let mut config = ScanConfig::default();
    config.io.max_read_bytes = 10;
    let record = Scanner::from_config(config).unwrap().0.scan(&path).unwrap();

    assert_eq!(record.classification.mime_type, "text/plain");
    assert!(record.has_issue(ScanStage::Sniffing, IssueKind::BudgetExceeded));
    assert_eq!(record.size, 380);
}
