use crate::common::*;
use sample_triage::{
    ContainerKind, FeatureRecord, FormatCategory, IssueKind, ScanConfig, ScanStage, Scanner,
};
use sample_triage::hashing::md5_digest;
use std::path::PathBuf;

fn scanner(config: ScanConfig) -> Scanner {
    Scanner::from_config(config).unwrap().0
}

fn hermetic_config() -> ScanConfig {
    let mut config = ScanConfig::default();
    config.unpack.upx_program = PathBuf::from("/nonexistent/bin/upx");
    config
}

#[test]
fn plain_text_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "readme.txt", b"nothing to see here\n");

    let record = scanner(hermetic_config()).scan(&path).unwrap();

    assert_eq!(record.classification.mime_type, "text/plain");
    assert_eq!(record.classification.raw_description, "ASCII text");
    assert_eq!(record.category, FormatCategory::Unknown);
    assert!(!record.macro_presence_possible);
    assert!(record.features.is_none());
    assert!(record.signature_matches.is_empty());
    assert_eq!(record.container_kind, ContainerKind::None);
    assert!(record.members.is_empty());
    assert_eq!(record.md5, md5_digest(b"nothing to see here\n"));
    assert_eq!(record.sha1.len(), 40);
    assert_eq!(record.sha256.len(), 64);
    assert_eq!(record.size, 20);
    assert!(record.entropy > 0.0);
}

#[test]
fn macro_enabled_docx() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "invoice.docm", &docm_bytes(MACRO_SOURCE));

    let record = scanner(hermetic_config()).scan(&path).unwrap();

    assert!(record.classification.raw_description.contains("Word 2007+"));
    assert_eq!(record.category, FormatCategory::Office);
    assert!(record.macro_presence_possible);
    assert_eq!(record.container_kind, ContainerKind::MacroOffice);
    assert!(record.container_flags.macro_office);
    assert!(record.container_flags.zip_family);

    let Some(FeatureRecord::Office(features)) = &record.features else {
        panic!("expected office features, got {:?}", record.features);
    };
    assert_eq!(features["has_macros"].as_bool(), Some(true));
    let code = features["code"].as_text().unwrap();
    assert!(code.contains("Sub AutoOpen()"));
    assert!(!code.contains("Attribute VB_Name"));
    let analysis = features["analysis"].as_list().unwrap();
    assert!(analysis.iter().any(|a| a.starts_with("AutoExec: AutoOpen")));
    assert!(analysis.iter().any(|a| a.starts_with("Suspicious: Shell")));

    let members: Vec<_> = record.members.iter().map(|m| m.path.clone()).collect();
    assert!(members.contains(&PathBuf::from("macros.txt")), "{:?}", members);
    assert!(members.contains(&PathBuf::from("word").join("document.xml")));
    let macros = record
        .members
        .iter()
        .find(|m| m.path == PathBuf::from("macros.txt"))
        .unwrap();
    assert_eq!(
        macros.classification.as_ref().map(|c| c.mime_type.as_str()),
        Some("text/plain")
    );

    assert!(!dir.path().join("invoice.docm_tmp").exists());
}

#[test]
fn truncated_pe() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "dropper.exe", &truncated_pe_bytes());

    let record = scanner(hermetic_config()).scan(&path).unwrap();

    assert!(record.classification.raw_description.starts_with("PE32"));
    assert_eq!(record.category, FormatCategory::Executable);
    assert!(record.features.is_none());
    assert!(record.has_issue(ScanStage::Extracting, IssueKind::MalformedExecutable));
    assert_eq!(record.size, 0xa0);
    assert_eq!(record.sha256.len(), 64);

    // No unpacker available: zero members, failure recorded, scratch gone.
    assert_eq!(record.container_kind, ContainerKind::PackedExecutable);
    assert!(record.members.is_empty());
    assert!(record.has_issue(ScanStage::Unpacking, IssueKind::UnpackFailure));
    assert!(!dir.path().join("dropper.exe_tmp").exists());
}

#[test]
fn empty_rule_directory() {
    let dir = tempfile::tempdir().unwrap();
    let rules = rule_dir(dir.path(), &[]);
    let sample = write_file(dir.path(), "sample.bin", MARKER);

    let mut config = hermetic_config();
    config.rules.rule_dir = Some(rules);
    let (scanner, report) = Scanner::from_config(config).unwrap();
    let report = report.unwrap();
    assert!(report.accepted.is_empty());
    assert!(report.rejected.is_empty());

    let record = scanner.scan(&sample).unwrap();
    assert!(record.signature_matches.is_empty());
    assert!(record.issues.is_empty(), "{:?}", record.issues);
}

#[test]
fn valid_pe_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "hello.exe", &pe32_bytes());
    let rules = rule_dir(dir.path(), &[("mz.yar", MZ_RULE)]);

    let mut config = hermetic_config();
    config.rules.rule_dir = Some(rules);
    let record = scanner(config).scan(&path).unwrap();

    let Some(FeatureRecord::Executable(features)) = &record.features else {
        panic!("expected executable features, got {:?}", record.features);
    };
    assert_eq!(features["number_of_sections"].as_int(), Some(1));
    assert_eq!(features["pe_exe"].as_bool(), Some(true));
    assert_eq!(features["pe_dll"].as_bool(), Some(false));
    assert!(record.signature_matches.contains("starts_with_mz"));
}

#[test]
fn pdf_document_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "report.pdf", &pdf_bytes());

    let record = scanner(hermetic_config()).scan(&path).unwrap();

    assert_eq!(record.classification.mime_type, "application/pdf");
    assert_eq!(record.category, FormatCategory::Document);
    assert_eq!(record.container_kind, ContainerKind::None);
    let Some(FeatureRecord::Document(features)) = &record.features else {
        panic!("expected document features, got {:?}", record.features);
    };
    assert_eq!(features["indirect_obj"].as_int(), Some(2));
    assert_eq!(features["root"].as_text(), Some("1 0 R"));
    assert_eq!(features["version"].as_text(), Some("1.5"));
}

#[test]
fn pdf_stream_payload_does_not_leak_into_counts() {
    let dir = tempfile::tempdir().unwrap();
    let payload = b"endobj\n5 0 obj\n<< /Type /Page /OpenAction 1 0 R >>\nendobj\n";
    let mut stream = format!("<< /Length {} >>\nstream\n", payload.len()).into_bytes();
    stream.extend_from_slice(payload);
    stream.extend_from_slice(b"\nendstream");
    let data = pdf_with_objects(
        "1.7",
        &[
            &b"<< /Type /Catalog /Pages 2 0 R >>"[..],
            &b"<< /Type /Pages /Kids [] /Count 0 >>"[..],
            &stream[..],
        ],
    );
    let path = write_file(dir.path(), "stream.pdf", &data);

    let record = scanner(hermetic_config()).scan(&path).unwrap();
    let Some(FeatureRecord::Document(features)) = &record.features else {
        panic!("expected document features, got {:?}", record.features);
    };
    assert_eq!(features["indirect_obj"].as_int(), Some(3));
    assert_eq!(features["open_action"].as_int(), Some(0));
    assert!(!features["names"].as_list().unwrap().contains(&"/Page".to_string()));
    assert!(record.issues.is_empty(), "{:?}", record.issues);
}

#[test]
fn unparseable_pdf_keeps_lexical_counts_and_records_an_issue() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "broken.pdf",
        b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\nstartxref\n99999\n%%EOF\n",
    );

    let record = scanner(hermetic_config()).scan(&path).unwrap();
    let Some(FeatureRecord::Document(features)) = &record.features else {
        panic!("expected document features, got {:?}", record.features);
    };
    assert_eq!(features["indirect_obj"].as_int(), Some(1));
    assert!(record.has_issue(ScanStage::Extracting, IssueKind::MalformedInput));
}

#[test]
fn unreadable_path_is_the_only_fatal_error() {
    let err = scanner(hermetic_config())
        .scan("/nonexistent/definitely/missing.bin")
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn record_serializes_flat() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "a.txt", b"flat\n");
    let record = scanner(hermetic_config()).scan(&path).unwrap();
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["mime_type"], "text/plain");
    assert_eq!(json["file_name"], "a.txt");
    assert!(json["signature_matches"].as_array().unwrap().is_empty());
}
