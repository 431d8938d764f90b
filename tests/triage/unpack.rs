use crate::common::*;
use sample_triage::{ContainerKind, IssueKind, ScanConfig, ScanStage, Scanner};
use std::fs;
use std::path::PathBuf;

fn scanner_with_rules(root: &std::path::Path) -> Scanner {
    let mut config = ScanConfig::default();
    config.rules.rule_dir = Some(rule_dir(root, &[("marker.yar", MARKER_RULE), ("mz.yar", MZ_RULE)]));
    config.unpack.upx_program = PathBuf::from("/nonexistent/bin/upx");
    Scanner::from_config(config).unwrap().0
}

#[test]
fn zip_members_are_sniffed_and_matched_one_level_deep() {
    let rules_root = tempfile::tempdir().unwrap();
    let scanner = scanner_with_rules(rules_root.path());

    let dir = tempfile::tempdir().unwrap();
    let inner = zip_bytes(&[("deep.txt", MARKER)]);
    let archive = zip_bytes(&[
        ("payload.exe", &pe32_bytes()[..]),
        ("notes/readme.txt", &b"see attachment"[..]),
        ("nested.zip", &inner[..]),
    ]);
    let path = write_file(dir.path(), "bundle.zip", &archive);

    let record = scanner.scan(&path).unwrap();
    assert_eq!(record.container_kind, ContainerKind::ZipFamily);
    assert_eq!(record.members.len(), 3, "{:?}", record.members);

    let member = |name: &str| {
        record
            .members
            .iter()
            .find(|m| m.path == PathBuf::from(name))
            .unwrap_or_else(|| panic!("missing member {}", name))
    };
    let payload = member("payload.exe");
    assert!(payload.signature_matches.contains("starts_with_mz"));
    assert!(payload
        .classification
        .as_ref()
        .unwrap()
        .raw_description
        .starts_with("PE32"));
    assert_eq!(payload.size, 0x400);

    // The nested archive is classified but never opened.
    let nested = member("nested.zip");
    assert_eq!(
        nested.classification.as_ref().unwrap().mime_type,
        "application/zip"
    );
    assert!(record.members.iter().all(|m| !m.path.ends_with("deep.txt")));

    assert!(member(&format!("notes{}readme.txt", std::path::MAIN_SEPARATOR))
        .signature_matches
        .is_empty());
    assert!(leftover_scratch(dir.path(), "_tmp").is_empty());
}

#[test]
fn traversal_entries_never_leave_the_scratch_area() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("inbox");
    fs::create_dir(&sub).unwrap();
    let archive = zip_bytes(&[
        ("../../escaped.txt", &b"gotcha"[..]),
        ("ok.txt", &b"fine"[..]),
    ]);
    let path = write_file(&sub, "evil.zip", &archive);

    let record = Scanner::from_config(ScanConfig::default())
        .unwrap()
        .0
        .scan(&path)
        .unwrap();
    assert_eq!(record.members.len(), 1);
    assert_eq!(record.members[0].path, PathBuf::from("ok.txt"));
    assert!(record.has_issue(ScanStage::Unpacking, IssueKind::UnpackFailure));
    assert!(!dir.path().join("escaped.txt").exists());
    assert!(!sub.join("escaped.txt").exists());
}

#[test]
fn existing_directory_at_scratch_path_survives() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "a.zip", &zip_bytes(&[("fresh.txt", &b"new"[..])]));
    let existing = dir.path().join("a.zip_tmp");
    fs::create_dir(&existing).unwrap();
    fs::write(existing.join("evidence.txt"), b"user data").unwrap();

    let record = Scanner::from_config(ScanConfig::default())
        .unwrap()
        .0
        .scan(&path)
        .unwrap();
    assert!(record.members.is_empty());
    assert!(record.has_issue(ScanStage::Unpacking, IssueKind::UnpackFailure));
    assert_eq!(fs::read(existing.join("evidence.txt")).unwrap(), b"user data");
}

#[test]
fn batch_scan_keeps_files_under_a_scratch_named_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.zip", &zip_bytes(&[("x.txt", &b"x"[..])]));
    let evidence = write_file(dir.path(), "a.zip_tmp/evidence.txt", b"user data");

    let mut config = ScanConfig::default();
    config.pipeline.jobs = Some(1);
    let results = Scanner::from_config(config)
        .unwrap()
        .0
        .scan_directory(dir.path())
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()), "{:?}", results);
    assert_eq!(fs::read(&evidence).unwrap(), b"user data");
}

#[test]
fn corrupt_rar_records_failure_and_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = b"Rar!\x1a\x07\x00".to_vec();
    data.extend_from_slice(&[0x5a; 64]);
    let path = write_file(dir.path(), "bad.rar", &data);

    let record = Scanner::from_config(ScanConfig::default())
        .unwrap()
        .0
        .scan(&path)
        .unwrap();
    assert_eq!(record.container_kind, ContainerKind::Rar);
    assert!(record.members.is_empty());
    assert!(record.has_issue(ScanStage::Unpacking, IssueKind::UnpackFailure));
    assert!(!dir.path().join("bad.rar_tmp").exists());
}

#[test]
fn occupied_scratch_path_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "b.zip", &zip_bytes(&[("x.txt", &b"x"[..])]));
    let occupied = write_file(dir.path(), "b.zip_tmp", b"user file");

    let record = Scanner::from_config(ScanConfig::default())
        .unwrap()
        .0
        .scan(&path)
        .unwrap();
    assert!(record.members.is_empty());
    assert!(record.has_issue(ScanStage::Unpacking, IssueKind::UnpackFailure));
    assert_eq!(fs::read(&occupied).unwrap(), b"user file");
}

#[test]
fn member_limit_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let entries: Vec<(String, Vec<u8>)> = (0..5)
        .map(|i| (format!("m{}.txt", i), format!("member {}", i).into_bytes()))
        .collect();
    let borrowed: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    let path = write_file(dir.path(), "many.zip", &zip_bytes(&borrowed));

    let mut config = ScanConfig::default();
    config.unpack.max_members = 3;
    let record = Scanner::from_config(config).unwrap().0.scan(&path).unwrap();
    assert_eq!(record.members.len(), 3);
    assert!(record.has_issue(ScanStage::Unpacking, IssueKind::BudgetExceeded));
}

#[test]
fn unpacking_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "c.zip", &zip_bytes(&[("x.txt", &b"x"[..])]));
    let mut config = ScanConfig::default();
    config.pipeline.unpack_containers = false;
    let record = Scanner::from_config(config).unwrap().0.scan(&path).unwrap();
    assert_eq!(record.container_kind, ContainerKind::ZipFamily);
    assert!(record.members.is_empty());
    assert!(!dir.path().join("c.zip_tmp").exists());
}

#[test]
fn relaxed_macro_dump_skips_an_unreadable_project_part() {
    let dir = tempfile::tempdir().unwrap();
    let project = vba_project_bin("Module1", MACRO_SOURCE);
    let package = zip_bytes(&[
        ("[Content_Types].xml", &b"<Types/>"[..]),
        ("word/document.xml", &b"<w:document/>"[..]),
        ("word/embeddings/vbaProject.bin", &b"this is not a compound file"[..]),
        ("word/vbaProject.bin", &project[..]),
    ]);
    let path = write_file(dir.path(), "mixed.docm", &package);
    let dest = tempfile::tempdir().unwrap();

    let config = ScanConfig::default();
    let summary = sample_triage::triage::unpack::write_macros(
        &path,
        dest.path(),
        &config.unpack,
        &config.io.limits(),
    )
    .unwrap();
    assert_eq!(summary.extracted, 1);
    let written = fs::read_to_string(dest.path().join("macros.txt")).unwrap();
    assert!(written.contains("Sub AutoOpen()"), "{}", written);

    // Strict feature extraction fails on the same package but the dump still lands.
    let record = scanner_with_rules(dir.path()).scan(&path).unwrap();
    assert!(record
        .issues
        .iter()
        .any(|i| i.stage == ScanStage::Extracting && i.kind == IssueKind::MalformedInput));
    assert!(record.members.iter().any(|m| m.path == PathBuf::from("macros.txt")), "{:?}", record.members);
}
