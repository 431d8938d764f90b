use crate::common::*;
use sample_triage::triage::containers::inspect_description;
use sample_triage::core::triage::formats::DISPATCH_ORDER;
use sample_triage::triage::sniffers::TypeSniffer;
use sample_triage::{ContainerKind, FormatCategory, ScanConfig, Scanner};

#[test]
fn classification_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let sniffer = TypeSniffer::default();
    for (name, data) in [
        ("a.docm", docm_bytes(MACRO_SOURCE)),
        ("b.exe", pe32_bytes()),
        ("c.pdf", pdf_bytes()),
        ("d.txt", b"hello\n".to_vec()),
    ] {
        let path = write_file(dir.path(), name, &data);
        let first = sniffer.classify(&path).unwrap();
        let second = sniffer.classify(&path).unwrap();
        assert_eq!(first, second, "{}", name);
    }
}

#[test]
fn container_kind_is_exactly_one() {
    let cases = [
        ("Microsoft Word 2007+", ContainerKind::MacroOffice),
        ("Microsoft Excel 2007+", ContainerKind::MacroOffice),
        ("Zip archive data", ContainerKind::ZipFamily),
        ("Java archive data (JAR)", ContainerKind::ZipFamily),
        ("RAR archive data, v5", ContainerKind::Rar),
        ("PE32 executable (GUI) Intel 80386, for MS Windows", ContainerKind::PackedExecutable),
        ("PE32+ executable (console) x86-64, for MS Windows", ContainerKind::PackedExecutable),
        ("ASCII text", ContainerKind::None),
    ];
    for (description, kind) in cases {
        assert_eq!(inspect_description(description).primary(), kind, "{}", description);
    }

    let ooxml = inspect_description("Microsoft PowerPoint 2007+");
    assert!(ooxml.macro_office && ooxml.zip_family);
    assert!(!ooxml.rar && !ooxml.packed_executable);
}

#[test]
fn dispatch_prefers_earlier_category() {
    // One MIME listed in every table resolves to whichever category is walked first.
    let mime = "application/x-overlap";
    let tables: Vec<(FormatCategory, Vec<&str>)> = DISPATCH_ORDER
        .iter()
        .map(|c| (*c, c.mime_table().iter().copied().chain([mime]).collect()))
        .collect();

    for start in 0..tables.len() {
        let rotated = tables[start..]
            .iter()
            .chain(&tables[..start])
            .map(|(c, mimes)| (*c, mimes.as_slice()));
        assert_eq!(FormatCategory::dispatch_in(rotated, mime), tables[start].0);
    }

    assert_eq!(FormatCategory::dispatch("application/msword"), FormatCategory::Office);
    assert_eq!(FormatCategory::dispatch("application/pdf"), FormatCategory::Document);
    assert_eq!(FormatCategory::dispatch("text/plain"), FormatCategory::Unknown);
}

#[test]
fn repeated_scans_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "doc.docm", &docm_bytes(MACRO_SOURCE));
    let scanner = Scanner::from_config(ScanConfig::default()).unwrap().0;

    let first = scanner.scan(&path).unwrap();
    let second = scanner.scan(&path).unwrap();
    assert_eq!(first.classification, second.classification);
    assert_eq!(first.sha256, second.sha256);
    assert_eq!(first.features, second.features);
    assert_eq!(first.signature_matches, second.signature_matches);
    assert_eq!(first.members, second.members);
    assert_eq!(first.issues, second.issues);
}

#[test]
fn no_scratch_survives_a_failing_container() {
    let dir = tempfile::tempdir().unwrap();
    let mut broken = docm_bytes(MACRO_SOURCE);
    let len = broken.len();
    broken.truncate(len - 40);
    let path = write_file(dir.path(), "broken.docm", &broken);

    let scanner = Scanner::from_config(ScanConfig::default()).unwrap().0;
    let record = scanner.scan(&path).unwrap();
    assert!(!record.issues.is_empty());
    assert!(leftover_scratch(dir.path(), "_tmp").is_empty());
}
