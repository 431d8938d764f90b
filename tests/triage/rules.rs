use crate::common::*;
use sample_triage::triage::config::RulesConfig;
use sample_triage::{RuleSet, ScanConfig, ScanError, Scanner};

#[test]
fn invalid_file_is_excluded_and_the_rest_compile() {
    let dir = tempfile::tempdir().unwrap();
    let rules = rule_dir(
        dir.path(),
        &[
            ("marker.yar", MARKER_RULE),
            ("mz.yara", MZ_RULE),
            ("broken.yar", BROKEN_RULE),
        ],
    );

    let (set, report) = RuleSet::compile(&rules, &RulesConfig::default()).unwrap();
    assert_eq!(report.accepted.len(), 2);
    assert_eq!(report.rejected.len(), 1);
    assert!(report.rejected[0].path.ends_with("broken.yar"));
    assert!(!report.rejected[0].reason.is_empty());

    let sample = write_file(dir.path(), "hit.txt", MARKER);
    let hits = set.match_file(&sample);
    assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec!["marker_hit"]);
}

#[test]
fn only_configured_extensions_are_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let rules = rule_dir(
        dir.path(),
        &[("marker.yar", MARKER_RULE), ("README.md", "# not a rule")],
    );
    let (_, report) = RuleSet::compile(&rules, &RulesConfig::default()).unwrap();
    assert_eq!(report.accepted.len(), 1);
    assert!(report.rejected.is_empty());
}

#[test]
fn nested_rule_files_share_names_without_collision() {
    let dir = tempfile::tempdir().unwrap();
    let rules = rule_dir(dir.path(), &[]);
    std::fs::create_dir_all(rules.join("a")).unwrap();
    std::fs::create_dir_all(rules.join("b")).unwrap();
    std::fs::write(rules.join("a/marker.yar"), MARKER_RULE).unwrap();
    std::fs::write(rules.join("b/marker.yar"), MARKER_RULE).unwrap();

    let (set, report) = RuleSet::compile(&rules, &RulesConfig::default()).unwrap();
    assert_eq!(report.accepted.len(), 2);
    assert!(set.try_match_bytes(MARKER).unwrap().contains("marker_hit"));
}

#[test]
fn matching_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let rules = rule_dir(dir.path(), &[("marker.yar", MARKER_RULE), ("mz.yar", MZ_RULE)]);
    let (set, _) = RuleSet::compile(&rules, &RulesConfig::default()).unwrap();
    let sample = write_file(dir.path(), "x.exe", &{
        let mut pe = pe32_bytes();
        pe[0x300..0x300 + MARKER.len()].copy_from_slice(MARKER);
        pe
    });

    let first = set.match_file(&sample);
    let second = set.match_file(&sample);
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn match_failure_yields_empty_set() {
    let dir = tempfile::tempdir().unwrap();
    let rules = rule_dir(dir.path(), &[("marker.yar", MARKER_RULE)]);
    let (set, _) = RuleSet::compile(&rules, &RulesConfig::default()).unwrap();
    assert!(set.match_file(dir.path().join("missing.bin")).is_empty());
    assert!(set.try_match_file(dir.path().join("missing.bin")).is_err());
}

#[test]
fn missing_rule_directory_fails_scanner_construction() {
    let mut config = ScanConfig::default();
    config.rules.rule_dir = Some("/nonexistent/rules".into());
    let err = Scanner::from_config(config).unwrap_err();
    assert!(matches!(err, ScanError::Io { .. }));
}
