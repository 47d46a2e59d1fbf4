#![cfg(target_os = "linux")]
//! Full harness run into a scratch directory.

use std::path::PathBuf;

use guardlibc_harness::structured_log::{LogLine, validate_log_file, validate_log_line};
use guardlibc_harness::{HarnessError, SuiteConfig, run_suite, verify_artifacts};

fn scratch(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("guardlibc-harness-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn suite_writes_valid_log_reports_and_index() {
    let dir = scratch("suite");
    let mut config = SuiteConfig::new("suite-test", dir.join("run.jsonl"));
    config.report_md = Some(dir.join("report.md"));
    config.report_json = Some(dir.join("report.json"));
    config.artifact_index = Some(dir.join("index.json"));

    let report = run_suite(&config).unwrap();
    assert_eq!(report.summary.failed, 0, "{}", report.to_markdown());
    assert!(report.summary.total >= 10);

    let (lines, errors) = validate_log_file(&config.log).unwrap();
    assert!(errors.is_empty(), "{errors:?}");
    // run_start, one event per case, run_end, plus forwarded diagnostics.
    assert!(lines >= report.summary.total + 2);

    let content = std::fs::read_to_string(&config.log).unwrap();
    let parsed: Vec<LogLine> = content
        .lines()
        .enumerate()
        .map(|(i, l)| validate_log_line(l, i + 1).unwrap())
        .collect();
    let diagnostics = parsed
        .iter()
        .filter(|l| matches!(l, LogLine::Diagnostic(_)))
        .count();
    let expected: usize = report.results.iter().map(|r| r.diagnostics).sum();
    assert_eq!(diagnostics, expected);
    assert!(parsed.iter().any(|l| matches!(
        l,
        LogLine::Diagnostic(d) if d.op == "malloc"
    )));

    assert!(std::fs::read_to_string(dir.join("report.md")).unwrap().contains("| malloc_huge |"));
    assert_eq!(verify_artifacts(&dir.join("index.json")).unwrap(), 3);

    std::fs::write(dir.join("report.md"), "tampered").unwrap();
    match verify_artifacts(&dir.join("index.json")) {
        Err(HarnessError::ArtifactMismatch(paths)) => {
            assert_eq!(paths.len(), 1);
            assert!(paths[0].ends_with("report.md"));
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn filter_limits_the_run() {
    let dir = scratch("filter");
    let mut config = SuiteConfig::new("filter-test", dir.join("run.jsonl"));
    config.filter = Some("strcmp".to_string());
    let report = run_suite(&config).unwrap();
    assert_eq!(report.summary.total, 1);
    assert_eq!(report.results[0].name, "strcmp_null_ordering");
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn corrupt_log_is_reported_per_line() {
    let dir = scratch("corrupt");
    let path = dir.join("bad.jsonl");
    std::fs::write(&path, "{\"not\":\"a record\"}\nnot json\n").unwrap();
    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 2);
    assert!(errors.iter().any(|e| e.line_number == 1));
    assert!(errors.iter().any(|e| e.line_number == 2));
    std::fs::remove_dir_all(&dir).unwrap();
}
