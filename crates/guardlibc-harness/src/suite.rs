//! One full harness run: cases, logs, report files and artifact index.

use std::path::{Path, PathBuf};

use guardlibc_membrane::diag::DiagnosticSink;
use guardlibc_membrane::global_metrics;

use crate::conformance::{ConformanceRunner, default_cases};
use crate::error::HarnessError;
use crate::report::ConformanceReport;
use crate::sink::JsonlFileSink;
use crate::structured_log::{ArtifactIndex, LogEmitter, validate_log_file};

/// Where a run writes its outputs.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub run_id: String,
    /// Harness events and forwarded wrapper diagnostics, one JSON per line.
    pub log: PathBuf,
    pub report_md: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
    pub artifact_index: Option<PathBuf>,
    /// Only run cases whose name contains this.
    pub filter: Option<String>,
}

impl SuiteConfig {
    #[must_use]
    pub fn new(run_id: impl Into<String>, log: impl Into<PathBuf>) -> Self {
        Self {
            run_id: run_id.into(),
            log: log.into(),
            report_md: None,
            report_json: None,
            artifact_index: None,
            filter: None,
        }
    }
}

fn write_file(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)
}

/// Run the built-in cases and write every requested output. The log is
/// validated before the report is returned.
pub fn run_suite(config: &SuiteConfig) -> Result<ConformanceReport, HarnessError> {
    if let Some(parent) = config.log.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut emitter = LogEmitter::to_file(&config.log, &config.run_id)?;
    let forward = JsonlFileSink::open(&config.log)?;
    let runner = ConformanceRunner::new(default_cases());
    let results = runner.run(
        config.filter.as_deref(),
        &mut emitter,
        Some(&forward as &dyn DiagnosticSink),
    )?;
    drop(emitter);

    let (lines, errors) = validate_log_file(&config.log)?;
    if !errors.is_empty() {
        return Err(HarnessError::InvalidLog {
            lines,
            errors: errors.len(),
        });
    }

    let report = ConformanceReport::new(
        "guardlibc wrapper conformance",
        &config.run_id,
        results,
        global_metrics().snapshot(),
    );
    if let Some(path) = &config.report_md {
        write_file(path, &report.to_markdown())?;
    }
    if let Some(path) = &config.report_json {
        write_file(path, &report.to_json())?;
    }

    if let Some(index_path) = &config.artifact_index {
        let mut index = ArtifactIndex::new(&config.run_id);
        index.add_file(&config.log, "log")?;
        for path in config.report_md.iter().chain(&config.report_json) {
            index.add_file(path, "report")?;
        }
        write_file(index_path, &index.to_json()?)?;
    }
    Ok(report)
}

/// Re-hash the artifacts listed in the index at `path`.
pub fn verify_artifacts(path: &Path) -> Result<usize, HarnessError> {
    let index: ArtifactIndex = serde_json::from_slice(&std::fs::read(path)?)?;
    let mismatched = index.verify();
    if mismatched.is_empty() {
        Ok(index.artifacts.len())
    } else {
        Err(HarnessError::ArtifactMismatch(mismatched))
    }
}
