//! Structured JSONL logging for conformance runs.
//!
//! Two record shapes share one log file:
//! - [`LogEntry`]: harness events (run start, one per case, run end).
//! - wrapper [`Diagnostic`]s, written by [`JsonlFileSink`](crate::sink::JsonlFileSink)
//!   while a case runs; recognizable by their `tag` field.
//!
//! [`validate_log_line`] and [`validate_log_file`] check either shape against
//! its schema. [`ArtifactIndex`] ties a run's output files together with
//! SHA-256 digests.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use guardlibc_membrane::diag::{self, Diagnostic, TAG};

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity of a harness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Result of one conformance case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
}

/// Canonical harness log record.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Conformance case name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    /// Wrapper family the case exercises (`malloc`, `unistd`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    /// Diagnostics the wrappers emitted during the case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: diag::now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            case: None,
            family: None,
            outcome: None,
            errno: None,
            diagnostics: None,
            duration_us: None,
            artifact_refs: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Set the case name and its wrapper family.
    #[must_use]
    pub fn with_case(mut self, case: impl Into<String>, family: impl Into<String>) -> Self {
        self.case = Some(case.into());
        self.family = Some(family.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, count: usize) -> Self {
        self.diagnostics = Some(count);
        self
    }

    #[must_use]
    pub fn with_duration_us(mut self, us: u64) -> Self {
        self.duration_us = Some(us);
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Artifact index
// ---------------------------------------------------------------------------

/// A single artifact entry in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Output files of one run with their digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: diag::now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Hash `path` and record it under `kind`.
    pub fn add_file(&mut self, path: &Path, kind: impl Into<String>) -> std::io::Result<&mut Self> {
        let data = std::fs::read(path)?;
        self.artifacts.push(ArtifactEntry {
            path: path.display().to_string(),
            kind: kind.into(),
            sha256: sha256_hex(&data),
            size_bytes: Some(data.len() as u64),
        });
        Ok(self)
    }

    /// Re-hash every artifact and return the paths whose digest changed or
    /// that can no longer be read.
    #[must_use]
    pub fn verify(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .filter(|a| {
                std::fs::read(&a.path)
                    .map(|data| sha256_hex(&data) != a.sha256)
                    .unwrap_or(true)
            })
            .map(|a| a.path.clone())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    use std::fmt::Write as _;
    Sha256::digest(data)
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Writes harness [`LogEntry`] lines with sequential trace ids
/// (`<run_id>::<seq>`).
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
    run_id: String,
}

impl LogEmitter {
    /// Append to `path`, creating it if needed.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(std::io::LineWriter::new(file)),
            seq: 0,
            run_id: run_id.to_string(),
        })
    }

    /// Discard output; trace ids are still generated.
    #[must_use]
    pub fn sink(run_id: &str) -> Self {
        Self {
            writer: Box::new(std::io::sink()),
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{:03}", self.run_id, self.seq)
    }

    /// Emit a bare event with a fresh trace id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let entry = LogEntry::new(String::new(), level, event);
        self.emit_entry(entry)
    }

    /// Emit `entry`, filling in the trace id and run id when unset.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<LogEntry> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(entry)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// A line that passed validation.
#[derive(Debug, Clone)]
pub enum LogLine {
    Event(LogEntry),
    Diagnostic(Diagnostic),
}

struct Checker<'a> {
    line_number: usize,
    obj: &'a serde_json::Map<String, serde_json::Value>,
    errors: Vec<LogValidationError>,
}

impl Checker<'_> {
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(LogValidationError {
            line_number: self.line_number,
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn required(&mut self, fields: &[&str]) {
        for field in fields {
            if !self.obj.contains_key(*field) {
                self.fail(field, "required field missing");
            }
        }
    }

    fn one_of(&mut self, field: &str, allowed: &[&str]) {
        let Some(value) = self.obj.get(field) else {
            return;
        };
        match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => self.fail(field, format!("invalid {field}: '{s}'")),
            None => self.fail(field, "expected a string"),
        }
    }
}

/// Validate one JSONL line as either a harness event or a wrapper
/// diagnostic.
pub fn validate_log_line(line: &str, line_number: usize) -> Result<LogLine, Vec<LogValidationError>> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        vec![LogValidationError {
            line_number,
            field: "<json>".to_string(),
            message: format!("invalid JSON: {e}"),
        }]
    })?;
    let Some(obj) = value.as_object() else {
        return Err(vec![LogValidationError {
            line_number,
            field: "<root>".to_string(),
            message: "expected JSON object".to_string(),
        }]);
    };

    let mut check = Checker {
        line_number,
        obj,
        errors: Vec::new(),
    };
    let is_diagnostic = obj.contains_key("tag");

    if is_diagnostic {
        check.required(&["timestamp", "level", "tag", "op", "message"]);
        check.one_of("level", &["warn", "error", "panic"]);
        check.one_of("tag", &[TAG]);
        if obj.get("args").is_some_and(|a| !a.is_object()) {
            check.fail("args", "expected an object of named fields");
        }
        if obj.contains_key("description") && !obj.contains_key("errno") {
            check.fail("description", "description without errno");
        }
    } else {
        check.required(&["timestamp", "trace_id", "level", "event"]);
        check.one_of("level", &["info", "warn", "error"]);
        check.one_of("outcome", &["pass", "fail"]);
        if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
            && !trace_id.contains("::")
        {
            check.fail(
                "trace_id",
                format!("trace_id should follow <run_id>::<seq> format, got: '{trace_id}'"),
            );
        }
    }

    let mut errors = check.errors;
    if !errors.is_empty() {
        return Err(errors);
    }

    let parsed = if is_diagnostic {
        serde_json::from_value(value).map(LogLine::Diagnostic)
    } else {
        serde_json::from_value(value).map(LogLine::Event)
    };
    parsed.map_err(|e| {
        errors.push(LogValidationError {
            line_number,
            field: "<deserialization>".to_string(),
            message: format!("failed to deserialize: {e}"),
        });
        errors
    })
}

/// Validate an entire JSONL file.
///
/// Returns the number of non-empty lines and every validation error found.
pub fn validate_log_file(path: &Path) -> std::io::Result<(usize, Vec<LogValidationError>)> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}
