//! Diagnostic records and sinks.
//!
//! Every notable wrapper event (rejected argument, failed primitive, partial
//! transfer) becomes one [`Diagnostic`]: a structured record with the
//! operation name, named argument fields, and the errno with its
//! description. Records go to a [`DiagnosticSink`].
//!
//! Routing:
//! - A thread-local scope installed with [`with_sink`] or [`capture`] takes
//!   every record emitted on that thread, regardless of the threshold.
//! - Otherwise records that pass [`config::log_threshold`] go to the
//!   process-wide sink set with [`set_sink`], or to stderr as JSONL when none
//!   is set.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::call_site::CallSite;
use crate::config;
use crate::metrics::global_metrics;

/// Fixed context tag carried by every record.
pub const TAG: &str = "guardlibc";

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Suspicious but tolerated: size sanity, partial transient transfers.
    Warn,
    /// A call was refused or the primitive failed.
    Error,
    /// The caller is not expected to recover (allocation failure).
    Panic,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Panic => "panic",
        })
    }
}

/// One structured diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub timestamp: String,
    pub level: Severity,
    pub tag: String,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// Create a record for `op` at `level`.
    #[must_use]
    pub fn new(level: Severity, op: &str, site: CallSite, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            level,
            tag: TAG.to_string(),
            op: op.to_string(),
            file: site.file().map(str::to_string),
            line: site.line(),
            args: BTreeMap::new(),
            errno: None,
            description: None,
            message: message.into(),
        }
    }

    /// Attach one named argument, rendered with `Debug`.
    #[must_use]
    pub fn with_arg(mut self, name: &str, value: &dyn fmt::Debug) -> Self {
        self.args.insert(name.to_string(), format!("{value:?}"));
        self
    }

    /// Attach a list of named arguments.
    #[must_use]
    pub fn with_args(mut self, args: &[(&str, &dyn fmt::Debug)]) -> Self {
        for (name, value) in args {
            self.args.insert((*name).to_string(), format!("{value:?}"));
        }
        self
    }

    /// Attach an errno value and its description.
    #[must_use]
    pub fn with_errno(mut self, code: i32) -> Self {
        self.errno = Some(code);
        self.description = Some(guardlibc_core::errno::describe(code));
        self
    }

    /// Attach a status code from a library with its own code space
    /// (regex, getaddrinfo) and the library's description of it.
    #[must_use]
    pub fn with_status(mut self, code: i32, description: impl Into<String>) -> Self {
        self.errno = Some(code);
        self.description = Some(description.into());
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}: {}", self.tag, self.level, self.op, self.message)?;
        if let (Some(file), Some(line)) = (&self.file, self.line) {
            write!(f, " at {file}:{line}")?;
        }
        for (name, value) in &self.args {
            write!(f, " {name}={value}")?;
        }
        if let Some(code) = self.errno {
            write!(f, " errno={code}")?;
            if let Some(description) = &self.description {
                write!(f, " ({description})")?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Consumer of diagnostic records.
pub trait DiagnosticSink: Send + Sync {
    /// Deliver one record. Must not panic.
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Writes one JSON line per record to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrJsonSink;

impl DiagnosticSink for StderrJsonSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        if let Ok(line) = diagnostic.to_jsonl() {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _diagnostic: &Diagnostic) {}
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything collected so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Number of records collected so far.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.records.lock().push(diagnostic.clone());
    }
}

static GLOBAL_SINK: RwLock<Option<Arc<dyn DiagnosticSink>>> = parking_lot::const_rwlock(None);

thread_local! {
    static SCOPED_SINKS: RefCell<Vec<Arc<dyn DiagnosticSink>>> = const { RefCell::new(Vec::new()) };
}

/// Install the process-wide sink, returning the previous one.
pub fn set_sink(sink: Arc<dyn DiagnosticSink>) -> Option<Arc<dyn DiagnosticSink>> {
    GLOBAL_SINK.write().replace(sink)
}

/// Remove the process-wide sink; records fall back to stderr.
pub fn reset_sink() -> Option<Arc<dyn DiagnosticSink>> {
    GLOBAL_SINK.write().take()
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPED_SINKS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Route every record emitted on this thread during `f` to `sink`.
///
/// Scopes nest; the innermost wins.
pub fn with_sink<R>(sink: Arc<dyn DiagnosticSink>, f: impl FnOnce() -> R) -> R {
    SCOPED_SINKS.with(|stack| stack.borrow_mut().push(sink));
    let _guard = ScopeGuard;
    f()
}

/// Run `f` and return the records it emitted on this thread.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Diagnostic>) {
    let sink = Arc::new(MemorySink::new());
    let result = with_sink(sink.clone(), f);
    (result, sink.take())
}

/// Deliver a record to the active sink.
pub fn emit(diagnostic: Diagnostic) {
    let scoped = SCOPED_SINKS.with(|stack| stack.borrow().last().cloned());
    if let Some(sink) = scoped {
        global_metrics().record_emitted();
        sink.emit(&diagnostic);
        return;
    }

    if !config::log_threshold().admits(diagnostic.level) {
        global_metrics().record_filtered();
        return;
    }
    global_metrics().record_emitted();
    let global = GLOBAL_SINK.read().clone();
    match global {
        Some(sink) => sink.emit(&diagnostic),
        None => StderrJsonSink.emit(&diagnostic),
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(level: Severity) -> Diagnostic {
        Diagnostic::new(level, "open", CallSite::caller(), "open failed")
            .with_arg("path", &"/nonexistent")
            .with_arg("flags", &0)
            .with_errno(guardlibc_core::errno::ENOENT)
    }

    #[test]
    fn jsonl_has_named_fields() {
        let json = sample(Severity::Error).to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["level"], "error");
        assert_eq!(parsed["tag"], "guardlibc");
        assert_eq!(parsed["op"], "open");
        assert_eq!(parsed["args"]["path"], "\"/nonexistent\"");
        assert_eq!(parsed["args"]["flags"], "0");
        assert_eq!(parsed["errno"], 2);
        assert!(parsed["description"].is_string());
        assert!(parsed["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn jsonl_roundtrips() {
        let d = sample(Severity::Warn);
        let back: Diagnostic = serde_json::from_str(&d.to_jsonl().unwrap()).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn display_mentions_op_and_errno() {
        let text = sample(Severity::Error).to_string();
        assert!(text.contains("open"));
        assert!(text.contains("errno=2"));
        assert!(text.starts_with("[guardlibc] error"));
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Panic);
    }

    #[test]
    fn capture_collects_scoped_records() {
        let ((), records) = capture(|| {
            emit(sample(Severity::Warn));
            emit(sample(Severity::Error));
        });
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Severity::Warn);
        assert_eq!(records[1].level, Severity::Error);
    }

    #[test]
    fn capture_scopes_nest() {
        let ((_, inner), outer) = capture(|| {
            emit(sample(Severity::Error));
            capture(|| emit(sample(Severity::Panic)))
        });
        assert_eq!(outer.len(), 1);
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].level, Severity::Panic);
    }

    #[test]
    fn capture_is_thread_local() {
        let ((), records) = capture(|| {
            std::thread::spawn(|| {
                with_sink(Arc::new(NullSink), || emit(sample(Severity::Error)));
            })
            .join()
            .unwrap();
        });
        assert!(records.is_empty());
    }

    #[test]
    fn utc_formatting() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        // 2000-02-29T12:34:56
        assert_eq!(format_utc(951_827_696, 7), "2000-02-29T12:34:56.007Z");
        // 2024-12-31T23:59:59
        assert_eq!(format_utc(1_735_689_599, 999), "2024-12-31T23:59:59.999Z");
    }
}
