//! Conformance cases for the wrapper contract and the runner that executes
//! them.
//!
//! Each case drives real wrappers, returns the errno it observed, and
//! declares which diagnostics the run may produce. The runner captures the
//! records on the current thread, checks them against that expectation,
//! forwards them to an optional sink and logs one [`LogEntry`] per case.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use guardlibc_abi::{
    errno_abi, ipc_abi, malloc_abi, process_abi, regex_abi, stdio_abi, string_abi, unistd_abi,
};
use guardlibc_membrane::diag::{self, Diagnostic, DiagnosticSink};
use guardlibc_membrane::{ErrorClass, GuardError, Severity};

use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Diagnostics a case is allowed to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// No record at all.
    Silent,
    /// Exactly one record, at this severity.
    One(Severity),
    /// Any number of records, none at error severity or above.
    NoErrors,
}

impl Expect {
    fn check(self, records: &[Diagnostic]) -> Result<(), String> {
        match self {
            Self::Silent if records.is_empty() => Ok(()),
            Self::One(level) if records.len() == 1 && records[0].level == level => Ok(()),
            Self::NoErrors if records.iter().all(|r| r.level < Severity::Error) => Ok(()),
            _ => Err(format!(
                "expected {self:?}, got {:?}",
                records.iter().map(|r| (r.op.as_str(), r.level)).collect::<Vec<_>>()
            )),
        }
    }
}

type CaseFn = fn() -> Result<Option<i32>, String>;

/// One conformance case.
#[derive(Debug, Clone, Copy)]
pub struct ConformanceCase {
    pub name: &'static str,
    pub family: &'static str,
    pub property: &'static str,
    pub expect: Expect,
    pub run: CaseFn,
}

/// Outcome of one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub family: String,
    pub property: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    pub diagnostics: usize,
    pub duration_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn ok<T>(r: Result<T, GuardError>) -> Result<T, String> {
    r.map_err(|e| e.to_string())
}

fn ensure(cond: bool, what: &str) -> Result<(), String> {
    if cond { Ok(()) } else { Err(what.to_string()) }
}

fn expect_err<T>(r: Result<T, GuardError>, class: ErrorClass, code: i32) -> Result<Option<i32>, String> {
    match r {
        Err(err) if err.kind() == class && err.code() == code => Ok(err.errno()),
        Err(err) => Err(format!("expected {class:?} with code {code}, got {err}")),
        Ok(_) => Err(format!("expected {class:?} with code {code}, call succeeded")),
    }
}

fn temp_path(tag: &str) -> Result<std::ffi::CString, String> {
    let path = std::env::temp_dir().join(format!("guardlibc-conf-{tag}-{}", std::process::id()));
    std::ffi::CString::new(path.into_os_string().into_encoded_bytes()).map_err(|e| e.to_string())
}

fn nonblocking_pipe(end: usize) -> Result<[i32; 2], String> {
    let fds = ok(unistd_abi::pipe())?;
    let flags = ok(unistd_abi::fcntl(fds[end], libc::F_GETFL, 0))?;
    ok(unistd_abi::fcntl(fds[end], libc::F_SETFL, flags | libc::O_NONBLOCK))?;
    Ok(fds)
}

fn close_all(fds: [i32; 2]) {
    for fd in fds {
        let _ = unistd_abi::close(fd);
    }
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

fn malloc_zero() -> Result<Option<i32>, String> {
    // The block is left allocated: releasing it takes the unsafe `free`.
    ok(malloc_abi::malloc(0))?;
    Ok(None)
}

fn malloc_huge() -> Result<Option<i32>, String> {
    expect_err(malloc_abi::malloc(usize::MAX), ErrorClass::InvalidArgument, libc::EINVAL)
}

fn fopen_null_path() -> Result<Option<i32>, String> {
    let errno = expect_err(stdio_abi::fopen(None, Some(c"r")), ErrorClass::InvalidArgument, libc::EFAULT)?;
    ensure(errno_abi::get() == libc::EFAULT, "errno not set to EFAULT")?;
    Ok(errno)
}

fn strcmp_null_ordering() -> Result<Option<i32>, String> {
    ensure(string_abi::strcmp(None, None) == 0, "null == null")?;
    ensure(string_abi::strcmp(Some(c"x"), None) > 0, "non-null > null")?;
    ensure(string_abi::strcmp(None, Some(c"x")) < 0, "null < non-null")?;
    ensure(string_abi::strcmp(Some(c"abc"), Some(c"abd")) < 0, "native order")?;
    Ok(None)
}

fn nonblocking_read() -> Result<Option<i32>, String> {
    let fds = nonblocking_pipe(0)?;
    let mut buf = [0u8; 8];
    let len = buf.len();
    let r = unistd_abi::read(fds[0], &mut buf, len);
    close_all(fds);
    expect_err(r, ErrorClass::Benign, libc::EAGAIN)
}

fn waitpid_no_children() -> Result<Option<i32>, String> {
    expect_err(process_abi::waitpid(-1, libc::WNOHANG), ErrorClass::Benign, libc::ECHILD)
}

fn file_round_trip() -> Result<Option<i32>, String> {
    let path = temp_path("roundtrip")?;
    let data = b"\0head\0\0tail\0";
    let fd = ok(unistd_abi::open(Some(&path), libc::O_CREAT | libc::O_TRUNC | libc::O_WRONLY, 0o600))?;
    let written = ok(unistd_abi::write(fd, data, data.len()))?;
    ok(unistd_abi::close(fd))?;
    let fd = ok(unistd_abi::open(Some(&path), libc::O_RDONLY, 0))?;
    let mut back = [0u8; 32];
    let len = back.len();
    let read = ok(unistd_abi::read(fd, &mut back, len))?;
    ok(unistd_abi::close(fd))?;
    ok(unistd_abi::unlink(Some(&path)))?;
    ensure(written == data.len() && read == data.len(), "short round trip")?;
    ensure(&back[..read] == data, "bytes differ")?;
    Ok(None)
}

/// Clears errno from inside the logging path.
struct ClobberingSink;

impl DiagnosticSink for ClobberingSink {
    fn emit(&self, _diagnostic: &Diagnostic) {
        errno_abi::set(0);
    }
}

fn errno_survives_sink() -> Result<Option<i32>, String> {
    let path = temp_path("absent")?;
    let r = diag::with_sink(Arc::new(ClobberingSink), || unistd_abi::rmdir(Some(&path)));
    let errno = expect_err(r, ErrorClass::Delegated, libc::ENOENT)?;
    ensure(errno_abi::get() == libc::ENOENT, "errno clobbered by sink")?;
    Ok(errno)
}

fn short_write() -> Result<Option<i32>, String> {
    let fds = nonblocking_pipe(1)?;
    let chunk = vec![0xa5u8; 1 << 20];
    let r = unistd_abi::write(fds[1], &chunk, chunk.len());
    close_all(fds);
    let n = ok(r)?;
    ensure(n > 0 && n < chunk.len(), "expected a partial count")?;
    Ok(None)
}

fn stream_eof() -> Result<Option<i32>, String> {
    let mut stream = ok(stdio_abi::tmpfile())?;
    ok(stdio_abi::fputs(Some(c"only line"), &mut stream))?;
    stdio_abi::rewind(&mut stream);
    let first = ok(stdio_abi::getline(&mut stream))?;
    let second = ok(stdio_abi::getline(&mut stream))?;
    ensure(first.as_deref() == Some(&b"only line"[..]), "wrong line")?;
    ensure(second.is_none(), "expected end of stream")?;
    Ok(None)
}

fn stat_missing() -> Result<Option<i32>, String> {
    let path = temp_path("nowhere")?;
    expect_err(unistd_abi::stat(Some(&path)), ErrorClass::Benign, libc::ENOENT)
}

fn regex_no_match() -> Result<Option<i32>, String> {
    let re = ok(regex_abi::regcomp(Some(c"^[0-9]+$"), libc::REG_EXTENDED))?;
    match regex_abi::regexec(&re, Some(c"letters"), 0, 0) {
        Err(err) if err.is_benign() => Ok(None),
        Err(err) => Err(format!("expected benign no-match, got {err}")),
        Ok(_) => Err("pattern unexpectedly matched".to_string()),
    }
}

fn sem_trywait_empty() -> Result<Option<i32>, String> {
    let sem = ok(ipc_abi::sem_init(0))?;
    expect_err(ipc_abi::sem_trywait(&sem), ErrorClass::Benign, libc::EAGAIN)
}

fn negative_fd() -> Result<Option<i32>, String> {
    expect_err(unistd_abi::close(-1), ErrorClass::InvalidArgument, libc::EBADF)
}

/// The built-in case list.
#[must_use]
pub fn default_cases() -> Vec<ConformanceCase> {
    macro_rules! case {
        ($run:ident, $family:literal, $expect:expr, $property:literal) => {
            ConformanceCase {
                name: stringify!($run),
                family: $family,
                property: $property,
                expect: $expect,
                run: $run,
            }
        };
    }
    vec![
        case!(malloc_zero, "malloc", Expect::Silent, "zero-size allocation is delegated"),
        case!(malloc_huge, "malloc", Expect::One(Severity::Warn), "impossible size refused before delegation"),
        case!(fopen_null_path, "stdio", Expect::One(Severity::Error), "missing path refused with EFAULT"),
        case!(strcmp_null_ordering, "string", Expect::Silent, "null-safe comparison order"),
        case!(nonblocking_read, "unistd", Expect::Silent, "EAGAIN on non-blocking read is benign"),
        case!(waitpid_no_children, "process", Expect::Silent, "ECHILD from waitpid is benign"),
        case!(file_round_trip, "unistd", Expect::Silent, "descriptor I/O preserves NUL bytes"),
        case!(errno_survives_sink, "unistd", Expect::Silent, "errno restored after the sink runs"),
        case!(short_write, "unistd", Expect::NoErrors, "short transfer returns the partial count"),
        case!(stream_eof, "stdio", Expect::Silent, "end of stream is not a failure"),
        case!(stat_missing, "unistd", Expect::Silent, "ENOENT from stat is benign"),
        case!(regex_no_match, "regex", Expect::Silent, "REG_NOMATCH is benign"),
        case!(sem_trywait_empty, "ipc", Expect::Silent, "EAGAIN from sem_trywait is benign"),
        case!(negative_fd, "unistd", Expect::One(Severity::Error), "negative descriptor refused with EBADF"),
    ]
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs cases on the calling thread.
pub struct ConformanceRunner {
    cases: Vec<ConformanceCase>,
}

impl ConformanceRunner {
    #[must_use]
    pub fn new(cases: Vec<ConformanceCase>) -> Self {
        Self { cases }
    }

    #[must_use]
    pub fn cases(&self) -> &[ConformanceCase] {
        &self.cases
    }

    /// Run every case whose name contains `filter` (all when `None`).
    /// Captured diagnostics are forwarded to `forward`.
    pub fn run(
        &self,
        filter: Option<&str>,
        emitter: &mut LogEmitter,
        forward: Option<&dyn DiagnosticSink>,
    ) -> std::io::Result<Vec<CaseResult>> {
        emitter.emit(LogLevel::Info, "run_start")?;
        let mut results = Vec::new();
        for case in self
            .cases
            .iter()
            .filter(|c| filter.is_none_or(|f| c.name.contains(f)))
        {
            let result = run_case(case, forward);
            let level = if result.passed {
                LogLevel::Info
            } else {
                LogLevel::Error
            };
            let mut entry = LogEntry::new(String::new(), level, "case_end")
                .with_case(case.name, case.family)
                .with_outcome(if result.passed {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                })
                .with_diagnostics(result.diagnostics)
                .with_duration_us(result.duration_us);
            if let Some(errno) = result.errno {
                entry = entry.with_errno(errno);
            }
            if let Some(detail) = &result.detail {
                entry = entry.with_details(serde_json::json!({ "detail": detail }));
            }
            emitter.emit_entry(entry)?;
            results.push(result);
        }
        emitter.emit(LogLevel::Info, "run_end")?;
        emitter.flush()?;
        Ok(results)
    }
}

fn run_case(case: &ConformanceCase, forward: Option<&dyn DiagnosticSink>) -> CaseResult {
    let start = Instant::now();
    let (outcome, records) = diag::capture(case.run);
    let duration_us = start.elapsed().as_micros() as u64;
    if let Some(sink) = forward {
        for record in &records {
            sink.emit(record);
        }
    }
    let checked = outcome.and_then(|errno| case.expect.check(&records).map(|()| errno));
    let (passed, errno, detail) = match checked {
        Ok(errno) => (true, errno, None),
        Err(detail) => (false, None, Some(detail)),
    };
    CaseResult {
        name: case.name.to_string(),
        family: case.family.to_string(),
        property: case.property.to_string(),
        passed,
        errno,
        diagnostics: records.len(),
        duration_us,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::{CallSite, MemorySink};

    #[test]
    fn expectation_matching() {
        let warn = Diagnostic::new(Severity::Warn, "read", CallSite::caller(), "partial transfer");
        let error = Diagnostic::new(Severity::Error, "close", CallSite::caller(), "call failed");
        assert!(Expect::Silent.check(&[]).is_ok());
        assert!(Expect::Silent.check(std::slice::from_ref(&warn)).is_err());
        assert!(Expect::One(Severity::Warn).check(std::slice::from_ref(&warn)).is_ok());
        assert!(Expect::One(Severity::Warn).check(std::slice::from_ref(&error)).is_err());
        assert!(Expect::NoErrors.check(&[warn.clone(), warn]).is_ok());
        assert!(Expect::NoErrors.check(&[error]).is_err());
    }

    #[test]
    fn default_cases_pass() {
        let runner = ConformanceRunner::new(default_cases());
        let mut emitter = LogEmitter::sink("unit");
        let results = runner.run(None, &mut emitter, None).unwrap();
        assert_eq!(results.len(), runner.cases().len());
        let failed: Vec<_> = results.iter().filter(|r| !r.passed).collect();
        assert!(failed.is_empty(), "failed cases: {failed:?}");
    }

    #[test]
    fn failing_case_is_reported_with_detail() {
        fn wrong() -> Result<Option<i32>, String> {
            expect_err(unistd_abi::close(-1), ErrorClass::Benign, libc::EBADF)
        }
        let runner = ConformanceRunner::new(vec![ConformanceCase {
            name: "wrong",
            family: "unistd",
            property: "deliberately wrong expectation",
            expect: Expect::Silent,
            run: wrong,
        }]);
        let forward = MemorySink::new();
        let results = runner
            .run(None, &mut LogEmitter::sink("unit"), Some(&forward))
            .unwrap();
        assert!(!results[0].passed);
        assert!(results[0].detail.is_some());
        assert_eq!(forward.len(), 1);
    }

    #[test]
    fn filter_selects_by_name() {
        let runner = ConformanceRunner::new(default_cases());
        let results = runner
            .run(Some("malloc"), &mut LogEmitter::sink("unit"), None)
            .unwrap();
        assert_eq!(results.len(), 2);
    }
}
