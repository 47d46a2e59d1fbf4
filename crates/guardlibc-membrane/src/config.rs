//! Runtime logging configuration.
//!
//! Two environment variables are read on first use:
//! - `GUARDLIBC_LOG`: minimum severity delivered to the diagnostic sink.
//!   `warn` (default), `error`, `panic`, or `off`.
//! - `GUARDLIBC_LOG_NULL_FREE`: when truthy (`1`, `true`, `on`, `yes`),
//!   freeing a null pointer is reported at warn severity.
//!
//! Both values are cached for the life of the process. The setters below
//! override the cache, which is how tests and the harness pin behavior.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::diag::Severity;

/// Minimum severity a diagnostic needs to reach the sink.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogThreshold {
    /// Deliver warnings and above.
    #[default]
    Warn,
    /// Deliver errors and panics.
    Error,
    /// Deliver panics only.
    Panic,
    /// Deliver nothing.
    Off,
}

impl LogThreshold {
    /// Parse from string (case-insensitive). Unknown values map to the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" | "warning" | "all" => Self::Warn,
            "error" | "err" => Self::Error,
            "panic" | "fatal" => Self::Panic,
            "off" | "none" | "disabled" | "quiet" => Self::Off,
            _ => Self::Warn,
        }
    }

    /// Returns true if a diagnostic of `severity` passes this threshold.
    #[must_use]
    pub const fn admits(self, severity: Severity) -> bool {
        match self {
            Self::Warn => true,
            Self::Error => !matches!(severity, Severity::Warn),
            Self::Panic => matches!(severity, Severity::Panic),
            Self::Off => false,
        }
    }
}

// Atomic caches: 0=unresolved, 255=resolving, otherwise an encoded value.
// A reentrant call that lands while the environment is being read gets the
// default instead of blocking.
const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 255;

const THRESHOLD_WARN: u8 = 1;
const THRESHOLD_ERROR: u8 = 2;
const THRESHOLD_PANIC: u8 = 3;
const THRESHOLD_OFF: u8 = 4;

const FLAG_FALSE: u8 = 1;
const FLAG_TRUE: u8 = 2;

static CACHED_THRESHOLD: AtomicU8 = AtomicU8::new(UNRESOLVED);
static CACHED_NULL_FREE: AtomicU8 = AtomicU8::new(UNRESOLVED);

fn threshold_to_u8(threshold: LogThreshold) -> u8 {
    match threshold {
        LogThreshold::Warn => THRESHOLD_WARN,
        LogThreshold::Error => THRESHOLD_ERROR,
        LogThreshold::Panic => THRESHOLD_PANIC,
        LogThreshold::Off => THRESHOLD_OFF,
    }
}

fn u8_to_threshold(v: u8) -> LogThreshold {
    match v {
        THRESHOLD_ERROR => LogThreshold::Error,
        THRESHOLD_PANIC => LogThreshold::Panic,
        THRESHOLD_OFF => LogThreshold::Off,
        _ => LogThreshold::Warn,
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Resolve a cached value, reading the environment at most once.
fn resolve(cache: &AtomicU8, fallback: u8, read: impl FnOnce() -> u8) -> u8 {
    let cached = cache.load(Ordering::Relaxed);
    if cached != UNRESOLVED && cached != RESOLVING {
        return cached;
    }
    if cached == RESOLVING {
        return fallback;
    }
    if cache
        .compare_exchange(UNRESOLVED, RESOLVING, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        let v = cache.load(Ordering::Relaxed);
        return if v != UNRESOLVED && v != RESOLVING {
            v
        } else {
            fallback
        };
    }
    let value = read();
    // A setter may have raced us; keep its value.
    match cache.compare_exchange(RESOLVING, value, Ordering::AcqRel, Ordering::Relaxed) {
        Ok(_) => value,
        Err(current) => current,
    }
}

/// Configured log threshold (reads `GUARDLIBC_LOG` on first call).
#[must_use]
pub fn log_threshold() -> LogThreshold {
    u8_to_threshold(resolve(&CACHED_THRESHOLD, THRESHOLD_WARN, || {
        let threshold = std::env::var("GUARDLIBC_LOG")
            .map(|v| LogThreshold::from_str_loose(&v))
            .unwrap_or_default();
        threshold_to_u8(threshold)
    }))
}

/// Whether null frees are reported (reads `GUARDLIBC_LOG_NULL_FREE` on first call).
#[must_use]
pub fn log_null_free() -> bool {
    resolve(&CACHED_NULL_FREE, FLAG_FALSE, || {
        let on = std::env::var("GUARDLIBC_LOG_NULL_FREE")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        if on { FLAG_TRUE } else { FLAG_FALSE }
    }) == FLAG_TRUE
}

/// Override the cached log threshold.
pub fn set_log_threshold(threshold: LogThreshold) {
    CACHED_THRESHOLD.store(threshold_to_u8(threshold), Ordering::Release);
}

/// Override the cached null-free flag.
pub fn set_log_null_free(enabled: bool) {
    CACHED_NULL_FREE.store(
        if enabled { FLAG_TRUE } else { FLAG_FALSE },
        Ordering::Release,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_thresholds() {
        assert_eq!(LogThreshold::from_str_loose("warn"), LogThreshold::Warn);
        assert_eq!(LogThreshold::from_str_loose("WARNING"), LogThreshold::Warn);
        assert_eq!(LogThreshold::from_str_loose("error"), LogThreshold::Error);
        assert_eq!(LogThreshold::from_str_loose(" panic "), LogThreshold::Panic);
        assert_eq!(LogThreshold::from_str_loose("fatal"), LogThreshold::Panic);
        assert_eq!(LogThreshold::from_str_loose("off"), LogThreshold::Off);
        assert_eq!(LogThreshold::from_str_loose("bogus"), LogThreshold::Warn);
    }

    #[test]
    fn threshold_admission() {
        assert!(LogThreshold::Warn.admits(Severity::Warn));
        assert!(LogThreshold::Warn.admits(Severity::Panic));
        assert!(!LogThreshold::Error.admits(Severity::Warn));
        assert!(LogThreshold::Error.admits(Severity::Error));
        assert!(!LogThreshold::Panic.admits(Severity::Error));
        assert!(LogThreshold::Panic.admits(Severity::Panic));
        assert!(!LogThreshold::Off.admits(Severity::Panic));
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn encoding_roundtrips() {
        for t in [
            LogThreshold::Warn,
            LogThreshold::Error,
            LogThreshold::Panic,
            LogThreshold::Off,
        ] {
            assert_eq!(u8_to_threshold(threshold_to_u8(t)), t);
        }
    }

    #[test]
    fn resolve_reads_once_and_caches() {
        let cache = AtomicU8::new(UNRESOLVED);
        assert_eq!(resolve(&cache, 9, || 7), 7);
        assert_eq!(resolve(&cache, 9, || panic!("read twice")), 7);
    }

    #[test]
    fn resolve_returns_fallback_while_resolving() {
        let cache = AtomicU8::new(RESOLVING);
        assert_eq!(resolve(&cache, 9, || 7), 9);
    }
}
