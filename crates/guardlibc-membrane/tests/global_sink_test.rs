//! Global sink delivery and threshold filtering.
//!
//! These touch process-wide state, so they run as one test.

use std::sync::Arc;

use guardlibc_membrane::config::{LogThreshold, log_threshold, set_log_threshold};
use guardlibc_membrane::diag::{self, Diagnostic, MemorySink, Severity};
use guardlibc_membrane::{CallSite, global_metrics};

fn record(level: Severity) -> Diagnostic {
    Diagnostic::new(level, "close", CallSite::caller(), "call failed").with_errno(9)
}

#[test]
fn global_sink_respects_threshold_and_counts() {
    let sink = Arc::new(MemorySink::new());
    diag::set_sink(sink.clone());

    set_log_threshold(LogThreshold::Error);
    assert_eq!(log_threshold(), LogThreshold::Error);
    let before = global_metrics().snapshot();
    diag::emit(record(Severity::Warn));
    diag::emit(record(Severity::Error));
    diag::emit(record(Severity::Panic));
    let after = global_metrics().snapshot();

    let delivered = sink.take();
    assert_eq!(
        delivered.iter().map(|d| d.level).collect::<Vec<_>>(),
        vec![Severity::Error, Severity::Panic]
    );
    assert_eq!(after.diagnostics_filtered - before.diagnostics_filtered, 1);
    assert_eq!(after.diagnostics_emitted - before.diagnostics_emitted, 2);

    // A capture scope sees everything regardless of the threshold.
    set_log_threshold(LogThreshold::Off);
    let ((), captured) = diag::capture(|| diag::emit(record(Severity::Warn)));
    assert_eq!(captured.len(), 1);
    diag::emit(record(Severity::Panic));
    assert!(sink.is_empty());

    set_log_threshold(LogThreshold::Warn);
    assert!(diag::reset_sink().is_some());
    assert!(diag::reset_sink().is_none());
}
