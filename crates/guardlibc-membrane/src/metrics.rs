//! Atomic counters for wrapper observability.
//!
//! All counters use relaxed ordering: they are advisory, not
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global wrapper counters.
pub struct WrapperMetrics {
    /// Calls that reached the underlying primitive.
    pub delegated: AtomicU64,
    /// Calls refused during argument validation.
    pub rejected: AtomicU64,
    /// Primitive failures that were logged.
    pub failures: AtomicU64,
    /// Primitive failures recognized as benign and not logged.
    pub benign: AtomicU64,
    /// Short transfers (fewer bytes than requested).
    pub partial_transfers: AtomicU64,
    /// Diagnostics delivered to a sink.
    pub diagnostics_emitted: AtomicU64,
    /// Diagnostics dropped by the log threshold.
    pub diagnostics_filtered: AtomicU64,
}

impl WrapperMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            delegated: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            benign: AtomicU64::new(0),
            partial_transfers: AtomicU64::new(0),
            diagnostics_emitted: AtomicU64::new(0),
            diagnostics_filtered: AtomicU64::new(0),
        }
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn record_delegated(&self) {
        Self::inc(&self.delegated);
    }

    pub fn record_rejected(&self) {
        Self::inc(&self.rejected);
    }

    pub fn record_failure(&self) {
        Self::inc(&self.failures);
    }

    pub fn record_benign(&self) {
        Self::inc(&self.benign);
    }

    pub fn record_partial(&self) {
        Self::inc(&self.partial_transfers);
    }

    pub fn record_emitted(&self) {
        Self::inc(&self.diagnostics_emitted);
    }

    pub fn record_filtered(&self) {
        Self::inc(&self.diagnostics_filtered);
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            delegated: Self::get(&self.delegated),
            rejected: Self::get(&self.rejected),
            failures: Self::get(&self.failures),
            benign: Self::get(&self.benign),
            partial_transfers: Self::get(&self.partial_transfers),
            diagnostics_emitted: Self::get(&self.diagnostics_emitted),
            diagnostics_filtered: Self::get(&self.diagnostics_filtered),
        }
    }
}

impl Default for WrapperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all wrapper counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub delegated: u64,
    pub rejected: u64,
    pub failures: u64,
    pub benign: u64,
    pub partial_transfers: u64,
    pub diagnostics_emitted: u64,
    pub diagnostics_filtered: u64,
}

static GLOBAL_METRICS: WrapperMetrics = WrapperMetrics::new();

/// Access the global metrics instance.
#[must_use]
pub fn global_metrics() -> &'static WrapperMetrics {
    &GLOBAL_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = WrapperMetrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn record_increments_matching_counter() {
        let m = WrapperMetrics::new();
        m.record_delegated();
        m.record_delegated();
        m.record_rejected();
        m.record_benign();
        m.record_partial();
        let s = m.snapshot();
        assert_eq!(s.delegated, 2);
        assert_eq!(s.rejected, 1);
        assert_eq!(s.benign, 1);
        assert_eq!(s.partial_transfers, 1);
        assert_eq!(s.failures, 0);
    }
}
