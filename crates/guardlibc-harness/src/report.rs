//! Report generation for conformance results.

use serde::Serialize;

use guardlibc_membrane::MetricsSnapshot;

use crate::conformance::CaseResult;

/// Pass/fail totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    #[must_use]
    pub fn of(results: &[CaseResult]) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
        }
    }
}

/// A conformance report over one harness run.
#[derive(Debug, Clone, Serialize)]
pub struct ConformanceReport {
    /// Report title.
    pub title: String,
    pub run_id: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    pub summary: Summary,
    pub results: Vec<CaseResult>,
    /// Process-wide wrapper counters at the end of the run.
    pub metrics: MetricsSnapshot,
}

impl ConformanceReport {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        run_id: impl Into<String>,
        results: Vec<CaseResult>,
        metrics: MetricsSnapshot,
    ) -> Self {
        Self {
            title: title.into(),
            run_id: run_id.into(),
            timestamp: guardlibc_membrane::diag::now_utc(),
            summary: Summary::of(&results),
            results,
            metrics,
        }
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Run: {}\n", self.run_id));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Total: {}\n", self.summary.total));
        out.push_str(&format!("- Passed: {}\n", self.summary.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.summary.failed));

        out.push_str("| Case | Family | Property | Diagnostics | Status |\n");
        out.push_str("|------|--------|----------|-------------|--------|\n");
        for r in &self.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                r.name, r.family, r.property, r.diagnostics, status
            ));
        }

        let failures: Vec<_> = self.results.iter().filter(|r| !r.passed).collect();
        if !failures.is_empty() {
            out.push_str("\n## Failures\n\n");
            for r in failures {
                out.push_str(&format!(
                    "- `{}`: {}\n",
                    r.name,
                    r.detail.as_deref().unwrap_or("no detail")
                ));
            }
        }

        let m = &self.metrics;
        out.push_str("\n## Wrapper counters\n\n");
        out.push_str(&format!("- Delegated: {}\n", m.delegated));
        out.push_str(&format!("- Rejected: {}\n", m.rejected));
        out.push_str(&format!("- Failures: {}\n", m.failures));
        out.push_str(&format!("- Benign: {}\n", m.benign));
        out.push_str(&format!("- Partial transfers: {}\n", m.partial_transfers));
        out.push_str(&format!(
            "- Diagnostics: {} emitted, {} filtered\n",
            m.diagnostics_emitted, m.diagnostics_filtered
        ));
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
