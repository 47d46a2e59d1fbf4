//! Harness error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{errors} invalid line(s) in {lines}-line log")]
    InvalidLog { lines: usize, errors: usize },
    #[error("{failed} of {total} conformance case(s) failed")]
    CasesFailed { failed: usize, total: usize },
    #[error("artifact digest mismatch: {0:?}")]
    ArtifactMismatch(Vec<String>),
}
