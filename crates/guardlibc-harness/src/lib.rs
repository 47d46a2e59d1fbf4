//! Conformance harness for the guardlibc wrappers.
//!
//! This crate provides:
//! - Conformance cases: drive real wrappers and check errno, results and the
//!   diagnostics each call produced
//! - Structured logs: JSONL harness events next to forwarded wrapper
//!   diagnostics, with a line validator
//! - Report generation: markdown and JSON summaries plus a SHA-256 artifact
//!   index

#![forbid(unsafe_code)]

pub mod conformance;
pub mod error;
pub mod report;
pub mod sink;
pub mod structured_log;
pub mod suite;

pub use conformance::{CaseResult, ConformanceCase, ConformanceRunner, Expect};
pub use error::HarnessError;
pub use report::ConformanceReport;
pub use sink::JsonlFileSink;
pub use suite::{SuiteConfig, run_suite, verify_artifacts};
