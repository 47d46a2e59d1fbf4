//! Ambient layer for the guardlibc wrappers.
//!
//! The wrappers in `guardlibc-abi` share everything that is not the libc
//! call itself through this crate:
//! - **Configuration** (`config`): log threshold and null-free reporting,
//!   read once from the environment.
//! - **Diagnostics** (`diag`): structured records, sinks, and the
//!   thread-local capture scope.
//! - **Call site** (`call_site`): caller `file:line`, zero-sized unless the
//!   `call-site` feature is enabled.
//! - **Errors** (`error`): [`GuardError`] / [`GuardResult`].
//! - **Metrics** (`metrics`): atomic counters.

#![deny(unsafe_code)]

pub mod call_site;
pub mod config;
pub mod diag;
pub mod error;
pub mod metrics;

pub use call_site::CallSite;
pub use config::LogThreshold;
pub use diag::{Diagnostic, DiagnosticSink, MemorySink, Severity};
pub use error::{ErrorClass, GuardError, GuardResult};
pub use metrics::{MetricsSnapshot, WrapperMetrics, global_metrics};
