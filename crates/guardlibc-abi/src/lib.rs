//! # guardlibc-abi
//!
//! Defensive wrappers over POSIX/C standard library entry points.
//!
//! Every wrapper interposes the same step between the caller and the host
//! libc primitive:
//!
//! ```text
//! caller -> validate -> reset errno -> libc primitive -> classify -> log -> restore errno
//! ```
//!
//! Arguments that can be checked locally (missing strings, negative
//! descriptors, sizes past `isize::MAX`, lengths larger than the buffer) are
//! refused without calling into libc. Failures the operation tolerates
//! (`EAGAIN` on a non-blocking read, `ENOENT` from `stat`, ...) are returned
//! but not logged. Everything else produces one structured
//! [`Diagnostic`](guardlibc_membrane::Diagnostic) through the installed sink,
//! after which errno is written back so the sink cannot mask the failure.
//!
//! Results are `GuardResult<T>`: the primitive's native success value, or a
//! [`GuardError`](guardlibc_membrane::GuardError) carrying the code libc set.

#![allow(clippy::missing_safety_doc)]

pub mod errno_abi;
mod ffi;
pub(crate) mod guard;

pub mod dirent_abi;
pub mod ipc_abi;
pub mod locale_abi;
pub mod malloc_abi;
pub mod poll_abi;
pub mod process_abi;
pub mod pthread_abi;
pub mod regex_abi;
pub mod signal_abi;
pub mod socket_abi;
pub mod stdio_abi;
pub mod string_abi;
pub mod time_abi;
pub mod unistd_abi;
pub mod wchar_abi;

pub use guardlibc_membrane::{Diagnostic, GuardError, GuardResult, Severity, diag};
