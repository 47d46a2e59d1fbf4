//! # guardlibc-core
//!
//! Libc-free building blocks for the guardlibc wrapper facade.
//!
//! Everything here is pure logic over plain Rust values: errno constants and
//! their descriptions, argument validation predicates, the per-operation
//! benign-condition policy, null-safe ordering and range overlap checks.
//! The wrappers themselves live in `guardlibc-abi`. No `unsafe` code is
//! permitted at the crate level.

#![deny(unsafe_code)]

pub mod errno;
pub mod order;
pub mod policy;
pub mod string;
pub mod validate;

pub use order::{nullable_cmp, ordering_to_int};
pub use policy::{Suppress, is_transient};
pub use validate::{is_string_null, ranges_overlap, valid_fd, valid_size};
