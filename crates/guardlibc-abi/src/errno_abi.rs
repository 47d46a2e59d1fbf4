//! The calling thread's errno slot.
//!
//! Wrappers clear errno before delegating, read it after a failure, and write
//! the captured value back once logging is done.

use std::ffi::c_int;

#[cfg(any(target_os = "linux", target_os = "android"))]
#[inline]
fn location() -> *mut c_int {
    // SAFETY: always returns a valid pointer to this thread's errno.
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
#[inline]
fn location() -> *mut c_int {
    // SAFETY: always returns a valid pointer to this thread's errno.
    unsafe { libc::__error() }
}

/// Current errno value.
#[inline]
pub fn get() -> c_int {
    // SAFETY: `location` points at thread-local storage owned by libc.
    unsafe { *location() }
}

/// Store `value` in errno.
#[inline]
pub fn set(value: c_int) {
    // SAFETY: `location` points at thread-local storage owned by libc.
    unsafe { *location() = value };
}

/// Clear errno to zero.
#[inline]
pub fn reset() {
    set(0);
}
