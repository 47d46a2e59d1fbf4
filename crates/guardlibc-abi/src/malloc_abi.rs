//! Heap allocation and raw memory operations.
//!
//! Allocation failures are logged at panic severity and still returned to
//! the caller. `free` nulls the caller's pointer, so freeing twice through
//! the same variable is a no-op.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr::{self, NonNull};

use guardlibc_core::{errno, nullable_cmp, validate};
use guardlibc_membrane::{GuardResult, Severity, config};

use crate::ffi;
use crate::guard::{Arg, Guard};

#[track_caller]
pub fn malloc(size: usize) -> GuardResult<NonNull<c_void>> {
    let g = Guard::new("malloc");
    let args: &[Arg<'_>] = &[("size", &size)];
    g.size(size, args)?;
    // SAFETY: plain allocation request.
    let p = g.call(|| unsafe { libc::malloc(size) });
    NonNull::new(p).ok_or_else(|| g.fatal(args))
}

/// Zeroed allocation of `nmemb * size` bytes; a product that overflows is
/// refused before delegation.
#[track_caller]
pub fn calloc(nmemb: usize, size: usize) -> GuardResult<NonNull<c_void>> {
    let g = Guard::new("calloc");
    let args: &[Arg<'_>] = &[("nmemb", &nmemb), ("size", &size)];
    let total = validate::array_size(nmemb, size);
    g.ensure(
        total.is_some(),
        Severity::Warn,
        errno::ENOMEM,
        "nmemb * size overflows",
        args,
    )?;
    g.size(total.unwrap_or_default(), args)?;
    // SAFETY: plain allocation request.
    let p = g.call(|| unsafe { libc::calloc(nmemb, size) });
    NonNull::new(p).ok_or_else(|| g.fatal(args))
}

/// Resize a block. Returns `None` when `size == 0` released the block.
///
/// # Safety
///
/// `ptr` must be null or a live block from this allocator.
#[track_caller]
pub unsafe fn realloc(ptr: *mut c_void, size: usize) -> GuardResult<Option<NonNull<c_void>>> {
    let g = Guard::new("realloc");
    let args: &[Arg<'_>] = &[("ptr", &ptr), ("size", &size)];
    g.size(size, args)?;
    // SAFETY: caller guarantees `ptr` provenance.
    let p = g.call(|| unsafe { libc::realloc(ptr, size) });
    match NonNull::new(p) {
        Some(p) => Ok(Some(p)),
        None if size == 0 && !ptr.is_null() => Ok(None),
        None => Err(g.fatal(args)),
    }
}

/// # Safety
///
/// `ptr` must be null or a live block from this allocator.
#[track_caller]
pub unsafe fn reallocarray(
    ptr: *mut c_void,
    nmemb: usize,
    size: usize,
) -> GuardResult<NonNull<c_void>> {
    let g = Guard::new("reallocarray");
    let args: &[Arg<'_>] = &[("ptr", &ptr), ("nmemb", &nmemb), ("size", &size)];
    let total = validate::array_size(nmemb, size);
    g.ensure(
        total.is_some(),
        Severity::Warn,
        errno::ENOMEM,
        "nmemb * size overflows",
        args,
    )?;
    g.size(total.unwrap_or_default(), args)?;
    // SAFETY: caller guarantees `ptr` provenance.
    let p = g.call(|| unsafe { ffi::reallocarray(ptr, nmemb, size) });
    NonNull::new(p).ok_or_else(|| g.fatal(args))
}

/// Release `*ptr` and null it.
///
/// A null pointer is a no-op, reported at warn only when
/// `GUARDLIBC_LOG_NULL_FREE` is enabled.
///
/// # Safety
///
/// `*ptr` must be null or a live block from this allocator.
#[track_caller]
pub unsafe fn free(ptr: &mut *mut c_void) {
    let g = Guard::new("free");
    if ptr.is_null() {
        if config::log_null_free() {
            g.note(Severity::Warn, "free of null pointer", &[]);
        }
        return;
    }
    let p = std::mem::replace(ptr, ptr::null_mut());
    // SAFETY: caller guarantees `p` is a live allocation.
    g.call(|| unsafe { libc::free(p) });
}

/// Aligned allocation; `alignment` must be a power of two and a multiple of
/// the pointer size.
#[track_caller]
pub fn posix_memalign(alignment: usize, size: usize) -> GuardResult<NonNull<c_void>> {
    let g = Guard::new("posix_memalign");
    let args: &[Arg<'_>] = &[("alignment", &alignment), ("size", &size)];
    g.ensure(
        validate::valid_alignment(alignment),
        Severity::Error,
        errno::EINVAL,
        "alignment is not a power-of-two multiple of the pointer size",
        args,
    )?;
    g.size(size, args)?;
    let mut out: *mut c_void = ptr::null_mut();
    // SAFETY: `out` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::posix_memalign(&mut out, alignment, size) });
    if rc != 0 {
        return Err(g.alloc_failure(rc, args));
    }
    NonNull::new(out).ok_or_else(|| g.fatal(args))
}

/// Heap copy of `s`; release it with [`free`].
#[track_caller]
pub fn strdup(s: Option<&CStr>) -> GuardResult<NonNull<c_char>> {
    let g = Guard::new("strdup");
    let args: &[Arg<'_>] = &[("s", &s)];
    let s = g.required(s, "source string is null", args)?;
    // SAFETY: `s` is NUL-terminated.
    let p = g.call(|| unsafe { libc::strdup(s.as_ptr()) });
    NonNull::new(p).ok_or_else(|| g.fatal(args))
}

/// Heap copy of at most `n` bytes of `s`, always terminated.
#[track_caller]
pub fn strndup(s: Option<&CStr>, n: usize) -> GuardResult<NonNull<c_char>> {
    let g = Guard::new("strndup");
    let args: &[Arg<'_>] = &[("s", &s), ("n", &n)];
    let s = g.required(s, "source string is null", args)?;
    g.size(n, args)?;
    // SAFETY: `s` is NUL-terminated, so the scan stops within it.
    let p = g.call(|| unsafe { libc::strndup(s.as_ptr(), n) });
    NonNull::new(p).ok_or_else(|| g.fatal(args))
}

/// Copy `n` bytes; overlapping ranges are refused.
///
/// # Safety
///
/// `dst` must be writable and `src` readable for `n` bytes.
#[track_caller]
pub unsafe fn memcpy(dst: *mut c_void, src: *const c_void, n: usize) -> GuardResult<NonNull<c_void>> {
    let g = Guard::new("memcpy");
    let args: &[Arg<'_>] = &[("dst", &dst), ("src", &src), ("n", &n)];
    g.non_null(dst, "destination is null", args)?;
    g.non_null(src, "source is null", args)?;
    g.size(n, args)?;
    g.disjoint(dst as usize, src as usize, n, args)?;
    // SAFETY: non-null, disjoint, sized by the caller.
    let p = g.call(|| unsafe { libc::memcpy(dst, src, n) });
    g.ptr(p, args)
}

/// Copy `n` bytes; ranges may overlap.
///
/// # Safety
///
/// `dst` must be writable and `src` readable for `n` bytes.
#[track_caller]
pub unsafe fn memmove(dst: *mut c_void, src: *const c_void, n: usize) -> GuardResult<NonNull<c_void>> {
    let g = Guard::new("memmove");
    let args: &[Arg<'_>] = &[("dst", &dst), ("src", &src), ("n", &n)];
    g.non_null(dst, "destination is null", args)?;
    g.non_null(src, "source is null", args)?;
    g.size(n, args)?;
    // SAFETY: non-null, sized by the caller.
    let p = g.call(|| unsafe { libc::memmove(dst, src, n) });
    g.ptr(p, args)
}

/// # Safety
///
/// `dst` must be writable for `n` bytes.
#[track_caller]
pub unsafe fn memset(dst: *mut c_void, c: c_int, n: usize) -> GuardResult<NonNull<c_void>> {
    let g = Guard::new("memset");
    let args: &[Arg<'_>] = &[("dst", &dst), ("c", &c), ("n", &n)];
    g.non_null(dst, "destination is null", args)?;
    g.size(n, args)?;
    // SAFETY: non-null, sized by the caller.
    let p = g.call(|| unsafe { libc::memset(dst, c, n) });
    g.ptr(p, args)
}

/// Null-safe comparison of the first `n` bytes; `n` is clamped to the
/// shorter slice.
#[must_use]
pub fn memcmp(a: Option<&[u8]>, b: Option<&[u8]>, n: usize) -> c_int {
    nullable_cmp(a, b, |a, b| {
        let n = n.min(a.len()).min(b.len());
        // SAFETY: both slices cover `n` bytes.
        unsafe { libc::memcmp(a.as_ptr().cast(), b.as_ptr().cast(), n) }
    })
}

/// Index of the first byte equal to `c` (as `unsigned char`).
#[must_use]
pub fn memchr(s: &[u8], c: c_int) -> Option<usize> {
    // SAFETY: the scan is bounded by the slice length.
    let p = unsafe { libc::memchr(s.as_ptr().cast(), c, s.len()) };
    (!p.is_null()).then(|| p as usize - s.as_ptr() as usize)
}
