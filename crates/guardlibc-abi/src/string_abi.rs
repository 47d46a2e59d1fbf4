//! Byte string operations (`<string.h>`, `<strings.h>`, numeric parsing).
//!
//! Strings come in as `Option<&CStr>`, `None` standing for a null pointer.
//! Comparisons order null before any string and never fail. Copies write
//! into a caller slice and refuse anything that would not fit with its
//! terminator; source and destination cannot alias because one is borrowed
//! mutably.

use std::ffi::{CStr, c_char, c_double, c_int, c_long, c_longlong, c_ulong, c_ulonglong};
use std::marker::PhantomData;
use std::ptr;

use guardlibc_core::string::{can_append, terminated_len};
use guardlibc_core::{errno, nullable_cmp};
use guardlibc_membrane::{GuardResult, Severity};

use crate::errno_abi;
use crate::ffi;
use crate::guard::{Arg, Guard};

// ---------------------------------------------------------------------------
// Length and comparison
// ---------------------------------------------------------------------------

#[track_caller]
pub fn strlen(s: Option<&CStr>) -> GuardResult<usize> {
    let g = Guard::new("strlen");
    let args: &[Arg<'_>] = &[("s", &s)];
    let s = g.required(s, "string is null", args)?;
    // SAFETY: `s` is NUL-terminated.
    Ok(g.call(|| unsafe { libc::strlen(s.as_ptr()) }))
}

/// Length of the string in `s`, scanning at most `maxlen` bytes.
#[track_caller]
pub fn strnlen(s: Option<&[u8]>, maxlen: usize) -> GuardResult<usize> {
    let g = Guard::new("strnlen");
    let args: &[Arg<'_>] = &[("maxlen", &maxlen)];
    let s = g.required(s, "string is null", args)?;
    g.fits(maxlen, s.len(), "maxlen exceeds buffer length", args)?;
    // SAFETY: the scan is bounded by `maxlen <= s.len()`.
    Ok(g.call(|| unsafe { libc::strnlen(s.as_ptr().cast(), maxlen) }))
}

fn compare(
    a: Option<&CStr>,
    b: Option<&CStr>,
    f: impl FnOnce(*const c_char, *const c_char) -> c_int,
) -> c_int {
    nullable_cmp(a, b, |a, b| f(a.as_ptr(), b.as_ptr()))
}

#[must_use]
pub fn strcmp(a: Option<&CStr>, b: Option<&CStr>) -> c_int {
    // SAFETY: both operands are NUL-terminated.
    compare(a, b, |a, b| unsafe { libc::strcmp(a, b) })
}

#[must_use]
pub fn strncmp(a: Option<&CStr>, b: Option<&CStr>, n: usize) -> c_int {
    // SAFETY: both operands are NUL-terminated.
    compare(a, b, |a, b| unsafe { libc::strncmp(a, b, n) })
}

#[must_use]
pub fn strcasecmp(a: Option<&CStr>, b: Option<&CStr>) -> c_int {
    // SAFETY: both operands are NUL-terminated.
    compare(a, b, |a, b| unsafe { libc::strcasecmp(a, b) })
}

#[must_use]
pub fn strncasecmp(a: Option<&CStr>, b: Option<&CStr>, n: usize) -> c_int {
    // SAFETY: both operands are NUL-terminated.
    compare(a, b, |a, b| unsafe { libc::strncasecmp(a, b, n) })
}

/// Locale-aware comparison.
#[must_use]
pub fn strcoll(a: Option<&CStr>, b: Option<&CStr>) -> c_int {
    // SAFETY: both operands are NUL-terminated.
    compare(a, b, |a, b| unsafe { libc::strcoll(a, b) })
}

// ---------------------------------------------------------------------------
// Copy and concatenation
// ---------------------------------------------------------------------------

/// Copy `src` with its terminator into `dst`.
#[track_caller]
pub fn strcpy<'d>(dst: &'d mut [u8], src: Option<&CStr>) -> GuardResult<&'d CStr> {
    let g = Guard::new("strcpy");
    let cap = dst.len();
    let args: &[Arg<'_>] = &[("dst_len", &cap), ("src", &src)];
    let src = g.required(src, "source string is null", args)?;
    g.fits(src.count_bytes() + 1, cap, "source does not fit destination", args)?;
    // SAFETY: `dst` holds the source and its terminator.
    g.call(|| unsafe { libc::strcpy(dst.as_mut_ptr().cast(), src.as_ptr()) });
    CStr::from_bytes_until_nul(dst).map_err(|_| g.failure(args))
}

/// Copy at most `n` bytes, padding with NUL up to `n`. The result is not
/// terminated when `src` is `n` bytes or longer, as in C.
#[track_caller]
pub fn strncpy(dst: &mut [u8], src: Option<&CStr>, n: usize) -> GuardResult<()> {
    let g = Guard::new("strncpy");
    let cap = dst.len();
    let args: &[Arg<'_>] = &[("dst_len", &cap), ("src", &src), ("n", &n)];
    let src = g.required(src, "source string is null", args)?;
    g.fits(n, cap, "n exceeds destination length", args)?;
    // SAFETY: `dst` is writable for `n` bytes; `src` is NUL-terminated.
    g.call(|| unsafe { libc::strncpy(dst.as_mut_ptr().cast(), src.as_ptr(), n) });
    Ok(())
}

fn terminated(g: &Guard, dst: &[u8], args: &[Arg<'_>]) -> GuardResult<()> {
    g.ensure(
        terminated_len(dst).is_some(),
        Severity::Error,
        errno::EINVAL,
        "destination is not terminated",
        args,
    )
}

/// Append `src` to the string already in `dst`.
#[track_caller]
pub fn strcat<'d>(dst: &'d mut [u8], src: Option<&CStr>) -> GuardResult<&'d CStr> {
    let g = Guard::new("strcat");
    let cap = dst.len();
    let args: &[Arg<'_>] = &[("dst_len", &cap), ("src", &src)];
    let src = g.required(src, "source string is null", args)?;
    terminated(&g, dst, args)?;
    let room = can_append(dst, src.count_bytes());
    g.ensure(room, Severity::Warn, errno::EINVAL, "result does not fit destination", args)?;
    // SAFETY: `dst` is terminated and has room for the result.
    g.call(|| unsafe { libc::strcat(dst.as_mut_ptr().cast(), src.as_ptr()) });
    CStr::from_bytes_until_nul(dst).map_err(|_| g.failure(args))
}

/// Append at most `n` bytes of `src`, always terminating.
#[track_caller]
pub fn strncat<'d>(dst: &'d mut [u8], src: Option<&CStr>, n: usize) -> GuardResult<&'d CStr> {
    let g = Guard::new("strncat");
    let cap = dst.len();
    let args: &[Arg<'_>] = &[("dst_len", &cap), ("src", &src), ("n", &n)];
    let src = g.required(src, "source string is null", args)?;
    terminated(&g, dst, args)?;
    let room = can_append(dst, src.count_bytes().min(n));
    g.ensure(room, Severity::Warn, errno::EINVAL, "result does not fit destination", args)?;
    // SAFETY: `dst` is terminated and has room for the result.
    g.call(|| unsafe { libc::strncat(dst.as_mut_ptr().cast(), src.as_ptr(), n) });
    CStr::from_bytes_until_nul(dst).map_err(|_| g.failure(args))
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

fn offset_in(base: &CStr, p: *const c_char) -> Option<usize> {
    (!p.is_null()).then(|| p as usize - base.as_ptr() as usize)
}

/// Index of the first `c`; searching for `0` finds the terminator.
#[track_caller]
pub fn strchr(s: Option<&CStr>, c: c_int) -> GuardResult<Option<usize>> {
    let g = Guard::new("strchr");
    let args: &[Arg<'_>] = &[("s", &s), ("c", &c)];
    let s = g.required(s, "string is null", args)?;
    // SAFETY: `s` is NUL-terminated.
    let p = g.call(|| unsafe { libc::strchr(s.as_ptr(), c) });
    Ok(offset_in(s, p))
}

#[track_caller]
pub fn strrchr(s: Option<&CStr>, c: c_int) -> GuardResult<Option<usize>> {
    let g = Guard::new("strrchr");
    let args: &[Arg<'_>] = &[("s", &s), ("c", &c)];
    let s = g.required(s, "string is null", args)?;
    // SAFETY: `s` is NUL-terminated.
    let p = g.call(|| unsafe { libc::strrchr(s.as_ptr(), c) });
    Ok(offset_in(s, p))
}

fn search(
    g: Guard,
    haystack: Option<&CStr>,
    needle: Option<&CStr>,
    f: impl FnOnce(*const c_char, *const c_char) -> *mut c_char,
) -> GuardResult<Option<usize>> {
    let args: &[Arg<'_>] = &[("haystack", &haystack), ("needle", &needle)];
    let haystack = g.required(haystack, "haystack is null", args)?;
    let needle = g.required(needle, "needle is null", args)?;
    let p = g.call(|| f(haystack.as_ptr(), needle.as_ptr()));
    Ok(offset_in(haystack, p))
}

#[track_caller]
pub fn strstr(haystack: Option<&CStr>, needle: Option<&CStr>) -> GuardResult<Option<usize>> {
    // SAFETY: both operands are NUL-terminated.
    search(Guard::new("strstr"), haystack, needle, |h, n| unsafe {
        libc::strstr(h, n)
    })
}

/// Case-insensitive [`strstr`].
#[track_caller]
pub fn strcasestr(haystack: Option<&CStr>, needle: Option<&CStr>) -> GuardResult<Option<usize>> {
    // SAFETY: both operands are NUL-terminated.
    search(Guard::new("strcasestr"), haystack, needle, |h, n| unsafe {
        ffi::strcasestr(h, n)
    })
}

/// Index of the first byte of `s` that is in `accept`.
#[track_caller]
pub fn strpbrk(s: Option<&CStr>, accept: Option<&CStr>) -> GuardResult<Option<usize>> {
    // SAFETY: both operands are NUL-terminated.
    search(Guard::new("strpbrk"), s, accept, |s, a| unsafe {
        libc::strpbrk(s, a)
    })
}

fn span(
    g: Guard,
    s: Option<&CStr>,
    set: Option<&CStr>,
    f: impl FnOnce(*const c_char, *const c_char) -> usize,
) -> GuardResult<usize> {
    let args: &[Arg<'_>] = &[("s", &s), ("set", &set)];
    let s = g.required(s, "string is null", args)?;
    let set = g.required(set, "set is null", args)?;
    Ok(g.call(|| f(s.as_ptr(), set.as_ptr())))
}

/// Length of the prefix of `s` made of bytes in `accept`.
#[track_caller]
pub fn strspn(s: Option<&CStr>, accept: Option<&CStr>) -> GuardResult<usize> {
    // SAFETY: both operands are NUL-terminated.
    span(Guard::new("strspn"), s, accept, |s, a| unsafe { libc::strspn(s, a) })
}

/// Length of the prefix of `s` made of bytes not in `reject`.
#[track_caller]
pub fn strcspn(s: Option<&CStr>, reject: Option<&CStr>) -> GuardResult<usize> {
    // SAFETY: both operands are NUL-terminated.
    span(Guard::new("strcspn"), s, reject, |s, r| unsafe { libc::strcspn(s, r) })
}

// ---------------------------------------------------------------------------
// Tokenizing
// ---------------------------------------------------------------------------

/// Reentrant tokenizer state over a caller buffer.
///
/// Tokens are written in place (delimiters become NUL), so each returned
/// token borrows the buffer for `'b`.
#[derive(Debug)]
pub struct Tokenizer<'b> {
    next: *mut c_char,
    save: *mut c_char,
    _buf: PhantomData<&'b mut [u8]>,
}

impl<'b> Tokenizer<'b> {
    /// `None` when `buf` holds no terminator.
    #[must_use]
    pub fn new(buf: &'b mut [u8]) -> Option<Self> {
        terminated_len(buf)?;
        Some(Self {
            next: buf.as_mut_ptr().cast(),
            save: ptr::null_mut(),
            _buf: PhantomData,
        })
    }
}

/// Next token separated by any byte of `delim`, or `Ok(None)` when the
/// buffer is exhausted.
#[track_caller]
pub fn strtok_r<'b>(
    tokenizer: &mut Tokenizer<'b>,
    delim: Option<&CStr>,
) -> GuardResult<Option<&'b CStr>> {
    let g = Guard::new("strtok_r");
    let args: &[Arg<'_>] = &[("delim", &delim)];
    let delim = g.required(delim, "delimiter set is null", args)?;
    let start = std::mem::replace(&mut tokenizer.next, ptr::null_mut());
    // SAFETY: `start` is the terminated buffer on the first call and null
    // afterwards, with `save` maintained by strtok_r itself.
    let tok = g.call(|| unsafe { ffi::strtok_r(start, delim.as_ptr(), &mut tokenizer.save) });
    if tok.is_null() {
        return Ok(None);
    }
    // SAFETY: tokens are NUL-terminated regions of the borrowed buffer that
    // later calls never write to.
    Ok(Some(unsafe { CStr::from_ptr(tok) }))
}

// ---------------------------------------------------------------------------
// Numeric parsing
// ---------------------------------------------------------------------------

fn parse<T>(
    g: Guard,
    s: Option<&CStr>,
    base: Option<c_int>,
    f: impl FnOnce(*const c_char, *mut *mut c_char) -> T,
) -> GuardResult<(T, usize)> {
    let args: &[Arg<'_>] = &[("s", &s), ("base", &base)];
    let s = g.required(s, "string is null", args)?;
    if let Some(base) = base {
        g.ensure(
            base == 0 || (2..=36).contains(&base),
            Severity::Error,
            errno::EINVAL,
            "base must be 0 or within 2..=36",
            args,
        )?;
    }
    let mut end: *mut c_char = ptr::null_mut();
    let value = g.call(|| f(s.as_ptr(), &mut end));
    if errno_abi::get() != 0 {
        return Err(g.failure(args));
    }
    let consumed = end as usize - s.as_ptr() as usize;
    if consumed == 0 {
        return Err(g.failure_or(errno::EINVAL, args));
    }
    Ok((value, consumed))
}

/// Parse a `long`; returns the value and the number of bytes consumed.
/// Out-of-range input fails with `ERANGE`, input without digits with `EINVAL`.
#[track_caller]
pub fn strtol(s: Option<&CStr>, base: c_int) -> GuardResult<(c_long, usize)> {
    // SAFETY: `s` is NUL-terminated and `e` is an out-pointer.
    parse(Guard::new("strtol"), s, Some(base), |p, e| unsafe { libc::strtol(p, e, base) })
}

#[track_caller]
pub fn strtoul(s: Option<&CStr>, base: c_int) -> GuardResult<(c_ulong, usize)> {
    // SAFETY: `s` is NUL-terminated and `e` is an out-pointer.
    parse(Guard::new("strtoul"), s, Some(base), |p, e| unsafe { libc::strtoul(p, e, base) })
}

#[track_caller]
pub fn strtoll(s: Option<&CStr>, base: c_int) -> GuardResult<(c_longlong, usize)> {
    // SAFETY: `s` is NUL-terminated and `e` is an out-pointer.
    parse(Guard::new("strtoll"), s, Some(base), |p, e| unsafe { ffi::strtoll(p, e, base) })
}

#[track_caller]
pub fn strtoull(s: Option<&CStr>, base: c_int) -> GuardResult<(c_ulonglong, usize)> {
    // SAFETY: `s` is NUL-terminated and `e` is an out-pointer.
    parse(Guard::new("strtoull"), s, Some(base), |p, e| unsafe { ffi::strtoull(p, e, base) })
}

#[track_caller]
pub fn strtod(s: Option<&CStr>) -> GuardResult<(c_double, usize)> {
    // SAFETY: `s` is NUL-terminated and `e` is an out-pointer.
    parse(Guard::new("strtod"), s, None, |p, e| unsafe { libc::strtod(p, e) })
}

/// `atoi` has no failure channel; only a null string is refused.
#[track_caller]
pub fn atoi(s: Option<&CStr>) -> GuardResult<c_int> {
    let g = Guard::new("atoi");
    let args: &[Arg<'_>] = &[("s", &s)];
    let s = g.required(s, "string is null", args)?;
    // SAFETY: `s` is NUL-terminated.
    Ok(g.call(|| unsafe { libc::atoi(s.as_ptr()) }))
}

#[track_caller]
pub fn atol(s: Option<&CStr>) -> GuardResult<c_long> {
    let g = Guard::new("atol");
    let args: &[Arg<'_>] = &[("s", &s)];
    let s = g.required(s, "string is null", args)?;
    // SAFETY: `s` is NUL-terminated.
    Ok(g.call(|| unsafe { ffi::atol(s.as_ptr()) }))
}

/// Message text for an errno value.
#[track_caller]
pub fn strerror(code: c_int) -> GuardResult<String> {
    let g = Guard::new("strerror");
    let args: &[Arg<'_>] = &[("code", &code)];
    let mut buf = [0u8; 256];
    // SAFETY: `buf` is writable for its full length.
    let rc = g.call(|| unsafe { libc::strerror_r(code, buf.as_mut_ptr().cast(), buf.len()) });
    g.status(rc, args)?;
    let text = CStr::from_bytes_until_nul(&buf).map_err(|_| g.returned(errno::ERANGE, args))?;
    Ok(text.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::{ErrorClass, diag};

    #[test]
    fn strcmp_null_ordering() {
        let (_, records) = diag::capture(|| {
            assert_eq!(strcmp(None, None), 0);
            assert!(strcmp(Some(c"a"), None) > 0);
            assert!(strcmp(None, Some(c"a")) < 0);
            assert!(strcmp(Some(c"abc"), Some(c"abd")) < 0);
            assert_eq!(strcasecmp(Some(c"ABC"), Some(c"abc")), 0);
            assert_eq!(strncmp(Some(c"abcx"), Some(c"abcy"), 3), 0);
        });
        assert!(records.is_empty());
    }

    #[test]
    fn strcpy_rejects_overflow() {
        let mut small = [0u8; 4];
        let (r, records) = diag::capture(|| strcpy(&mut small, Some(c"toolong")).map(drop));
        assert_eq!(r.unwrap_err().kind(), ErrorClass::InvalidArgument);
        assert_eq!(records.len(), 1);
        assert_eq!(small, [0; 4]);
    }

    #[test]
    fn strcpy_then_strcat() {
        let mut buf = [0u8; 16];
        strcpy(&mut buf, Some(c"guard")).unwrap();
        assert_eq!(strcat(&mut buf, Some(c"libc")).unwrap(), c"guardlibc");
        assert_eq!(strncat(&mut buf, Some(c"xyz"), 1).unwrap(), c"guardlibcx");
        let (r, _) = diag::capture(|| strcat(&mut buf, Some(c"overflowing")).map(drop));
        assert!(r.is_err());
    }

    #[test]
    fn strncpy_pads() {
        let mut buf = [0xffu8; 6];
        strncpy(&mut buf, Some(c"ab"), 6).unwrap();
        assert_eq!(buf, *b"ab\0\0\0\0");
    }

    #[test]
    fn searches_return_offsets() {
        assert_eq!(strchr(Some(c"hello"), c_int::from(b'l')).unwrap(), Some(2));
        assert_eq!(strrchr(Some(c"hello"), c_int::from(b'l')).unwrap(), Some(3));
        assert_eq!(strchr(Some(c"hello"), 0).unwrap(), Some(5));
        assert_eq!(strstr(Some(c"haystack"), Some(c"st")).unwrap(), Some(3));
        assert_eq!(strcasestr(Some(c"HayStack"), Some(c"st")).unwrap(), Some(3));
        assert_eq!(strpbrk(Some(c"hello"), Some(c"lo")).unwrap(), Some(2));
        assert_eq!(strspn(Some(c"aabc"), Some(c"a")).unwrap(), 2);
        assert_eq!(strcspn(Some(c"abc,d"), Some(c",")).unwrap(), 3);
        let (r, _) = diag::capture(|| strstr(None, Some(c"x")));
        assert!(r.is_err());
    }

    #[test]
    fn tokenizer_splits_in_place() {
        let mut buf = *b"a,b,,c\0";
        let mut tok = Tokenizer::new(&mut buf).unwrap();
        let mut out = Vec::new();
        while let Some(t) = strtok_r(&mut tok, Some(c",")).unwrap() {
            out.push(t.to_owned());
        }
        assert_eq!(out, [c"a".to_owned(), c"b".to_owned(), c"c".to_owned()]);
    }

    #[test]
    fn numeric_parsing() {
        assert_eq!(strtol(Some(c"  42xyz"), 10).unwrap(), (42, 4));
        assert_eq!(strtoul(Some(c"ff"), 16).unwrap(), (255, 2));
        assert_eq!(strtoll(Some(c"-9"), 0).unwrap(), (-9, 2));
        assert_eq!(strtoull(Some(c"0x10"), 0).unwrap(), (16, 4));
        assert_eq!(strtod(Some(c"2.5")).unwrap(), (2.5, 3));
        assert_eq!(atoi(Some(c"17")).unwrap(), 17);
        assert_eq!(atol(Some(c"-3")).unwrap(), -3);

        let (r, records) = diag::capture(|| strtol(Some(c"99999999999999999999999"), 10));
        assert_eq!(r.unwrap_err().errno(), Some(errno::ERANGE));
        assert_eq!(records.len(), 1);
        let (r, _) = diag::capture(|| strtol(Some(c"12"), 1));
        assert_eq!(r.unwrap_err().kind(), ErrorClass::InvalidArgument);
        let (r, _) = diag::capture(|| strtol(Some(c"zz"), 10));
        assert_eq!(r.unwrap_err().errno(), Some(errno::EINVAL));
    }

    #[test]
    fn strerror_text() {
        assert!(!strerror(errno::ENOENT).unwrap().is_empty());
    }
}
