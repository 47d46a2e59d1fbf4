//! Wide strings (`<wchar.h>`, `<wctype.h>`) and multibyte conversion.
//!
//! Wide strings are `&[wchar_t]` slices that must contain a terminating
//! zero; an unterminated slice is refused before delegation.

use std::ffi::{CStr, c_int};
use std::mem::size_of;
use std::ptr::{self, NonNull};

use libc::wchar_t;

use crate::ffi::wint_t;

use guardlibc_core::{errno, nullable_cmp, string::terminated_len};
use guardlibc_membrane::{GuardResult, Severity};

use crate::ffi;
use crate::guard::{Arg, Guard};

/// Encode `s` as a terminated wide string.
#[must_use]
pub fn widen(s: &str) -> Vec<wchar_t> {
    s.chars().map(|c| c as wchar_t).chain([0]).collect()
}

fn wide<'s>(
    g: &Guard,
    s: Option<&'s [wchar_t]>,
    reason: &'static str,
    args: &[Arg<'_>],
) -> GuardResult<(&'s [wchar_t], usize)> {
    let s = g.required(s, reason, args)?;
    let len = terminated_len(s);
    g.ensure(
        len.is_some(),
        Severity::Error,
        errno::EINVAL,
        "wide string is not terminated",
        args,
    )?;
    Ok((s, len.unwrap_or_default()))
}

#[track_caller]
pub fn wcslen(s: Option<&[wchar_t]>) -> GuardResult<usize> {
    let g = Guard::new("wcslen");
    let args: &[Arg<'_>] = &[("s", &s)];
    let (s, _) = wide(&g, s, "wide string is null", args)?;
    // SAFETY: `s` is terminated.
    Ok(g.call(|| unsafe { libc::wcslen(s.as_ptr()) }))
}

// Terminated operands go to the unbounded primitive; otherwise the
// comparison is bounded by the shorter slice.
fn compare(
    a: Option<&[wchar_t]>,
    b: Option<&[wchar_t]>,
    limit: Option<usize>,
    unbounded: unsafe extern "C" fn(*const wchar_t, *const wchar_t) -> c_int,
    bounded: unsafe extern "C" fn(*const wchar_t, *const wchar_t, usize) -> c_int,
) -> c_int {
    nullable_cmp(a, b, |a, b| {
        let both_terminated = terminated_len(a).is_some() && terminated_len(b).is_some();
        let bound = a.len().min(b.len());
        // SAFETY: reads stay within terminated strings or within `bound`.
        unsafe {
            match limit {
                None if both_terminated => unbounded(a.as_ptr(), b.as_ptr()),
                None => bounded(a.as_ptr(), b.as_ptr(), bound),
                Some(n) => bounded(a.as_ptr(), b.as_ptr(), n.min(bound)),
            }
        }
    })
}

#[must_use]
pub fn wcscmp(a: Option<&[wchar_t]>, b: Option<&[wchar_t]>) -> c_int {
    compare(a, b, None, ffi::wcscmp, ffi::wcsncmp)
}

#[must_use]
pub fn wcsncmp(a: Option<&[wchar_t]>, b: Option<&[wchar_t]>, n: usize) -> c_int {
    compare(a, b, Some(n), ffi::wcscmp, ffi::wcsncmp)
}

#[must_use]
pub fn wcscasecmp(a: Option<&[wchar_t]>, b: Option<&[wchar_t]>) -> c_int {
    compare(a, b, None, ffi::wcscasecmp, ffi::wcsncasecmp)
}

#[track_caller]
pub fn wcscpy(dst: &mut [wchar_t], src: Option<&[wchar_t]>) -> GuardResult<()> {
    let g = Guard::new("wcscpy");
    let cap = dst.len();
    let args: &[Arg<'_>] = &[("dst_len", &cap)];
    let (src, len) = wide(&g, src, "source is null", args)?;
    g.fits(len + 1, cap, "source does not fit destination", args)?;
    // SAFETY: `dst` holds the source and its terminator.
    g.call(|| unsafe { ffi::wcscpy(dst.as_mut_ptr(), src.as_ptr()) });
    Ok(())
}

#[track_caller]
pub fn wcsncpy(dst: &mut [wchar_t], src: Option<&[wchar_t]>, n: usize) -> GuardResult<()> {
    let g = Guard::new("wcsncpy");
    let cap = dst.len();
    let args: &[Arg<'_>] = &[("dst_len", &cap), ("n", &n)];
    let (src, _) = wide(&g, src, "source is null", args)?;
    g.fits(n, cap, "n exceeds destination length", args)?;
    // SAFETY: `dst` is writable for `n` units; `src` is terminated.
    g.call(|| unsafe { ffi::wcsncpy(dst.as_mut_ptr(), src.as_ptr(), n) });
    Ok(())
}

#[track_caller]
pub fn wcscat(dst: &mut [wchar_t], src: Option<&[wchar_t]>) -> GuardResult<()> {
    let g = Guard::new("wcscat");
    let cap = dst.len();
    let args: &[Arg<'_>] = &[("dst_len", &cap)];
    let (src, len) = wide(&g, src, "source is null", args)?;
    let (_, used) = wide(&g, Some(&*dst), "destination is null", args)?;
    g.fits(used + len + 1, cap, "result does not fit destination", args)?;
    // SAFETY: `dst` is terminated and has room for the result.
    g.call(|| unsafe { ffi::wcscat(dst.as_mut_ptr(), src.as_ptr()) });
    Ok(())
}

fn offset_in(base: &[wchar_t], p: *const wchar_t) -> Option<usize> {
    (!p.is_null()).then(|| (p as usize - base.as_ptr() as usize) / size_of::<wchar_t>())
}

#[track_caller]
pub fn wcschr(s: Option<&[wchar_t]>, c: wchar_t) -> GuardResult<Option<usize>> {
    let g = Guard::new("wcschr");
    let args: &[Arg<'_>] = &[("c", &c)];
    let (s, _) = wide(&g, s, "wide string is null", args)?;
    // SAFETY: `s` is terminated.
    let p = g.call(|| unsafe { ffi::wcschr(s.as_ptr(), c) });
    Ok(offset_in(s, p))
}

#[track_caller]
pub fn wcsrchr(s: Option<&[wchar_t]>, c: wchar_t) -> GuardResult<Option<usize>> {
    let g = Guard::new("wcsrchr");
    let args: &[Arg<'_>] = &[("c", &c)];
    let (s, _) = wide(&g, s, "wide string is null", args)?;
    // SAFETY: `s` is terminated.
    let p = g.call(|| unsafe { ffi::wcsrchr(s.as_ptr(), c) });
    Ok(offset_in(s, p))
}

#[track_caller]
pub fn wcsstr(haystack: Option<&[wchar_t]>, needle: Option<&[wchar_t]>) -> GuardResult<Option<usize>> {
    let g = Guard::new("wcsstr");
    let (haystack, _) = wide(&g, haystack, "haystack is null", &[])?;
    let (needle, _) = wide(&g, needle, "needle is null", &[])?;
    // SAFETY: both operands are terminated.
    let p = g.call(|| unsafe { ffi::wcsstr(haystack.as_ptr(), needle.as_ptr()) });
    Ok(offset_in(haystack, p))
}

/// Heap copy of `s`; release it with `malloc_abi::free`.
#[track_caller]
pub fn wcsdup(s: Option<&[wchar_t]>) -> GuardResult<NonNull<wchar_t>> {
    let g = Guard::new("wcsdup");
    let (s, len) = wide(&g, s, "wide string is null", &[])?;
    let args: &[Arg<'_>] = &[("len", &len)];
    // SAFETY: `s` is terminated.
    let p = g.call(|| unsafe { ffi::wcsdup(s.as_ptr()) });
    NonNull::new(p).ok_or_else(|| g.fatal(args))
}

/// Copy `n` wide characters; overlapping ranges are refused.
///
/// # Safety
///
/// `dst` must be writable and `src` readable for `n` wide characters.
#[track_caller]
pub unsafe fn wmemcpy(dst: *mut wchar_t, src: *const wchar_t, n: usize) -> GuardResult<NonNull<wchar_t>> {
    let g = Guard::new("wmemcpy");
    let args: &[Arg<'_>] = &[("dst", &dst), ("src", &src), ("n", &n)];
    g.non_null(dst, "destination is null", args)?;
    g.non_null(src, "source is null", args)?;
    let bytes = n.checked_mul(size_of::<wchar_t>()).unwrap_or(usize::MAX);
    g.size(bytes, args)?;
    g.disjoint(dst as usize, src as usize, bytes, args)?;
    // SAFETY: non-null, disjoint, sized by the caller.
    let p = g.call(|| unsafe { ffi::wmemcpy(dst, src, n) });
    g.ptr(p, args)
}

/// Copy `n` wide characters; ranges may overlap.
///
/// # Safety
///
/// `dst` must be writable and `src` readable for `n` wide characters.
#[track_caller]
pub unsafe fn wmemmove(dst: *mut wchar_t, src: *const wchar_t, n: usize) -> GuardResult<NonNull<wchar_t>> {
    let g = Guard::new("wmemmove");
    let args: &[Arg<'_>] = &[("dst", &dst), ("src", &src), ("n", &n)];
    g.non_null(dst, "destination is null", args)?;
    g.non_null(src, "source is null", args)?;
    g.size(n.checked_mul(size_of::<wchar_t>()).unwrap_or(usize::MAX), args)?;
    // SAFETY: non-null, sized by the caller.
    let p = g.call(|| unsafe { ffi::wmemmove(dst, src, n) });
    g.ptr(p, args)
}

/// # Safety
///
/// `dst` must be writable for `n` wide characters.
#[track_caller]
pub unsafe fn wmemset(dst: *mut wchar_t, c: wchar_t, n: usize) -> GuardResult<NonNull<wchar_t>> {
    let g = Guard::new("wmemset");
    let args: &[Arg<'_>] = &[("dst", &dst), ("c", &c), ("n", &n)];
    g.non_null(dst, "destination is null", args)?;
    g.size(n.checked_mul(size_of::<wchar_t>()).unwrap_or(usize::MAX), args)?;
    // SAFETY: non-null, sized by the caller.
    let p = g.call(|| unsafe { ffi::wmemset(dst, c, n) });
    g.ptr(p, args)
}

/// Convert a multibyte string. With `dst == None` only the required length
/// (excluding the terminator) is computed.
#[track_caller]
pub fn mbstowcs(dst: Option<&mut [wchar_t]>, src: Option<&CStr>) -> GuardResult<usize> {
    let g = Guard::new("mbstowcs");
    let cap = dst.as_ref().map(|d| d.len());
    let args: &[Arg<'_>] = &[("src", &src), ("dst_len", &cap)];
    let src = g.required(src, "source is null", args)?;
    let (out, n) = dst.map_or((ptr::null_mut(), 0), |d| (d.as_mut_ptr(), d.len()));
    // SAFETY: `out` is null or writable for `n` units; `src` is terminated.
    let rc = g.call(|| unsafe { ffi::mbstowcs(out, src.as_ptr(), n) });
    if rc == usize::MAX {
        return Err(g.failure_or(errno::EILSEQ, args));
    }
    Ok(rc)
}

/// Convert a wide string to multibyte. With `dst == None` only the required
/// byte length (excluding the terminator) is computed.
#[track_caller]
pub fn wcstombs(dst: Option<&mut [u8]>, src: Option<&[wchar_t]>) -> GuardResult<usize> {
    let g = Guard::new("wcstombs");
    let cap = dst.as_ref().map(|d| d.len());
    let args: &[Arg<'_>] = &[("dst_len", &cap)];
    let (src, _) = wide(&g, src, "source is null", args)?;
    let (out, n) = dst.map_or((ptr::null_mut(), 0), |d| (d.as_mut_ptr().cast(), d.len()));
    // SAFETY: `out` is null or writable for `n` bytes; `src` is terminated.
    let rc = g.call(|| unsafe { libc::wcstombs(out, src.as_ptr(), n) });
    if rc == usize::MAX {
        return Err(g.failure_or(errno::EILSEQ, args));
    }
    Ok(rc)
}

#[must_use]
pub fn towlower(c: wint_t) -> wint_t {
    // SAFETY: pure function of its argument.
    unsafe { ffi::towlower(c) }
}

#[must_use]
pub fn towupper(c: wint_t) -> wint_t {
    // SAFETY: pure function of its argument.
    unsafe { ffi::towupper(c) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::{GuardError, diag};

    #[test]
    fn lengths_and_comparison() {
        let a = widen("alpha");
        let b = widen("beta");
        assert_eq!(wcslen(Some(&a)).unwrap(), 5);
        assert!(wcscmp(Some(&a), Some(&b)) < 0);
        assert_eq!(wcscmp(None, None), 0);
        assert!(wcscmp(Some(&a), None) > 0);
        assert!(wcscmp(None, Some(&a)) < 0);
        assert_eq!(wcsncmp(Some(&widen("abcx")), Some(&widen("abcy")), 3), 0);
        assert_eq!(wcscasecmp(Some(&widen("ABC")), Some(&widen("abc"))), 0);
    }

    #[test]
    fn unterminated_is_rejected() {
        let raw: [wchar_t; 2] = [65, 66];
        let (r, _) = diag::capture(|| wcslen(Some(&raw)));
        assert_eq!(r.unwrap_err().errno(), Some(errno::EINVAL));
    }

    #[test]
    fn copy_and_search() {
        let mut buf = [0 as wchar_t; 16];
        wcscpy(&mut buf, Some(&widen("guard"))).unwrap();
        wcscat(&mut buf, Some(&widen("libc"))).unwrap();
        assert_eq!(wcscmp(Some(&buf), Some(&widen("guardlibc"))), 0);
        assert_eq!(wcschr(Some(&buf), 'l' as wchar_t).unwrap(), Some(5));
        assert_eq!(wcsrchr(Some(&buf), 'a' as wchar_t).unwrap(), Some(2));
        assert_eq!(wcsstr(Some(&buf), Some(&widen("lib"))).unwrap(), Some(5));
        let mut tiny = [0 as wchar_t; 3];
        let (r, _) = diag::capture(|| wcscpy(&mut tiny, Some(&widen("toolong"))));
        assert!(r.is_err());
    }

    #[test]
    fn wmemcpy_refuses_overlap() {
        let mut buf = widen("0123456789");
        let p = buf.as_mut_ptr();
        let (r, _) = diag::capture(|| unsafe { wmemcpy(p, p.add(2), 5) });
        assert!(matches!(r, Err(GuardError::Overlap { .. })));
        unsafe { wmemmove(p, p.add(2), 5) }.unwrap();
        assert_eq!(wcsncmp(Some(&buf), Some(&widen("23456")), 5), 0);
    }

    #[test]
    fn multibyte_roundtrip_ascii() {
        let mut wide_buf = [0 as wchar_t; 8];
        assert_eq!(mbstowcs(Some(&mut wide_buf), Some(c"abc")).unwrap(), 3);
        assert_eq!(mbstowcs(None, Some(c"abc")).unwrap(), 3);
        let mut narrow = [0u8; 8];
        assert_eq!(wcstombs(Some(&mut narrow), Some(&wide_buf)).unwrap(), 3);
        assert_eq!(&narrow[..4], b"abc\0");
    }

    #[test]
    fn case_mapping() {
        assert_eq!(towupper('a' as wint_t), 'A' as wint_t);
        assert_eq!(towlower('Q' as wint_t), 'q' as wint_t);
    }

    #[test]
    fn wcsdup_copies() {
        let p = wcsdup(Some(&widen("dup"))).unwrap();
        let copy = unsafe { std::slice::from_raw_parts(p.as_ptr(), 4) };
        assert_eq!(wcscmp(Some(copy), Some(&widen("dup"))), 0);
        unsafe { crate::malloc_abi::free(&mut p.as_ptr().cast()) };
    }
}
