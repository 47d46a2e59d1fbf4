//! Locale selection and character-set conversion (`<locale.h>`, `<iconv.h>`).

use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;

use guardlibc_core::errno;
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

/// Set (or, with `None`, query) the locale for `category`; returns the name
/// of the locale now in effect.
#[track_caller]
pub fn setlocale(category: c_int, locale: Option<&CStr>) -> GuardResult<CString> {
    let g = Guard::new("setlocale");
    let args: &[Arg<'_>] = &[("category", &category), ("locale", &locale)];
    let p = locale.map_or(ptr::null(), CStr::as_ptr);
    // SAFETY: `p` is null or terminated; the result is copied out before any
    // other locale call can overwrite it.
    let name = g.call(|| unsafe {
        let name = libc::setlocale(category, p);
        (!name.is_null()).then(|| CStr::from_ptr(name).to_owned())
    });
    // Unknown locale names fail without touching errno.
    name.ok_or_else(|| g.failure_or(errno::ENOENT, args))
}

/// Conversion descriptor; closed on drop if not passed to [`iconv_close`].
#[derive(Debug)]
pub struct Iconv(libc::iconv_t);

// SAFETY: a descriptor is used by one thread at a time through `&mut`.
unsafe impl Send for Iconv {}

impl Drop for Iconv {
    fn drop(&mut self) {
        // SAFETY: opened by iconv_open and closed once.
        unsafe { libc::iconv_close(self.0) };
    }
}

#[track_caller]
pub fn iconv_open(to: Option<&CStr>, from: Option<&CStr>) -> GuardResult<Iconv> {
    let g = Guard::new("iconv_open");
    let args: &[Arg<'_>] = &[("to", &to), ("from", &from)];
    let to = g.string(to, "target encoding is null or empty", args)?;
    let from = g.string(from, "source encoding is null or empty", args)?;
    // SAFETY: both names are terminated.
    let cd = g.call(|| unsafe { libc::iconv_open(to.as_ptr(), from.as_ptr()) });
    if cd as isize == -1 {
        return Err(g.failure(args));
    }
    Ok(Iconv(cd))
}

/// Convert from `input` into the spare capacity of `output`.
///
/// Both cursors advance by what was converted even when the call fails:
/// `E2BIG` means `output` ran out of room, `EILSEQ` an invalid sequence and
/// `EINVAL` an incomplete one at the end of `input`. With `input` `None` the
/// shift state is flushed into `output`. Returns the number of irreversible
/// conversions.
#[track_caller]
pub fn iconv(cd: &mut Iconv, input: Option<&mut &[u8]>, output: &mut Vec<u8>) -> GuardResult<usize> {
    let g = Guard::new("iconv");
    let in_len = input.as_ref().map_or(0, |i| i.len());
    let spare = output.capacity() - output.len();
    let args: &[Arg<'_>] = &[("input", &in_len), ("spare", &spare)];
    g.ensure(
        spare > 0 || in_len == 0,
        Severity::Warn,
        errno::EINVAL,
        "output has no spare capacity",
        args,
    )?;
    let flush = input.is_none();
    let mut in_ptr = input
        .as_ref()
        .map_or(ptr::null_mut(), |i| i.as_ptr().cast_mut().cast::<c_char>());
    let mut in_left = in_len;
    let mut out_ptr = output.spare_capacity_mut().as_mut_ptr().cast::<c_char>();
    let mut out_left = spare;
    // SAFETY: the input cursor covers `in_left` readable bytes (iconv never
    // writes through it); the output cursor covers `out_left` spare bytes.
    let rc = g.call(|| unsafe {
        let inbuf = if flush { ptr::null_mut() } else { &mut in_ptr as *mut _ };
        libc::iconv(cd.0, inbuf, &mut in_left, &mut out_ptr, &mut out_left)
    });
    // SAFETY: iconv initialized exactly `spare - out_left` spare bytes.
    unsafe { output.set_len(output.len() + spare - out_left) };
    if let Some(input) = input {
        let rest: &[u8] = *input;
        *input = &rest[in_len - in_left..];
    }
    if rc == usize::MAX {
        return Err(g.failure(args));
    }
    Ok(rc)
}

#[track_caller]
pub fn iconv_close(cd: Iconv) -> GuardResult<()> {
    let g = Guard::new("iconv_close");
    let raw = cd.0;
    std::mem::forget(cd);
    // SAFETY: released exactly once here.
    let rc = g.call(|| unsafe { libc::iconv_close(raw) });
    g.unit(rc, &[("cd", &raw)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::diag;

    #[test]
    fn c_locale_is_always_available() {
        assert_eq!(setlocale(libc::LC_ALL, Some(c"C")).unwrap(), c"C");
        assert_eq!(setlocale(libc::LC_ALL, None).unwrap(), c"C");
    }

    #[test]
    fn unknown_locale_fails_with_a_record() {
        let (r, records) = diag::capture(|| setlocale(libc::LC_ALL, Some(c"xx_NOPE.UTF-9")));
        assert!(r.is_err());
        assert_eq!(records.len(), 1);
        assert_eq!(setlocale(libc::LC_ALL, None).unwrap(), c"C");
    }

    #[test]
    fn latin1_to_utf8() {
        let mut cd = iconv_open(Some(c"UTF-8"), Some(c"ISO-8859-1")).unwrap();
        let mut input: &[u8] = b"caf\xe9";
        let mut out = Vec::with_capacity(16);
        assert_eq!(iconv(&mut cd, Some(&mut input), &mut out).unwrap(), 0);
        iconv(&mut cd, None, &mut out).unwrap();
        assert!(input.is_empty());
        assert_eq!(out, "café".as_bytes());
        iconv_close(cd).unwrap();
    }

    #[test]
    fn small_output_reports_e2big_with_progress() {
        let mut cd = iconv_open(Some(c"UTF-8"), Some(c"ISO-8859-1")).unwrap();
        let mut input: &[u8] = b"\xe9\xe9\xe9";
        let mut out = Vec::with_capacity(3);
        let (r, _) = diag::capture(|| iconv(&mut cd, Some(&mut input), &mut out));
        assert_eq!(r.unwrap_err().errno(), Some(errno::E2BIG));
        assert_eq!(out.len(), 2);
        assert_eq!(input.len(), 2);
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let (r, records) = diag::capture(|| iconv_open(Some(c"UTF-8"), Some(c"NOT-A-CHARSET")));
        assert_eq!(r.unwrap_err().errno(), Some(errno::EINVAL));
        assert_eq!(records.len(), 1);
    }
}
