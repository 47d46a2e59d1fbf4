//! POSIX regular expressions (`<regex.h>`).
//!
//! `regcomp`/`regexec` report failure with a status from their own code
//! space; the description comes from `regerror`. `REG_NOMATCH` is an answer,
//! not a fault, and is never logged.

use std::ffi::{CStr, c_int};
use std::mem::MaybeUninit;

use guardlibc_membrane::GuardResult;

use crate::guard::{Arg, Guard};

/// Compiled pattern; freed on drop if not passed to [`regfree`].
pub struct Regex(Box<libc::regex_t>);

// SAFETY: a compiled regex_t is immutable after regcomp and regexec only
// reads it.
unsafe impl Send for Regex {}
unsafe impl Sync for Regex {}

impl Regex {
    /// Number of parenthesized subexpressions.
    #[must_use]
    pub fn groups(&self) -> usize {
        crate::ffi::regex_nsub(&self.0)
    }
}

impl std::fmt::Debug for Regex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Regex").field("groups", &self.groups()).finish()
    }
}

impl Drop for Regex {
    fn drop(&mut self) {
        // SAFETY: compiled by regcomp and freed once.
        unsafe { libc::regfree(&mut *self.0) };
    }
}

/// Byte range of a (sub)match within the subject.
pub type Span = Option<(usize, usize)>;

/// Text for a `regcomp`/`regexec` status, optionally specific to `regex`.
#[must_use]
pub fn regerror(code: c_int, regex: Option<&Regex>) -> String {
    let preg = regex.map_or(std::ptr::null(), |r| &*r.0 as *const libc::regex_t);
    let mut buf = [0u8; 256];
    // SAFETY: `buf` is writable for its length; `preg` is null or compiled.
    unsafe { libc::regerror(code, preg, buf.as_mut_ptr().cast(), buf.len()) };
    CStr::from_bytes_until_nul(&buf)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[track_caller]
pub fn regcomp(pattern: Option<&CStr>, cflags: c_int) -> GuardResult<Regex> {
    let g = Guard::new("regcomp");
    let args: &[Arg<'_>] = &[("pattern", &pattern), ("cflags", &cflags)];
    let pattern = g.required(pattern, "pattern is null", args)?;
    let mut preg = Box::new(MaybeUninit::<libc::regex_t>::zeroed());
    // SAFETY: `preg` is writable; `pattern` is terminated.
    let rc = g.call(|| unsafe { libc::regcomp(preg.as_mut_ptr(), pattern.as_ptr(), cflags) });
    if rc != 0 {
        return Err(g.status_failure(rc, regerror(rc, None), false, args));
    }
    // SAFETY: initialized by the successful regcomp.
    Ok(Regex(unsafe { preg.assume_init() }))
}

/// Match `subject`, returning spans for the whole match and the first
/// `groups` subexpressions (`None` for ones that did not take part).
/// `groups` may not exceed the pattern's subexpression count.
#[track_caller]
pub fn regexec(regex: &Regex, subject: Option<&CStr>, groups: usize, eflags: c_int) -> GuardResult<Vec<Span>> {
    let g = Guard::new("regexec");
    let args: &[Arg<'_>] = &[("subject", &subject), ("groups", &groups), ("eflags", &eflags)];
    let subject = g.required(subject, "subject is null", args)?;
    g.fits(groups, regex.groups(), "more groups than the pattern has", args)?;
    let mut slots = vec![libc::regmatch_t { rm_so: -1, rm_eo: -1 }; groups + 1];
    // SAFETY: `slots` has room for `groups + 1` entries.
    let rc = g.call(|| unsafe {
        libc::regexec(&*regex.0, subject.as_ptr(), slots.len(), slots.as_mut_ptr(), eflags)
    });
    if rc != 0 {
        let benign = rc == libc::REG_NOMATCH;
        return Err(g.status_failure(rc, regerror(rc, Some(regex)), benign, args));
    }
    Ok(slots
        .iter()
        .map(|m| (m.rm_so >= 0).then(|| (m.rm_so as usize, m.rm_eo as usize)))
        .collect())
}

pub fn regfree(regex: Regex) {
    drop(regex);
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::{ErrorClass, GuardError, diag};

    #[test]
    fn match_with_groups() {
        let re = regcomp(Some(c"([a-z]+)-([0-9]+)"), libc::REG_EXTENDED).unwrap();
        assert_eq!(re.groups(), 2);
        let spans = regexec(&re, Some(c"id: abc-42;"), 2, 0).unwrap();
        assert_eq!(spans, vec![Some((4, 10)), Some((4, 7)), Some((8, 10))]);
        regfree(re);
    }

    #[test]
    fn no_match_is_benign_and_silent() {
        let re = regcomp(Some(c"^x"), libc::REG_EXTENDED).unwrap();
        let (r, records) = diag::capture(|| regexec(&re, Some(c"abc"), 0, 0));
        let err = r.unwrap_err();
        assert!(err.is_benign());
        assert!(matches!(err, GuardError::Status { code, .. } if code == libc::REG_NOMATCH));
        assert!(records.is_empty());
    }

    #[test]
    fn bad_pattern_is_logged_with_description() {
        let (r, records) = diag::capture(|| regcomp(Some(c"(unclosed"), libc::REG_EXTENDED));
        let err = r.unwrap_err();
        assert_eq!(err.kind(), ErrorClass::Delegated);
        assert!(!err.is_benign());
        assert_eq!(records.len(), 1);
        assert!(records[0].description.as_deref().is_some_and(|d| !d.is_empty()));
    }

    #[test]
    fn excessive_group_count_is_refused() {
        let re = regcomp(Some(c"(a)"), libc::REG_EXTENDED).unwrap();
        let (r, records) = diag::capture(|| regexec(&re, Some(c"a"), usize::MAX, 0));
        let err = r.unwrap_err();
        assert_eq!(err.kind(), ErrorClass::InvalidArgument);
        assert_eq!(err.errno(), Some(libc::EINVAL));
        assert_eq!(records[0].level, guardlibc_membrane::Severity::Warn);
        let (r, _) = diag::capture(|| regexec(&re, Some(c"a"), 2, 0));
        assert!(r.is_err());
        assert_eq!(regexec(&re, Some(c"a"), 1, 0).unwrap(), vec![Some((0, 1)), Some((0, 1))]);
    }

    #[test]
    fn null_subject_is_rejected() {
        let re = regcomp(Some(c"a"), 0).unwrap();
        let (r, _) = diag::capture(|| regexec(&re, None, 0, 0));
        assert_eq!(r.unwrap_err().kind(), ErrorClass::InvalidArgument);
    }
}
