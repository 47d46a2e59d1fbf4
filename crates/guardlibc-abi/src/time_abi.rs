//! Clocks, calendar conversion and sleeping (`<time.h>`, `<sys/time.h>`).

use std::ffi::{CStr, c_double, c_int};
use std::mem::MaybeUninit;

use guardlibc_core::errno;
use guardlibc_membrane::{GuardResult, Severity};

use crate::ffi;
use crate::guard::{Arg, Guard};

/// All-zero broken-down time.
#[must_use]
pub fn empty_tm() -> libc::tm {
    // SAFETY: all-zero is a valid `tm` (null `tm_zone` included).
    unsafe { std::mem::zeroed() }
}

#[track_caller]
pub fn time() -> GuardResult<libc::time_t> {
    let g = Guard::new("time");
    // SAFETY: null out-pointer is allowed.
    let t = g.call(|| unsafe { libc::time(std::ptr::null_mut()) });
    if t == -1 {
        return Err(g.failure(&[]));
    }
    Ok(t)
}

#[track_caller]
pub fn gettimeofday() -> GuardResult<libc::timeval> {
    let g = Guard::new("gettimeofday");
    let mut tv = MaybeUninit::<libc::timeval>::uninit();
    // SAFETY: `tv` is a valid out-pointer; the timezone argument is null.
    let rc = g.call(|| unsafe { libc::gettimeofday(tv.as_mut_ptr(), std::ptr::null_mut()) });
    g.unit(rc, &[])?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { tv.assume_init() })
}

#[track_caller]
pub fn clock_gettime(clock: libc::clockid_t) -> GuardResult<libc::timespec> {
    let g = Guard::new("clock_gettime");
    let args: &[Arg<'_>] = &[("clock", &clock)];
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    // SAFETY: `ts` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::clock_gettime(clock, ts.as_mut_ptr()) });
    g.unit(rc, args)?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { ts.assume_init() })
}

#[track_caller]
pub fn localtime_r(t: libc::time_t) -> GuardResult<libc::tm> {
    let g = Guard::new("localtime_r");
    let args: &[Arg<'_>] = &[("time", &t)];
    let mut tm = empty_tm();
    // SAFETY: both pointers are valid for the call.
    let p = g.call(|| unsafe { libc::localtime_r(&t, &mut tm) });
    g.ptr(p, args)?;
    Ok(tm)
}

#[track_caller]
pub fn gmtime_r(t: libc::time_t) -> GuardResult<libc::tm> {
    let g = Guard::new("gmtime_r");
    let args: &[Arg<'_>] = &[("time", &t)];
    let mut tm = empty_tm();
    // SAFETY: both pointers are valid for the call.
    let p = g.call(|| unsafe { libc::gmtime_r(&t, &mut tm) });
    g.ptr(p, args)?;
    Ok(tm)
}

/// Local broken-down time to epoch seconds; `tm` is normalized in place.
#[track_caller]
pub fn mktime(tm: &mut libc::tm) -> GuardResult<libc::time_t> {
    let g = Guard::new("mktime");
    let fields = ymd(tm);
    let args: &[Arg<'_>] = &[("ymd", &fields)];
    // SAFETY: `tm` is a valid, exclusive pointer.
    let t = g.call(|| unsafe { libc::mktime(tm) });
    if t == -1 && crate::errno_abi::get() != 0 {
        return Err(g.failure(args));
    }
    Ok(t)
}

/// UTC broken-down time to epoch seconds; `tm` is normalized in place.
#[track_caller]
pub fn timegm(tm: &mut libc::tm) -> GuardResult<libc::time_t> {
    let g = Guard::new("timegm");
    let fields = ymd(tm);
    let args: &[Arg<'_>] = &[("ymd", &fields)];
    // SAFETY: `tm` is a valid, exclusive pointer.
    let t = g.call(|| unsafe { libc::timegm(tm) });
    if t == -1 && crate::errno_abi::get() != 0 {
        return Err(g.failure(args));
    }
    Ok(t)
}

/// Format `tm` into `buf`. A result that does not fit (or is empty) fails
/// with `ERANGE`.
#[track_caller]
pub fn strftime<'b>(buf: &'b mut [u8], format: Option<&CStr>, tm: &libc::tm) -> GuardResult<&'b CStr> {
    let g = Guard::new("strftime");
    let cap = buf.len();
    let args: &[Arg<'_>] = &[("format", &format), ("size", &cap)];
    let format = g.required(format, "format is null", args)?;
    g.ensure(cap > 0, Severity::Warn, errno::EINVAL, "buffer is empty", args)?;
    // SAFETY: `buf` is writable for `cap` bytes; `format` is terminated.
    let n = g.call(|| unsafe { libc::strftime(buf.as_mut_ptr().cast(), cap, format.as_ptr(), tm) });
    if n == 0 && !format.is_empty() {
        return Err(g.failure_or(errno::ERANGE, args));
    }
    CStr::from_bytes_until_nul(buf).map_err(|_| g.failure_or(errno::ERANGE, args))
}

/// Parse `s` according to `format` into `tm`; returns the number of bytes
/// consumed.
#[track_caller]
pub fn strptime(s: Option<&CStr>, format: Option<&CStr>, tm: &mut libc::tm) -> GuardResult<usize> {
    let g = Guard::new("strptime");
    let args: &[Arg<'_>] = &[("s", &s), ("format", &format)];
    let s = g.required(s, "input is null", args)?;
    let format = g.required(format, "format is null", args)?;
    // SAFETY: both strings are terminated; `tm` is exclusive.
    let end = g.call(|| unsafe { ffi::strptime(s.as_ptr(), format.as_ptr(), tm) });
    if end.is_null() {
        return Err(g.failure_or(errno::EINVAL, args));
    }
    Ok(end as usize - s.as_ptr() as usize)
}

/// Sleep for `duration`. When interrupted, the unslept time is written to
/// `remaining` (if given) and `EINTR` is returned.
#[track_caller]
pub fn nanosleep(duration: &libc::timespec, remaining: Option<&mut libc::timespec>) -> GuardResult<()> {
    let g = Guard::new("nanosleep");
    let args: &[Arg<'_>] = &[("sec", &duration.tv_sec), ("nsec", &duration.tv_nsec)];
    g.ensure(
        duration.tv_sec >= 0 && (0..1_000_000_000).contains(&duration.tv_nsec),
        Severity::Error,
        errno::EINVAL,
        "duration out of range",
        args,
    )?;
    let rem = remaining.map_or(std::ptr::null_mut(), |r| r as *mut _);
    // SAFETY: `duration` is valid; `rem` is null or exclusive.
    let rc = g.call(|| unsafe { libc::nanosleep(duration, rem) });
    g.unit(rc, args)
}

#[must_use]
pub fn difftime(end: libc::time_t, start: libc::time_t) -> c_double {
    // SAFETY: pure arithmetic.
    unsafe { ffi::difftime(end, start) }
}

/// Broken-down fields as `(year, month 1-12, day)`.
#[must_use]
pub fn ymd(tm: &libc::tm) -> (c_int, c_int, c_int) {
    (tm.tm_year + 1900, tm.tm_mon + 1, tm.tm_mday)
}
