//! Host libc symbols used by the wrappers but not declared (on every target)
//! by the `libc` crate.

use std::ffi::{c_char, c_double, c_int, c_longlong, c_uint, c_ulonglong, c_void};

use libc::{size_t, socklen_t, time_t, tm, wchar_t};

/// glibc `wint_t` (`unsigned int`).
#[allow(non_camel_case_types)]
pub type wint_t = c_uint;

/// glibc `PTHREAD_CANCELED` (`(void *) -1`).
pub const PTHREAD_CANCELED: *mut c_void = usize::MAX as *mut c_void;

/// `re_nsub` of a compiled `regex_t`; the `libc` crate keeps the field private.
#[must_use]
pub fn regex_nsub(re: &libc::regex_t) -> size_t {
    // glibc `struct re_pattern_buffer` prefix up to and including `re_nsub`.
    #[repr(C)]
    struct Prefix {
        buffer: *mut c_void,
        allocated: size_t,
        used: size_t,
        syntax: libc::c_ulong,
        fastmap: *mut c_char,
        translate: *mut c_char,
        re_nsub: size_t,
    }
    const _: () = assert!(size_of::<Prefix>() <= size_of::<libc::regex_t>());
    // SAFETY: `Prefix` mirrors the leading fields of glibc's `regex_t`.
    unsafe { (*(re as *const libc::regex_t).cast::<Prefix>()).re_nsub }
}

unsafe extern "C" {
    pub fn reallocarray(ptr: *mut c_void, nmemb: size_t, size: size_t) -> *mut c_void;

    pub fn strcasestr(haystack: *const c_char, needle: *const c_char) -> *mut c_char;
    pub fn strtok_r(s: *mut c_char, delim: *const c_char, saveptr: *mut *mut c_char)
    -> *mut c_char;
    pub fn strtoll(s: *const c_char, endp: *mut *mut c_char, base: c_int) -> c_longlong;
    pub fn strtoull(s: *const c_char, endp: *mut *mut c_char, base: c_int) -> c_ulonglong;
    pub fn atol(s: *const c_char) -> libc::c_long;

    pub fn wcscmp(a: *const wchar_t, b: *const wchar_t) -> c_int;
    pub fn wcsncmp(a: *const wchar_t, b: *const wchar_t, n: size_t) -> c_int;
    pub fn wcscasecmp(a: *const wchar_t, b: *const wchar_t) -> c_int;
    pub fn wcsncasecmp(a: *const wchar_t, b: *const wchar_t, n: size_t) -> c_int;
    pub fn wcscpy(dst: *mut wchar_t, src: *const wchar_t) -> *mut wchar_t;
    pub fn wcsncpy(dst: *mut wchar_t, src: *const wchar_t, n: size_t) -> *mut wchar_t;
    pub fn wcscat(dst: *mut wchar_t, src: *const wchar_t) -> *mut wchar_t;
    pub fn wcschr(s: *const wchar_t, c: wchar_t) -> *mut wchar_t;
    pub fn wcsrchr(s: *const wchar_t, c: wchar_t) -> *mut wchar_t;
    pub fn wcsstr(haystack: *const wchar_t, needle: *const wchar_t) -> *mut wchar_t;
    pub fn wcsdup(s: *const wchar_t) -> *mut wchar_t;
    pub fn wmemcpy(dst: *mut wchar_t, src: *const wchar_t, n: size_t) -> *mut wchar_t;
    pub fn wmemmove(dst: *mut wchar_t, src: *const wchar_t, n: size_t) -> *mut wchar_t;
    pub fn wmemset(dst: *mut wchar_t, c: wchar_t, n: size_t) -> *mut wchar_t;
    pub fn towlower(c: wint_t) -> wint_t;
    pub fn towupper(c: wint_t) -> wint_t;

    pub fn mbstowcs(dst: *mut wchar_t, src: *const c_char, n: size_t) -> size_t;

    pub fn inet_pton(af: c_int, src: *const c_char, dst: *mut c_void) -> c_int;
    pub fn inet_ntop(af: c_int, src: *const c_void, dst: *mut c_char, size: socklen_t)
    -> *const c_char;

    pub fn difftime(end: time_t, start: time_t) -> c_double;
    pub fn strptime(s: *const c_char, format: *const c_char, tm: *mut tm) -> *mut c_char;
}
