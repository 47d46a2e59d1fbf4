//! Buffered streams (`<stdio.h>`).
//!
//! A [`Stream`] owns a `FILE*`. It is consumed by [`fclose`] (or [`pclose`]
//! for streams from [`popen`]); dropping it closes it and discards the
//! close error, the way `std::fs::File` does.

use std::ffi::{CStr, c_int, c_long};
use std::fmt;
use std::os::fd::RawFd;
use std::ptr::{self, NonNull};

use guardlibc_core::{errno, validate};
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

/// Owned `FILE*`.
pub struct Stream {
    file: NonNull<libc::FILE>,
    piped: bool,
}

// SAFETY: glibc streams carry their own lock.
unsafe impl Send for Stream {}

impl Stream {
    fn new(file: NonNull<libc::FILE>, piped: bool) -> Self {
        Self { file, piped }
    }

    /// Raw handle, still owned by `self`.
    #[must_use]
    pub fn as_ptr(&self) -> *mut libc::FILE {
        self.file.as_ptr()
    }

    /// True for streams created by [`popen`].
    #[must_use]
    pub fn is_piped(&self) -> bool {
        self.piped
    }

    fn into_raw(self) -> *mut libc::FILE {
        let file = self.file.as_ptr();
        std::mem::forget(self);
        file
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("file", &self.file)
            .field("piped", &self.piped)
            .finish()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // SAFETY: `file` is open and owned by this handle.
        unsafe {
            if self.piped {
                libc::pclose(self.file.as_ptr());
            } else {
                libc::fclose(self.file.as_ptr());
            }
        }
    }
}

#[track_caller]
pub fn fopen(path: Option<&CStr>, mode: Option<&CStr>) -> GuardResult<Stream> {
    let g = Guard::new("fopen");
    let args: &[Arg<'_>] = &[("path", &path), ("mode", &mode)];
    let path = g.string(path, "path is null or empty", args)?;
    let mode = g.string(mode, "mode is null or empty", args)?;
    // SAFETY: both strings are NUL-terminated.
    let file = g.call(|| unsafe { libc::fopen(path.as_ptr(), mode.as_ptr()) });
    Ok(Stream::new(g.ptr(file, args)?, false))
}

#[track_caller]
pub fn fdopen(fd: RawFd, mode: Option<&CStr>) -> GuardResult<Stream> {
    let g = Guard::new("fdopen");
    let args: &[Arg<'_>] = &[("fd", &fd), ("mode", &mode)];
    g.fd(fd, args)?;
    let mode = g.string(mode, "mode is null or empty", args)?;
    // SAFETY: `mode` is NUL-terminated.
    let file = g.call(|| unsafe { libc::fdopen(fd, mode.as_ptr()) });
    Ok(Stream::new(g.ptr(file, args)?, false))
}

/// Reopen `stream` on `path`, or change its mode when `path` is `None`.
/// The original stream is closed either way.
#[track_caller]
pub fn freopen(path: Option<&CStr>, mode: Option<&CStr>, stream: Stream) -> GuardResult<Stream> {
    let g = Guard::new("freopen");
    let handle = stream.as_ptr();
    let args: &[Arg<'_>] = &[("path", &path), ("mode", &mode), ("stream", &handle)];
    let mode = g.string(mode, "mode is null or empty", args)?;
    if let Some(p) = path {
        g.string(Some(p), "path is empty", args)?;
    }
    let path_ptr = path.map_or(ptr::null(), CStr::as_ptr);
    let raw = stream.into_raw();
    // SAFETY: `raw` is an open stream; ownership passes to freopen.
    let file = g.call(|| unsafe { libc::freopen(path_ptr, mode.as_ptr(), raw) });
    Ok(Stream::new(g.ptr(file, args)?, false))
}

#[track_caller]
pub fn fclose(stream: Stream) -> GuardResult<()> {
    let g = Guard::new("fclose");
    let handle = stream.as_ptr();
    let args: &[Arg<'_>] = &[("stream", &handle)];
    g.ensure(
        !stream.piped,
        Severity::Error,
        errno::EINVAL,
        "stream was opened with popen",
        args,
    )?;
    let raw = stream.into_raw();
    // SAFETY: `raw` is open and released exactly once here.
    let rc = g.call(|| unsafe { libc::fclose(raw) });
    if rc == libc::EOF {
        return Err(g.failure(args));
    }
    Ok(())
}

/// Read `nmemb` items of `size` bytes. End of file yields a short count
/// without a diagnostic.
#[track_caller]
pub fn fread(buf: &mut [u8], size: usize, nmemb: usize, stream: &mut Stream) -> GuardResult<usize> {
    let g = Guard::new("fread");
    let args: &[Arg<'_>] = &[("size", &size), ("nmemb", &nmemb), ("stream", &*stream)];
    let total = validate::array_size(size, nmemb).unwrap_or(usize::MAX);
    g.fits(total, buf.len(), "size * nmemb exceeds buffer length", args)?;
    // SAFETY: `buf` is writable for `size * nmemb` bytes.
    let n = g.call(|| unsafe { libc::fread(buf.as_mut_ptr().cast(), size, nmemb, stream.as_ptr()) });
    g.transfer(nmemb, n, args);
    Ok(n)
}

#[track_caller]
pub fn fwrite(buf: &[u8], size: usize, nmemb: usize, stream: &mut Stream) -> GuardResult<usize> {
    let g = Guard::new("fwrite");
    let args: &[Arg<'_>] = &[("size", &size), ("nmemb", &nmemb), ("stream", &*stream)];
    let total = validate::array_size(size, nmemb).unwrap_or(usize::MAX);
    g.fits(total, buf.len(), "size * nmemb exceeds buffer length", args)?;
    // SAFETY: `buf` is readable for `size * nmemb` bytes.
    let n = g.call(|| unsafe { libc::fwrite(buf.as_ptr().cast(), size, nmemb, stream.as_ptr()) });
    g.transfer(nmemb, n, args);
    Ok(n)
}

/// Read one line into `buf`. `Ok(None)` at end of file.
#[track_caller]
pub fn fgets<'b>(buf: &'b mut [u8], stream: &mut Stream) -> GuardResult<Option<&'b CStr>> {
    let g = Guard::new("fgets");
    let len = buf.len();
    let args: &[Arg<'_>] = &[("size", &len), ("stream", &*stream)];
    g.ensure(len > 0, Severity::Warn, errno::EINVAL, "buffer is empty", args)?;
    let n = c_int::try_from(len).unwrap_or(c_int::MAX);
    // SAFETY: `buf` is writable for `n` bytes.
    let p = g.call(|| unsafe { libc::fgets(buf.as_mut_ptr().cast(), n, stream.as_ptr()) });
    if p.is_null() {
        // SAFETY: `stream` is open.
        if unsafe { libc::ferror(stream.as_ptr()) } != 0 {
            return Err(g.failure_or(errno::EIO, args));
        }
        return Ok(None);
    }
    CStr::from_bytes_until_nul(buf)
        .map(Some)
        .map_err(|_| g.failure_or(errno::EIO, args))
}

#[track_caller]
pub fn fputs(s: Option<&CStr>, stream: &mut Stream) -> GuardResult<()> {
    let g = Guard::new("fputs");
    let args: &[Arg<'_>] = &[("s", &s), ("stream", &*stream)];
    let s = g.required(s, "string is null", args)?;
    // SAFETY: `s` is NUL-terminated and `stream` is open.
    let rc = g.call(|| unsafe { libc::fputs(s.as_ptr(), stream.as_ptr()) });
    if rc == libc::EOF {
        return Err(g.failure_or(errno::EIO, args));
    }
    Ok(())
}

/// Next byte, or `Ok(None)` at end of file.
#[track_caller]
pub fn fgetc(stream: &mut Stream) -> GuardResult<Option<u8>> {
    let g = Guard::new("fgetc");
    let args: &[Arg<'_>] = &[("stream", &*stream)];
    // SAFETY: `stream` is open.
    let c = g.call(|| unsafe { libc::fgetc(stream.as_ptr()) });
    if c == libc::EOF {
        // SAFETY: `stream` is open.
        if unsafe { libc::ferror(stream.as_ptr()) } != 0 {
            return Err(g.failure_or(errno::EIO, args));
        }
        return Ok(None);
    }
    Ok(Some(c as u8))
}

#[track_caller]
pub fn fputc(c: u8, stream: &mut Stream) -> GuardResult<()> {
    let g = Guard::new("fputc");
    let args: &[Arg<'_>] = &[("c", &c), ("stream", &*stream)];
    // SAFETY: `stream` is open.
    let rc = g.call(|| unsafe { libc::fputc(c_int::from(c), stream.as_ptr()) });
    if rc == libc::EOF {
        return Err(g.failure_or(errno::EIO, args));
    }
    Ok(())
}

/// Read one line including its newline. `Ok(None)` at end of file.
#[track_caller]
pub fn getline(stream: &mut Stream) -> GuardResult<Option<Vec<u8>>> {
    let g = Guard::new("getline");
    let args: &[Arg<'_>] = &[("stream", &*stream)];
    let mut line: *mut libc::c_char = ptr::null_mut();
    let mut cap: usize = 0;
    // SAFETY: `line`/`cap` start as an empty allocation, as getline expects.
    let n = g.call(|| unsafe { libc::getline(&mut line, &mut cap, stream.as_ptr()) });
    let result = if n >= 0 {
        // SAFETY: getline wrote `n` bytes at `line`.
        Ok(Some(unsafe { std::slice::from_raw_parts(line.cast::<u8>(), n as usize) }.to_vec()))
    } else if crate::errno_abi::get() == 0 && unsafe { libc::feof(stream.as_ptr()) } != 0 {
        Ok(None)
    } else {
        // errno may still be zero when only the stream error flag is set.
        Err(g.failure_or(errno::EIO, args))
    };
    // SAFETY: `line` is null or allocated by getline.
    unsafe { libc::free(line.cast()) };
    result
}

/// Flush `stream`, or every output stream when `None`.
#[track_caller]
pub fn fflush(stream: Option<&mut Stream>) -> GuardResult<()> {
    let g = Guard::new("fflush");
    let raw = stream.map_or(ptr::null_mut(), |s| s.as_ptr());
    let args: &[Arg<'_>] = &[("stream", &raw)];
    // SAFETY: null or an open stream.
    let rc = g.call(|| unsafe { libc::fflush(raw) });
    if rc == libc::EOF {
        return Err(g.failure_or(errno::EIO, args));
    }
    Ok(())
}

#[track_caller]
pub fn fseek(stream: &mut Stream, offset: c_long, whence: c_int) -> GuardResult<()> {
    let g = Guard::new("fseek");
    let args: &[Arg<'_>] = &[("stream", &*stream), ("offset", &offset), ("whence", &whence)];
    g.ensure(
        matches!(whence, libc::SEEK_SET | libc::SEEK_CUR | libc::SEEK_END),
        Severity::Error,
        errno::EINVAL,
        "whence is not SEEK_SET, SEEK_CUR or SEEK_END",
        args,
    )?;
    // SAFETY: `stream` is open.
    let rc = g.call(|| unsafe { libc::fseek(stream.as_ptr(), offset, whence) });
    g.unit(rc, args)
}

#[track_caller]
pub fn ftell(stream: &mut Stream) -> GuardResult<c_long> {
    let g = Guard::new("ftell");
    let args: &[Arg<'_>] = &[("stream", &*stream)];
    // SAFETY: `stream` is open.
    let pos = g.call(|| unsafe { libc::ftell(stream.as_ptr()) });
    if pos == -1 {
        return Err(g.failure(args));
    }
    Ok(pos)
}

#[track_caller]
pub fn rewind(stream: &mut Stream) {
    let g = Guard::new("rewind");
    // SAFETY: `stream` is open.
    g.call(|| unsafe { libc::rewind(stream.as_ptr()) });
}

#[track_caller]
pub fn fileno(stream: &Stream) -> GuardResult<RawFd> {
    let g = Guard::new("fileno");
    let args: &[Arg<'_>] = &[("stream", stream)];
    // SAFETY: `stream` is open.
    let fd = g.call(|| unsafe { libc::fileno(stream.as_ptr()) });
    g.int(fd, args)
}

#[must_use]
pub fn feof(stream: &Stream) -> bool {
    // SAFETY: `stream` is open.
    unsafe { libc::feof(stream.as_ptr()) != 0 }
}

#[must_use]
pub fn ferror(stream: &Stream) -> bool {
    // SAFETY: `stream` is open.
    unsafe { libc::ferror(stream.as_ptr()) != 0 }
}

pub fn clearerr(stream: &mut Stream) {
    // SAFETY: `stream` is open.
    unsafe { libc::clearerr(stream.as_ptr()) };
}

/// Select the buffering mode; the buffer itself is allocated by libc.
#[track_caller]
pub fn setvbuf(stream: &mut Stream, mode: c_int, size: usize) -> GuardResult<()> {
    let g = Guard::new("setvbuf");
    let args: &[Arg<'_>] = &[("stream", &*stream), ("mode", &mode), ("size", &size)];
    g.ensure(
        matches!(mode, libc::_IOFBF | libc::_IOLBF | libc::_IONBF),
        Severity::Error,
        errno::EINVAL,
        "mode is not _IOFBF, _IOLBF or _IONBF",
        args,
    )?;
    g.size(size, args)?;
    // SAFETY: `stream` is open and no I/O has been performed by this wrapper.
    let rc = g.call(|| unsafe { libc::setvbuf(stream.as_ptr(), ptr::null_mut(), mode, size) });
    if rc != 0 {
        return Err(g.failure(args));
    }
    Ok(())
}

#[track_caller]
pub fn tmpfile() -> GuardResult<Stream> {
    let g = Guard::new("tmpfile");
    // SAFETY: no arguments.
    let file = g.call(|| unsafe { libc::tmpfile() });
    Ok(Stream::new(g.ptr(file, &[])?, false))
}

#[track_caller]
pub fn remove(path: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("remove");
    let args: &[Arg<'_>] = &[("path", &path)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::remove(path.as_ptr()) });
    g.unit(rc, args)
}

/// Run `command` through the shell with a pipe to or from it.
#[track_caller]
pub fn popen(command: Option<&CStr>, mode: Option<&CStr>) -> GuardResult<Stream> {
    let g = Guard::new("popen");
    let args: &[Arg<'_>] = &[("command", &command), ("mode", &mode)];
    let command = g.string(command, "command is null or empty", args)?;
    let mode = g.string(mode, "mode is null or empty", args)?;
    // SAFETY: both strings are NUL-terminated.
    let file = g.call(|| unsafe { libc::popen(command.as_ptr(), mode.as_ptr()) });
    Ok(Stream::new(g.ptr(file, args)?, true))
}

/// Close a [`popen`] stream and return the command's wait status.
#[track_caller]
pub fn pclose(stream: Stream) -> GuardResult<c_int> {
    let g = Guard::new("pclose");
    let handle = stream.as_ptr();
    let args: &[Arg<'_>] = &[("stream", &handle)];
    g.ensure(
        stream.piped,
        Severity::Error,
        errno::EINVAL,
        "stream was not opened with popen",
        args,
    )?;
    let raw = stream.into_raw();
    // SAFETY: `raw` is a popen stream released exactly once here.
    let status = g.call(|| unsafe { libc::pclose(raw) });
    g.int(status, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::{ErrorClass, diag};

    #[test]
    fn fopen_null_path_is_rejected() {
        let (r, records) = diag::capture(|| fopen(None, Some(c"r")));
        assert_eq!(r.unwrap_err().kind(), ErrorClass::InvalidArgument);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].op, "fopen");
    }

    #[test]
    fn getline_failure_is_not_end_of_file() {
        let path = std::env::temp_dir().join(format!("guardlibc-getline-{}", std::process::id()));
        let cpath = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
        let mut s = fopen(Some(&cpath), Some(c"w")).unwrap();
        let (r, records) = diag::capture(|| getline(&mut s));
        let err = r.unwrap_err();
        assert_eq!(err.kind(), ErrorClass::Delegated);
        assert_eq!(err.errno(), Some(libc::EBADF));
        assert_eq!(records.len(), 1);
        fclose(s).unwrap();
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn tmpfile_write_seek_read() {
        let mut s = tmpfile().unwrap();
        assert_eq!(fwrite(b"line one\nline two\n", 1, 18, &mut s).unwrap(), 18);
        rewind(&mut s);
        let mut buf = [0u8; 64];
        assert_eq!(fgets(&mut buf, &mut s).unwrap(), Some(c"line one\n"));
        assert_eq!(getline(&mut s).unwrap().as_deref(), Some(&b"line two\n"[..]));
        assert_eq!(getline(&mut s).unwrap(), None);
        assert!(feof(&s));
        fclose(s).unwrap();
    }

    #[test]
    fn fread_at_eof_is_silent() {
        let mut s = tmpfile().unwrap();
        fputs(Some(c"abc"), &mut s).unwrap();
        fseek(&mut s, 0, libc::SEEK_SET).unwrap();
        let mut buf = [0u8; 16];
        let (n, records) = diag::capture(|| fread(&mut buf, 1, 16, &mut s));
        assert_eq!(n.unwrap(), 3);
        assert!(records.is_empty());
        assert_eq!(fgetc(&mut s).unwrap(), None);
    }

    #[test]
    fn popen_roundtrip() {
        let mut s = popen(Some(c"echo guard"), Some(c"r")).unwrap();
        assert_eq!(getline(&mut s).unwrap().as_deref(), Some(&b"guard\n"[..]));
        assert_eq!(pclose(s).unwrap(), 0);
    }

    #[test]
    fn fclose_refuses_piped_stream() {
        let s = popen(Some(c"true"), Some(c"r")).unwrap();
        let (r, _) = diag::capture(|| fclose(s));
        assert!(r.is_err());
    }
}
