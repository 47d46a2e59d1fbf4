//! Descriptor I/O and filesystem calls (`<unistd.h>`, `<fcntl.h>`,
//! `<sys/stat.h>`).
//!
//! Buffers are slices with an explicit count; a count larger than the slice
//! is refused. Short transfers are returned as `Ok(n)`.

use std::ffi::{CStr, c_int};
use std::mem::MaybeUninit;
use std::os::fd::RawFd;

use guardlibc_core::{Suppress, errno, string::terminated_len};
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

#[track_caller]
pub fn open(path: Option<&CStr>, flags: c_int, mode: libc::mode_t) -> GuardResult<RawFd> {
    let g = Guard::new("open");
    let args: &[Arg<'_>] = &[("path", &path), ("flags", &flags), ("mode", &mode)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let fd = g.call(|| unsafe { libc::open(path.as_ptr(), flags, libc::c_uint::from(mode)) });
    g.int(fd, args)
}

#[track_caller]
pub fn creat(path: Option<&CStr>, mode: libc::mode_t) -> GuardResult<RawFd> {
    let g = Guard::new("creat");
    let args: &[Arg<'_>] = &[("path", &path), ("mode", &mode)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let fd = g.call(|| unsafe { libc::creat(path.as_ptr(), mode) });
    g.int(fd, args)
}

#[track_caller]
pub fn close(fd: RawFd) -> GuardResult<()> {
    let g = Guard::new("close");
    let args: &[Arg<'_>] = &[("fd", &fd)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::close(fd) });
    g.unit(rc, args)
}

/// Read up to `count` bytes into `buf`. `EAGAIN` is benign.
#[track_caller]
pub fn read(fd: RawFd, buf: &mut [u8], count: usize) -> GuardResult<usize> {
    let g = Guard::new("read").suppress(Suppress::WOULD_BLOCK);
    let args: &[Arg<'_>] = &[("fd", &fd), ("count", &count)];
    g.fd(fd, args)?;
    g.fits(count, buf.len(), "count exceeds buffer length", args)?;
    // SAFETY: `buf` is writable for `count` bytes.
    let n = g.call(|| unsafe { libc::read(fd, buf.as_mut_ptr().cast(), count) });
    let n = g.count(n, args)?;
    g.transfer(count, n, args);
    Ok(n)
}

/// Write up to `count` bytes from `buf`. `EAGAIN` is benign.
#[track_caller]
pub fn write(fd: RawFd, buf: &[u8], count: usize) -> GuardResult<usize> {
    let g = Guard::new("write").suppress(Suppress::WOULD_BLOCK);
    let args: &[Arg<'_>] = &[("fd", &fd), ("count", &count)];
    g.fd(fd, args)?;
    g.fits(count, buf.len(), "count exceeds buffer length", args)?;
    // SAFETY: `buf` is readable for `count` bytes.
    let n = g.call(|| unsafe { libc::write(fd, buf.as_ptr().cast(), count) });
    let n = g.count(n, args)?;
    g.transfer(count, n, args);
    Ok(n)
}

#[track_caller]
pub fn pread(fd: RawFd, buf: &mut [u8], count: usize, offset: libc::off_t) -> GuardResult<usize> {
    let g = Guard::new("pread");
    let args: &[Arg<'_>] = &[("fd", &fd), ("count", &count), ("offset", &offset)];
    g.fd(fd, args)?;
    g.fits(count, buf.len(), "count exceeds buffer length", args)?;
    g.ensure(offset >= 0, Severity::Error, errno::EINVAL, "negative offset", args)?;
    // SAFETY: `buf` is writable for `count` bytes.
    let n = g.call(|| unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), count, offset) });
    let n = g.count(n, args)?;
    g.transfer(count, n, args);
    Ok(n)
}

#[track_caller]
pub fn pwrite(fd: RawFd, buf: &[u8], count: usize, offset: libc::off_t) -> GuardResult<usize> {
    let g = Guard::new("pwrite");
    let args: &[Arg<'_>] = &[("fd", &fd), ("count", &count), ("offset", &offset)];
    g.fd(fd, args)?;
    g.fits(count, buf.len(), "count exceeds buffer length", args)?;
    g.ensure(offset >= 0, Severity::Error, errno::EINVAL, "negative offset", args)?;
    // SAFETY: `buf` is readable for `count` bytes.
    let n = g.call(|| unsafe { libc::pwrite(fd, buf.as_ptr().cast(), count, offset) });
    let n = g.count(n, args)?;
    g.transfer(count, n, args);
    Ok(n)
}

#[track_caller]
pub fn lseek(fd: RawFd, offset: libc::off_t, whence: c_int) -> GuardResult<libc::off_t> {
    let g = Guard::new("lseek");
    let args: &[Arg<'_>] = &[("fd", &fd), ("offset", &offset), ("whence", &whence)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let pos = g.call(|| unsafe { libc::lseek(fd, offset, whence) });
    if pos == -1 {
        return Err(g.failure(args));
    }
    Ok(pos)
}

#[track_caller]
pub fn dup(fd: RawFd) -> GuardResult<RawFd> {
    let g = Guard::new("dup");
    let args: &[Arg<'_>] = &[("fd", &fd)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::dup(fd) });
    g.int(rc, args)
}

#[track_caller]
pub fn dup2(fd: RawFd, target: RawFd) -> GuardResult<RawFd> {
    let g = Guard::new("dup2");
    let args: &[Arg<'_>] = &[("fd", &fd), ("target", &target)];
    g.fd(fd, args)?;
    g.fd(target, args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::dup2(fd, target) });
    g.int(rc, args)
}

/// Returns `[read_end, write_end]`.
#[track_caller]
pub fn pipe() -> GuardResult<[RawFd; 2]> {
    let g = Guard::new("pipe");
    let mut fds = [-1; 2];
    // SAFETY: `fds` has room for two descriptors.
    let rc = g.call(|| unsafe { libc::pipe(fds.as_mut_ptr()) });
    g.unit(rc, &[])?;
    Ok(fds)
}

/// `fcntl` with an integer argument (`F_GETFL`, `F_SETFL`, `F_DUPFD`, ...).
#[track_caller]
pub fn fcntl(fd: RawFd, cmd: c_int, arg: c_int) -> GuardResult<c_int> {
    let g = Guard::new("fcntl");
    let args: &[Arg<'_>] = &[("fd", &fd), ("cmd", &cmd), ("arg", &arg)];
    g.fd(fd, args)?;
    // SAFETY: integer-argument commands only.
    let rc = g.call(|| unsafe { libc::fcntl(fd, cmd, arg) });
    g.int(rc, args)
}

#[track_caller]
pub fn fsync(fd: RawFd) -> GuardResult<()> {
    let g = Guard::new("fsync");
    let args: &[Arg<'_>] = &[("fd", &fd)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::fsync(fd) });
    g.unit(rc, args)
}

#[track_caller]
pub fn ftruncate(fd: RawFd, length: libc::off_t) -> GuardResult<()> {
    let g = Guard::new("ftruncate");
    let args: &[Arg<'_>] = &[("fd", &fd), ("length", &length)];
    g.fd(fd, args)?;
    g.ensure(length >= 0, Severity::Warn, errno::EINVAL, "negative length", args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::ftruncate(fd, length) });
    g.unit(rc, args)
}

#[track_caller]
pub fn truncate(path: Option<&CStr>, length: libc::off_t) -> GuardResult<()> {
    let g = Guard::new("truncate");
    let args: &[Arg<'_>] = &[("path", &path), ("length", &length)];
    let path = g.string(path, "path is null or empty", args)?;
    g.ensure(length >= 0, Severity::Warn, errno::EINVAL, "negative length", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::truncate(path.as_ptr(), length) });
    g.unit(rc, args)
}

/// `ENOENT` is benign.
#[track_caller]
pub fn unlink(path: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("unlink").suppress(Suppress::NOT_FOUND);
    let args: &[Arg<'_>] = &[("path", &path)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::unlink(path.as_ptr()) });
    g.unit(rc, args)
}

#[track_caller]
pub fn rename(from: Option<&CStr>, to: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("rename");
    let args: &[Arg<'_>] = &[("from", &from), ("to", &to)];
    let from = g.string(from, "source path is null or empty", args)?;
    let to = g.string(to, "target path is null or empty", args)?;
    // SAFETY: both paths are NUL-terminated.
    let rc = g.call(|| unsafe { libc::rename(from.as_ptr(), to.as_ptr()) });
    g.unit(rc, args)
}

#[track_caller]
pub fn mkdir(path: Option<&CStr>, mode: libc::mode_t) -> GuardResult<()> {
    let g = Guard::new("mkdir");
    let args: &[Arg<'_>] = &[("path", &path), ("mode", &mode)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::mkdir(path.as_ptr(), mode) });
    g.unit(rc, args)
}

#[track_caller]
pub fn rmdir(path: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("rmdir");
    let args: &[Arg<'_>] = &[("path", &path)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::rmdir(path.as_ptr()) });
    g.unit(rc, args)
}

#[track_caller]
pub fn chdir(path: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("chdir");
    let args: &[Arg<'_>] = &[("path", &path)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::chdir(path.as_ptr()) });
    g.unit(rc, args)
}

/// Current directory, written into `buf`.
#[track_caller]
pub fn getcwd(buf: &mut [u8]) -> GuardResult<&CStr> {
    let g = Guard::new("getcwd");
    let len = buf.len();
    let args: &[Arg<'_>] = &[("size", &len)];
    g.ensure(len > 0, Severity::Warn, errno::EINVAL, "buffer is empty", args)?;
    // SAFETY: `buf` is writable for its full length.
    let p = g.call(|| unsafe { libc::getcwd(buf.as_mut_ptr().cast(), len) });
    g.ptr(p, args)?;
    CStr::from_bytes_until_nul(buf).map_err(|_| g.failure_or(errno::ERANGE, args))
}

fn stat_with(
    g: &Guard,
    path: Option<&CStr>,
    f: unsafe extern "C" fn(*const libc::c_char, *mut libc::stat) -> c_int,
) -> GuardResult<libc::stat> {
    let args: &[Arg<'_>] = &[("path", &path)];
    let path = g.string(path, "path is null or empty", args)?;
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: `path` is NUL-terminated and `st` is a valid out-pointer.
    let rc = g.call(|| unsafe { f(path.as_ptr(), st.as_mut_ptr()) });
    g.unit(rc, args)?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { st.assume_init() })
}

/// `ENOENT` is benign.
#[track_caller]
pub fn stat(path: Option<&CStr>) -> GuardResult<libc::stat> {
    stat_with(&Guard::new("stat").suppress(Suppress::NOT_FOUND), path, libc::stat)
}

/// `ENOENT` is benign.
#[track_caller]
pub fn lstat(path: Option<&CStr>) -> GuardResult<libc::stat> {
    stat_with(&Guard::new("lstat").suppress(Suppress::NOT_FOUND), path, libc::lstat)
}

#[track_caller]
pub fn fstat(fd: RawFd) -> GuardResult<libc::stat> {
    let g = Guard::new("fstat");
    let args: &[Arg<'_>] = &[("fd", &fd)];
    g.fd(fd, args)?;
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: `st` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::fstat(fd, st.as_mut_ptr()) });
    g.unit(rc, args)?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { st.assume_init() })
}

/// `ENOENT` is benign.
#[track_caller]
pub fn access(path: Option<&CStr>, mode: c_int) -> GuardResult<()> {
    let g = Guard::new("access").suppress(Suppress::NOT_FOUND);
    let args: &[Arg<'_>] = &[("path", &path), ("mode", &mode)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::access(path.as_ptr(), mode) });
    g.unit(rc, args)
}

#[track_caller]
pub fn chmod(path: Option<&CStr>, mode: libc::mode_t) -> GuardResult<()> {
    let g = Guard::new("chmod");
    let args: &[Arg<'_>] = &[("path", &path), ("mode", &mode)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::chmod(path.as_ptr(), mode) });
    g.unit(rc, args)
}

#[track_caller]
pub fn fchmod(fd: RawFd, mode: libc::mode_t) -> GuardResult<()> {
    let g = Guard::new("fchmod");
    let args: &[Arg<'_>] = &[("fd", &fd), ("mode", &mode)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::fchmod(fd, mode) });
    g.unit(rc, args)
}

#[track_caller]
pub fn chown(path: Option<&CStr>, uid: libc::uid_t, gid: libc::gid_t) -> GuardResult<()> {
    let g = Guard::new("chown");
    let args: &[Arg<'_>] = &[("path", &path), ("uid", &uid), ("gid", &gid)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let rc = g.call(|| unsafe { libc::chown(path.as_ptr(), uid, gid) });
    g.unit(rc, args)
}

#[track_caller]
pub fn link(existing: Option<&CStr>, new: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("link");
    let args: &[Arg<'_>] = &[("existing", &existing), ("new", &new)];
    let existing = g.string(existing, "source path is null or empty", args)?;
    let new = g.string(new, "link path is null or empty", args)?;
    // SAFETY: both paths are NUL-terminated.
    let rc = g.call(|| unsafe { libc::link(existing.as_ptr(), new.as_ptr()) });
    g.unit(rc, args)
}

#[track_caller]
pub fn symlink(target: Option<&CStr>, link: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("symlink");
    let args: &[Arg<'_>] = &[("target", &target), ("link", &link)];
    let target = g.string(target, "target is null or empty", args)?;
    let link = g.string(link, "link path is null or empty", args)?;
    // SAFETY: both paths are NUL-terminated.
    let rc = g.call(|| unsafe { libc::symlink(target.as_ptr(), link.as_ptr()) });
    g.unit(rc, args)
}

/// Link target bytes written into `buf` (not terminated); returns the length.
#[track_caller]
pub fn readlink(path: Option<&CStr>, buf: &mut [u8]) -> GuardResult<usize> {
    let g = Guard::new("readlink");
    let len = buf.len();
    let args: &[Arg<'_>] = &[("path", &path), ("size", &len)];
    let path = g.string(path, "path is null or empty", args)?;
    g.ensure(len > 0, Severity::Warn, errno::EINVAL, "buffer is empty", args)?;
    // SAFETY: `buf` is writable for its full length.
    let n = g.call(|| unsafe { libc::readlink(path.as_ptr(), buf.as_mut_ptr().cast(), len) });
    g.count(n, args)
}

/// Create a unique file from a template ending in `XXXXXX` followed by NUL.
/// The template is rewritten in place with the chosen name.
#[track_caller]
pub fn mkstemp(template: &mut [u8]) -> GuardResult<RawFd> {
    let g = Guard::new("mkstemp");
    let text = String::from_utf8_lossy(template).into_owned();
    let args: &[Arg<'_>] = &[("template", &text)];
    let len = terminated_len(template);
    g.ensure(len.is_some(), Severity::Error, errno::EINVAL, "template is not terminated", args)?;
    let len = len.unwrap_or_default();
    g.ensure(
        template[..len].ends_with(b"XXXXXX"),
        Severity::Error,
        errno::EINVAL,
        "template does not end in XXXXXX",
        args,
    )?;
    // SAFETY: `template` is NUL-terminated and writable.
    let fd = g.call(|| unsafe { libc::mkstemp(template.as_mut_ptr().cast()) });
    g.int(fd, args)
}

/// `ENOTTY` is the primitive's "no" answer, not a failure.
#[track_caller]
pub fn isatty(fd: RawFd) -> GuardResult<bool> {
    let g = Guard::new("isatty");
    let args: &[Arg<'_>] = &[("fd", &fd)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::isatty(fd) });
    if rc == 1 {
        return Ok(true);
    }
    match crate::errno_abi::get() {
        errno::ENOTTY | errno::EINVAL | 0 => Ok(false),
        _ => Err(g.failure(args)),
    }
}
