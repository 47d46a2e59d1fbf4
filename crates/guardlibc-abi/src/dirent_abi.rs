//! Directory streams (`<dirent.h>`).

use std::ffi::{CStr, CString};
use std::os::fd::RawFd;
use std::ptr::NonNull;

use guardlibc_membrane::GuardResult;

use crate::guard::{Arg, Guard};

/// Owned `DIR*`; closed on drop if not passed to [`closedir`].
#[derive(Debug)]
pub struct Dir(NonNull<libc::DIR>);

// SAFETY: a DIR is only touched through `&mut Dir`.
unsafe impl Send for Dir {}

impl Dir {
    #[must_use]
    pub fn as_ptr(&self) -> *mut libc::DIR {
        self.0.as_ptr()
    }

    fn into_raw(self) -> *mut libc::DIR {
        let dir = self.0.as_ptr();
        std::mem::forget(self);
        dir
    }
}

impl Drop for Dir {
    fn drop(&mut self) {
        // SAFETY: open and owned by this handle.
        unsafe { libc::closedir(self.0.as_ptr()) };
    }
}

/// One entry copied out of the stream's internal buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    /// `DT_*` type code.
    pub kind: u8,
    pub name: CString,
}

#[track_caller]
pub fn opendir(path: Option<&CStr>) -> GuardResult<Dir> {
    let g = Guard::new("opendir");
    let args: &[Arg<'_>] = &[("path", &path)];
    let path = g.string(path, "path is null or empty", args)?;
    // SAFETY: `path` is NUL-terminated.
    let dir = g.call(|| unsafe { libc::opendir(path.as_ptr()) });
    g.ptr(dir, args).map(Dir)
}

/// Directory stream over `fd`; on success the descriptor belongs to the
/// returned [`Dir`].
#[track_caller]
pub fn fdopendir(fd: RawFd) -> GuardResult<Dir> {
    let g = Guard::new("fdopendir");
    let args: &[Arg<'_>] = &[("fd", &fd)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let dir = g.call(|| unsafe { libc::fdopendir(fd) });
    g.ptr(dir, args).map(Dir)
}

/// Next entry, or `Ok(None)` at the end of the directory.
#[track_caller]
pub fn readdir(dir: &mut Dir) -> GuardResult<Option<DirEntry>> {
    let g = Guard::new("readdir");
    let args: &[Arg<'_>] = &[("dir", &*dir)];
    // SAFETY: `dir` is open.
    let ent = g.call(|| unsafe { libc::readdir(dir.as_ptr()) });
    if ent.is_null() {
        if crate::errno_abi::get() == 0 {
            return Ok(None);
        }
        return Err(g.failure(args));
    }
    // SAFETY: non-null entries stay valid until the next readdir on `dir`.
    let ent = unsafe { &*ent };
    // SAFETY: `d_name` is NUL-terminated.
    let name = unsafe { CStr::from_ptr(ent.d_name.as_ptr()) }.to_owned();
    Ok(Some(DirEntry {
        ino: ent.d_ino as u64,
        kind: ent.d_type,
        name,
    }))
}

#[track_caller]
pub fn rewinddir(dir: &mut Dir) {
    let g = Guard::new("rewinddir");
    // SAFETY: `dir` is open.
    g.call(|| unsafe { libc::rewinddir(dir.as_ptr()) });
}

#[track_caller]
pub fn closedir(dir: Dir) -> GuardResult<()> {
    let g = Guard::new("closedir");
    let raw = dir.into_raw();
    let args: &[Arg<'_>] = &[("dir", &raw)];
    // SAFETY: `raw` is open and released exactly once here.
    let rc = g.call(|| unsafe { libc::closedir(raw) });
    g.unit(rc, args)
}
