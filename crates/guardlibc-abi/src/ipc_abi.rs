//! Shared memory, memory mappings and POSIX semaphores.
//!
//! `shm_unlink`/`sem_unlink` of a missing name and `sem_trywait` on a zero
//! semaphore are benign.

use std::cell::UnsafeCell;
use std::ffi::{CStr, c_int, c_uint, c_void};
use std::os::fd::RawFd;
use std::ptr::NonNull;

use guardlibc_core::{Suppress, errno};
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

// ---------------------------------------------------------------------------
// Shared memory and mappings
// ---------------------------------------------------------------------------

#[track_caller]
pub fn shm_open(name: Option<&CStr>, oflag: c_int, mode: libc::mode_t) -> GuardResult<RawFd> {
    let g = Guard::new("shm_open");
    let args: &[Arg<'_>] = &[("name", &name), ("oflag", &oflag), ("mode", &mode)];
    let name = g.string(name, "name is null or empty", args)?;
    // SAFETY: `name` is terminated.
    let fd = g.call(|| unsafe { libc::shm_open(name.as_ptr(), oflag, mode) });
    g.int(fd, args)
}

/// `ENOENT` is benign.
#[track_caller]
pub fn shm_unlink(name: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("shm_unlink").suppress(Suppress::NOT_FOUND);
    let args: &[Arg<'_>] = &[("name", &name)];
    let name = g.string(name, "name is null or empty", args)?;
    // SAFETY: `name` is terminated.
    let rc = g.call(|| unsafe { libc::shm_unlink(name.as_ptr()) });
    g.unit(rc, args)
}

/// Map `len` bytes. `fd` must be `-1` exactly when `MAP_ANONYMOUS` is set.
#[track_caller]
pub fn mmap(
    hint: *mut c_void,
    len: usize,
    prot: c_int,
    flags: c_int,
    fd: RawFd,
    offset: libc::off_t,
) -> GuardResult<NonNull<c_void>> {
    let g = Guard::new("mmap");
    let args: &[Arg<'_>] = &[
        ("hint", &hint),
        ("len", &len),
        ("prot", &prot),
        ("flags", &flags),
        ("fd", &fd),
        ("offset", &offset),
    ];
    g.ensure(len > 0, Severity::Warn, errno::EINVAL, "zero-length mapping", args)?;
    g.size(len, args)?;
    g.ensure(offset >= 0, Severity::Error, errno::EINVAL, "negative offset", args)?;
    if flags & libc::MAP_ANONYMOUS == 0 {
        g.fd(fd, args)?;
    }
    // SAFETY: the kernel chooses or validates the address; no existing
    // mapping is replaced unless the caller passes MAP_FIXED.
    let p = g.call(|| unsafe { libc::mmap(hint, len, prot, flags, fd, offset) });
    if p == libc::MAP_FAILED {
        return Err(g.failure(args));
    }
    g.ptr(p, args)
}

/// # Safety
///
/// Nothing may access the range after it is unmapped.
#[track_caller]
pub unsafe fn munmap(addr: NonNull<c_void>, len: usize) -> GuardResult<()> {
    let g = Guard::new("munmap");
    let args: &[Arg<'_>] = &[("addr", &addr), ("len", &len)];
    g.ensure(len > 0, Severity::Warn, errno::EINVAL, "zero length", args)?;
    // SAFETY: upheld by the caller.
    let rc = g.call(|| unsafe { libc::munmap(addr.as_ptr(), len) });
    g.unit(rc, args)
}

/// # Safety
///
/// `addr..addr+len` must lie within a live mapping.
#[track_caller]
pub unsafe fn msync(addr: NonNull<c_void>, len: usize, flags: c_int) -> GuardResult<()> {
    let g = Guard::new("msync");
    let args: &[Arg<'_>] = &[("addr", &addr), ("len", &len), ("flags", &flags)];
    g.ensure(
        flags & (libc::MS_SYNC | libc::MS_ASYNC) != libc::MS_SYNC | libc::MS_ASYNC,
        Severity::Error,
        errno::EINVAL,
        "MS_SYNC and MS_ASYNC are exclusive",
        args,
    )?;
    // SAFETY: upheld by the caller.
    let rc = g.call(|| unsafe { libc::msync(addr.as_ptr(), len, flags) });
    g.unit(rc, args)
}

// ---------------------------------------------------------------------------
// Semaphores
// ---------------------------------------------------------------------------

/// Anything that exposes a live `sem_t`.
pub trait AsSemaphore {
    fn as_sem_ptr(&self) -> *mut libc::sem_t;
}

/// Named semaphore from [`sem_open`]; closed on drop if not passed to
/// [`sem_close`].
#[derive(Debug)]
pub struct NamedSemaphore(NonNull<libc::sem_t>);

// SAFETY: sem_t operations are thread-safe.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl AsSemaphore for NamedSemaphore {
    fn as_sem_ptr(&self) -> *mut libc::sem_t {
        self.0.as_ptr()
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: opened by sem_open and closed once.
        unsafe { libc::sem_close(self.0.as_ptr()) };
    }
}

/// Process-private semaphore from [`sem_init`], boxed so its address is
/// stable; destroyed on drop if not passed to [`sem_destroy`].
pub struct Semaphore(Box<UnsafeCell<libc::sem_t>>);

// SAFETY: sem_t operations are thread-safe.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Semaphore").field(&self.0.get()).finish()
    }
}

impl AsSemaphore for Semaphore {
    fn as_sem_ptr(&self) -> *mut libc::sem_t {
        self.0.get()
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: initialized by sem_init and destroyed once.
        unsafe { libc::sem_destroy(self.0.get()) };
    }
}

/// Open (or create, with `O_CREAT`) a named semaphore.
#[track_caller]
pub fn sem_open(
    name: Option<&CStr>,
    oflag: c_int,
    mode: libc::mode_t,
    value: c_uint,
) -> GuardResult<NamedSemaphore> {
    let g = Guard::new("sem_open");
    let args: &[Arg<'_>] = &[("name", &name), ("oflag", &oflag), ("value", &value)];
    let name = g.string(name, "name is null or empty", args)?;
    // SAFETY: `name` is terminated; the variadic tail matches O_CREAT usage.
    let sem = g.call(|| unsafe {
        libc::sem_open(name.as_ptr(), oflag, libc::c_uint::from(mode), value)
    });
    if sem == libc::SEM_FAILED {
        return Err(g.failure(args));
    }
    g.ptr(sem, args).map(NamedSemaphore)
}

#[track_caller]
pub fn sem_close(sem: NamedSemaphore) -> GuardResult<()> {
    let g = Guard::new("sem_close");
    let raw = sem.0.as_ptr();
    std::mem::forget(sem);
    let args: &[Arg<'_>] = &[("sem", &raw)];
    // SAFETY: released exactly once here.
    let rc = g.call(|| unsafe { libc::sem_close(raw) });
    g.unit(rc, args)
}

/// `ENOENT` is benign.
#[track_caller]
pub fn sem_unlink(name: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("sem_unlink").suppress(Suppress::NOT_FOUND);
    let args: &[Arg<'_>] = &[("name", &name)];
    let name = g.string(name, "name is null or empty", args)?;
    // SAFETY: `name` is terminated.
    let rc = g.call(|| unsafe { libc::sem_unlink(name.as_ptr()) });
    g.unit(rc, args)
}

#[track_caller]
pub fn sem_init(value: c_uint) -> GuardResult<Semaphore> {
    let g = Guard::new("sem_init");
    let args: &[Arg<'_>] = &[("value", &value)];
    // SAFETY: zeroed storage is only used after sem_init succeeds.
    let cell: Box<UnsafeCell<libc::sem_t>> = Box::new(UnsafeCell::new(unsafe { std::mem::zeroed() }));
    // SAFETY: `cell` is writable and stays at this address.
    let rc = g.call(|| unsafe { libc::sem_init(cell.get(), 0, value) });
    if rc == -1 {
        return Err(g.failure(args));
    }
    Ok(Semaphore(cell))
}

#[track_caller]
pub fn sem_destroy(sem: Semaphore) -> GuardResult<()> {
    let g = Guard::new("sem_destroy");
    let raw = sem.as_sem_ptr();
    let args: &[Arg<'_>] = &[("sem", &raw)];
    // SAFETY: initialized; the box is released without a second destroy.
    let rc = g.call(|| unsafe { libc::sem_destroy(raw) });
    let cell = std::mem::ManuallyDrop::new(sem);
    // SAFETY: `cell` is never used again; this only frees the box.
    drop(unsafe { std::ptr::read(&cell.0) });
    g.unit(rc, args)
}

#[track_caller]
pub fn sem_wait(sem: &impl AsSemaphore) -> GuardResult<()> {
    let g = Guard::new("sem_wait");
    let raw = sem.as_sem_ptr();
    // SAFETY: `raw` is a live semaphore.
    let rc = g.call(|| unsafe { libc::sem_wait(raw) });
    g.unit(rc, &[("sem", &raw)])
}

/// `EAGAIN` (count is zero) is benign.
#[track_caller]
pub fn sem_trywait(sem: &impl AsSemaphore) -> GuardResult<()> {
    let g = Guard::new("sem_trywait").suppress(Suppress::WOULD_BLOCK);
    let raw = sem.as_sem_ptr();
    // SAFETY: `raw` is a live semaphore.
    let rc = g.call(|| unsafe { libc::sem_trywait(raw) });
    g.unit(rc, &[("sem", &raw)])
}

/// Wait until the absolute `CLOCK_REALTIME` deadline.
#[track_caller]
pub fn sem_timedwait(sem: &impl AsSemaphore, deadline: &libc::timespec) -> GuardResult<()> {
    let g = Guard::new("sem_timedwait");
    let raw = sem.as_sem_ptr();
    let args: &[Arg<'_>] = &[("sem", &raw), ("sec", &deadline.tv_sec), ("nsec", &deadline.tv_nsec)];
    g.ensure(
        (0..1_000_000_000).contains(&deadline.tv_nsec),
        Severity::Error,
        errno::EINVAL,
        "deadline nanoseconds out of range",
        args,
    )?;
    // SAFETY: `raw` is a live semaphore; `deadline` is valid.
    let rc = g.call(|| unsafe { libc::sem_timedwait(raw, deadline) });
    g.unit(rc, args)
}

#[track_caller]
pub fn sem_post(sem: &impl AsSemaphore) -> GuardResult<()> {
    let g = Guard::new("sem_post");
    let raw = sem.as_sem_ptr();
    // SAFETY: `raw` is a live semaphore.
    let rc = g.call(|| unsafe { libc::sem_post(raw) });
    g.unit(rc, &[("sem", &raw)])
}

#[track_caller]
pub fn sem_getvalue(sem: &impl AsSemaphore) -> GuardResult<c_int> {
    let g = Guard::new("sem_getvalue");
    let raw = sem.as_sem_ptr();
    let mut value = 0;
    // SAFETY: `raw` is a live semaphore; `value` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::sem_getvalue(raw, &mut value) });
    g.unit(rc, &[("sem", &raw)])?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::diag;

    #[test]
    fn unnamed_semaphore_counts() {
        let sem = sem_init(1).unwrap();
        sem_trywait(&sem).unwrap();
        assert_eq!(sem_getvalue(&sem).unwrap(), 0);
        let (r, records) = diag::capture(|| sem_trywait(&sem));
        let err = r.unwrap_err();
        assert!(err.is_would_block());
        assert!(records.is_empty());
        sem_post(&sem).unwrap();
        sem_wait(&sem).unwrap();
        sem_destroy(sem).unwrap();
    }

    #[test]
    fn timedwait_expires() {
        let sem = sem_init(0).unwrap();
        let deadline = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let (r, _) = diag::capture(|| sem_timedwait(&sem, &deadline));
        assert_eq!(r.unwrap_err().errno(), Some(errno::ETIMEDOUT));
    }

    #[test]
    fn anonymous_mapping() {
        let p = mmap(
            std::ptr::null_mut(),
            4096,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
        .unwrap();
        unsafe { p.as_ptr().cast::<u8>().write(7) };
        unsafe { msync(p, 4096, libc::MS_SYNC) }.unwrap();
        unsafe { munmap(p, 4096) }.unwrap();
    }

    #[test]
    fn missing_names_are_benign() {
        let (r, records) = diag::capture(|| {
            (
                shm_unlink(Some(c"/guardlibc-missing-shm")),
                sem_unlink(Some(c"/guardlibc-missing-sem")),
            )
        });
        assert!(r.0.unwrap_err().is_benign());
        assert!(r.1.unwrap_err().is_benign());
        assert!(records.is_empty());
    }

    #[test]
    fn named_semaphore_lifecycle() {
        let name = c"/guardlibc-ipc-test";
        let _ = diag::capture(|| sem_unlink(Some(name)));
        let sem = sem_open(Some(name), libc::O_CREAT | libc::O_EXCL, 0o600, 2).unwrap();
        assert_eq!(sem_getvalue(&sem).unwrap(), 2);
        sem_close(sem).unwrap();
        sem_unlink(Some(name)).unwrap();
    }
}
