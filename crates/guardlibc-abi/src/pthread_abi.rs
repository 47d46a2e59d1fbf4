//! Threads, mutexes, condition variables and thread-specific keys.
//!
//! pthread functions return an errno-style code instead of setting errno.
//! The wrappers classify that code like any other failure but leave errno
//! untouched.

use std::cell::UnsafeCell;
use std::ffi::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use guardlibc_core::errno;
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

type Entry = Box<dyn FnOnce() + Send + 'static>;

// Distinct from null (normal return) and PTHREAD_CANCELED (-1).
static PANICKED: u8 = 0;

extern "C" fn trampoline(arg: *mut c_void) -> *mut c_void {
    // SAFETY: `arg` came from Box::into_raw in pthread_create and is
    // reclaimed exactly once.
    let entry = unsafe { Box::from_raw(arg.cast::<Entry>()) };
    match panic::catch_unwind(AssertUnwindSafe(entry)) {
        Ok(()) => ptr::null_mut(),
        Err(_) => ptr::addr_of!(PANICKED).cast_mut().cast(),
    }
}

/// How a joined thread finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadExit {
    Returned,
    Panicked,
    Canceled,
}

/// Joinable thread from [`pthread_create`]. Dropping it without
/// [`pthread_join`] detaches the thread.
#[derive(Debug)]
pub struct ThreadHandle(libc::pthread_t);

impl ThreadHandle {
    #[must_use]
    pub fn id(&self) -> libc::pthread_t {
        self.0
    }

    fn into_raw(self) -> libc::pthread_t {
        let id = self.0;
        std::mem::forget(self);
        id
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        // SAFETY: the thread was neither joined nor detached.
        unsafe { libc::pthread_detach(self.0) };
    }
}

/// Start a thread running `f`.
///
/// Cancelling the thread while it runs Rust frames is not supported; cancel
/// only threads parked outside `f`.
#[track_caller]
pub fn pthread_create<F>(f: F) -> GuardResult<ThreadHandle>
where
    F: FnOnce() + Send + 'static,
{
    let g = Guard::new("pthread_create");
    let entry: Box<Entry> = Box::new(Box::new(f));
    let arg = Box::into_raw(entry).cast::<c_void>();
    let mut id = 0 as libc::pthread_t;
    // SAFETY: default attributes; `arg` is handed to `trampoline`.
    let rc = g.call(|| unsafe { libc::pthread_create(&mut id, ptr::null(), trampoline, arg) });
    if rc != 0 {
        // SAFETY: the thread never started, so `arg` is still ours.
        drop(unsafe { Box::from_raw(arg.cast::<Entry>()) });
        return Err(g.returned(rc, &[]));
    }
    Ok(ThreadHandle(id))
}

#[track_caller]
pub fn pthread_join(thread: Option<ThreadHandle>) -> GuardResult<ThreadExit> {
    let g = Guard::new("pthread_join");
    let thread = g.required(thread, "no thread handle", &[])?.into_raw();
    let args: &[Arg<'_>] = &[("thread", &thread)];
    let mut value = ptr::null_mut();
    // SAFETY: `thread` is joinable and is joined once.
    let rc = g.call(|| unsafe { libc::pthread_join(thread, &mut value) });
    g.status(rc, args)?;
    Ok(if value.is_null() {
        ThreadExit::Returned
    } else if value == crate::ffi::PTHREAD_CANCELED {
        ThreadExit::Canceled
    } else {
        ThreadExit::Panicked
    })
}

#[track_caller]
pub fn pthread_detach(thread: Option<ThreadHandle>) -> GuardResult<()> {
    let g = Guard::new("pthread_detach");
    let thread = g.required(thread, "no thread handle", &[])?.into_raw();
    let args: &[Arg<'_>] = &[("thread", &thread)];
    // SAFETY: `thread` is joinable and is released once.
    let rc = g.call(|| unsafe { libc::pthread_detach(thread) });
    g.status(rc, args)
}

/// Request cancellation; the handle stays joinable.
///
/// # Safety
///
/// Cancellation unwinds the target with a forced unwind that Rust frames
/// cannot catch. The target must only reach cancellation points outside
/// Rust code holding live destructors or `catch_unwind` scopes, or be
/// finished already; otherwise the process aborts.
#[track_caller]
pub unsafe fn pthread_cancel(thread: Option<&ThreadHandle>) -> GuardResult<()> {
    let g = Guard::new("pthread_cancel");
    let thread = g.required(thread, "no thread handle", &[])?.0;
    let args: &[Arg<'_>] = &[("thread", &thread)];
    // SAFETY: `thread` has not been joined.
    let rc = g.call(|| unsafe { libc::pthread_cancel(thread) });
    g.status(rc, args)
}

#[must_use]
pub fn pthread_self() -> libc::pthread_t {
    // SAFETY: always succeeds.
    unsafe { libc::pthread_self() }
}

#[must_use]
pub fn pthread_equal(a: libc::pthread_t, b: libc::pthread_t) -> bool {
    // SAFETY: pure comparison.
    unsafe { libc::pthread_equal(a, b) != 0 }
}

// ---------------------------------------------------------------------------
// Mutexes
// ---------------------------------------------------------------------------

/// Heap-pinned `pthread_mutex_t`; destroyed on drop if not passed to
/// [`pthread_mutex_destroy`].
pub struct Mutex(Box<UnsafeCell<libc::pthread_mutex_t>>);

// SAFETY: pthread mutexes are designed to be shared between threads.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Mutex").field(&self.0.get()).finish()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        // SAFETY: initialized and destroyed once.
        unsafe { libc::pthread_mutex_destroy(self.0.get()) };
    }
}

/// Initialize a mutex of the given type (`PTHREAD_MUTEX_NORMAL`,
/// `PTHREAD_MUTEX_ERRORCHECK`, `PTHREAD_MUTEX_RECURSIVE`).
#[track_caller]
pub fn pthread_mutex_init(kind: c_int) -> GuardResult<Mutex> {
    let g = Guard::new("pthread_mutex_init");
    let args: &[Arg<'_>] = &[("kind", &kind)];
    g.ensure(
        matches!(
            kind,
            libc::PTHREAD_MUTEX_NORMAL | libc::PTHREAD_MUTEX_ERRORCHECK | libc::PTHREAD_MUTEX_RECURSIVE
        ),
        Severity::Error,
        errno::EINVAL,
        "unknown mutex type",
        args,
    )?;
    let cell = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
    // SAFETY: the attribute object lives for the whole block; `cell` is
    // writable and stays at this address.
    let rc = g.call(|| unsafe {
        let mut attr = std::mem::MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        let rc = libc::pthread_mutexattr_init(attr.as_mut_ptr());
        if rc != 0 {
            return rc;
        }
        let mut rc = libc::pthread_mutexattr_settype(attr.as_mut_ptr(), kind);
        if rc == 0 {
            rc = libc::pthread_mutex_init(cell.get(), attr.as_ptr());
        }
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        rc
    });
    g.status(rc, args)?;
    Ok(Mutex(cell))
}

#[track_caller]
pub fn pthread_mutex_lock(mutex: &Mutex) -> GuardResult<()> {
    let g = Guard::new("pthread_mutex_lock");
    let raw = mutex.0.get();
    // SAFETY: `raw` is an initialized mutex.
    let rc = g.call(|| unsafe { libc::pthread_mutex_lock(raw) });
    g.status(rc, &[("mutex", &raw)])
}

/// `EBUSY` when another thread holds the lock.
#[track_caller]
pub fn pthread_mutex_trylock(mutex: &Mutex) -> GuardResult<()> {
    let g = Guard::new("pthread_mutex_trylock");
    let raw = mutex.0.get();
    // SAFETY: `raw` is an initialized mutex.
    let rc = g.call(|| unsafe { libc::pthread_mutex_trylock(raw) });
    g.status(rc, &[("mutex", &raw)])
}

#[track_caller]
pub fn pthread_mutex_unlock(mutex: &Mutex) -> GuardResult<()> {
    let g = Guard::new("pthread_mutex_unlock");
    let raw = mutex.0.get();
    // SAFETY: `raw` is an initialized mutex.
    let rc = g.call(|| unsafe { libc::pthread_mutex_unlock(raw) });
    g.status(rc, &[("mutex", &raw)])
}

#[track_caller]
pub fn pthread_mutex_destroy(mutex: Mutex) -> GuardResult<()> {
    let g = Guard::new("pthread_mutex_destroy");
    let raw = mutex.0.get();
    // SAFETY: `raw` is initialized; the box is freed without a second destroy.
    let rc = g.call(|| unsafe { libc::pthread_mutex_destroy(raw) });
    let cell = std::mem::ManuallyDrop::new(mutex);
    // SAFETY: `cell` is never used again; this only frees the box.
    drop(unsafe { ptr::read(&cell.0) });
    g.status(rc, &[("mutex", &raw)])
}

// ---------------------------------------------------------------------------
// Condition variables
// ---------------------------------------------------------------------------

/// Heap-pinned `pthread_cond_t` using `CLOCK_REALTIME` deadlines.
pub struct Cond(Box<UnsafeCell<libc::pthread_cond_t>>);

// SAFETY: condition variables are designed to be shared between threads.
unsafe impl Send for Cond {}
unsafe impl Sync for Cond {}

impl std::fmt::Debug for Cond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cond").field(&self.0.get()).finish()
    }
}

impl Drop for Cond {
    fn drop(&mut self) {
        // SAFETY: initialized and destroyed once.
        unsafe { libc::pthread_cond_destroy(self.0.get()) };
    }
}

#[track_caller]
pub fn pthread_cond_init() -> GuardResult<Cond> {
    let g = Guard::new("pthread_cond_init");
    let cell = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
    // SAFETY: `cell` is writable; default attributes.
    let rc = g.call(|| unsafe { libc::pthread_cond_init(cell.get(), ptr::null()) });
    g.status(rc, &[])?;
    Ok(Cond(cell))
}

/// `mutex` must be locked by the caller.
#[track_caller]
pub fn pthread_cond_wait(cond: &Cond, mutex: &Mutex) -> GuardResult<()> {
    let g = Guard::new("pthread_cond_wait");
    let (c, m) = (cond.0.get(), mutex.0.get());
    // SAFETY: both objects are initialized.
    let rc = g.call(|| unsafe { libc::pthread_cond_wait(c, m) });
    g.status(rc, &[("cond", &c), ("mutex", &m)])
}

/// As [`pthread_cond_wait`] with an absolute `CLOCK_REALTIME` deadline;
/// `ETIMEDOUT` once it passes.
#[track_caller]
pub fn pthread_cond_timedwait(cond: &Cond, mutex: &Mutex, deadline: &libc::timespec) -> GuardResult<()> {
    let g = Guard::new("pthread_cond_timedwait");
    let (c, m) = (cond.0.get(), mutex.0.get());
    let args: &[Arg<'_>] = &[
        ("cond", &c),
        ("sec", &deadline.tv_sec),
        ("nsec", &deadline.tv_nsec),
    ];
    g.ensure(
        (0..1_000_000_000).contains(&deadline.tv_nsec),
        Severity::Error,
        errno::EINVAL,
        "deadline nanoseconds out of range",
        args,
    )?;
    // SAFETY: both objects are initialized; `deadline` is valid.
    let rc = g.call(|| unsafe { libc::pthread_cond_timedwait(c, m, deadline) });
    g.status(rc, args)
}

#[track_caller]
pub fn pthread_cond_signal(cond: &Cond) -> GuardResult<()> {
    let g = Guard::new("pthread_cond_signal");
    let c = cond.0.get();
    // SAFETY: `c` is initialized.
    let rc = g.call(|| unsafe { libc::pthread_cond_signal(c) });
    g.status(rc, &[("cond", &c)])
}

#[track_caller]
pub fn pthread_cond_broadcast(cond: &Cond) -> GuardResult<()> {
    let g = Guard::new("pthread_cond_broadcast");
    let c = cond.0.get();
    // SAFETY: `c` is initialized.
    let rc = g.call(|| unsafe { libc::pthread_cond_broadcast(c) });
    g.status(rc, &[("cond", &c)])
}

#[track_caller]
pub fn pthread_cond_destroy(cond: Cond) -> GuardResult<()> {
    let g = Guard::new("pthread_cond_destroy");
    let c = cond.0.get();
    // SAFETY: `c` is initialized; the box is freed without a second destroy.
    let rc = g.call(|| unsafe { libc::pthread_cond_destroy(c) });
    let cell = std::mem::ManuallyDrop::new(cond);
    // SAFETY: `cell` is never used again; this only frees the box.
    drop(unsafe { ptr::read(&cell.0) });
    g.status(rc, &[("cond", &c)])
}

// ---------------------------------------------------------------------------
// Thread-specific data
// ---------------------------------------------------------------------------

/// Thread-specific data key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key(libc::pthread_key_t);

#[track_caller]
pub fn pthread_key_create(destructor: Option<unsafe extern "C" fn(*mut c_void)>) -> GuardResult<Key> {
    let g = Guard::new("pthread_key_create");
    let args: &[Arg<'_>] = &[("destructor", &destructor.is_some())];
    let mut key = 0;
    // SAFETY: `key` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::pthread_key_create(&mut key, destructor) });
    g.status(rc, args)?;
    Ok(Key(key))
}

#[track_caller]
pub fn pthread_key_delete(key: Key) -> GuardResult<()> {
    let g = Guard::new("pthread_key_delete");
    // SAFETY: integer argument only.
    let rc = g.call(|| unsafe { libc::pthread_key_delete(key.0) });
    g.status(rc, &[("key", &key.0)])
}

#[track_caller]
pub fn pthread_setspecific(key: Key, value: *const c_void) -> GuardResult<()> {
    let g = Guard::new("pthread_setspecific");
    // SAFETY: the value is stored, not dereferenced.
    let rc = g.call(|| unsafe { libc::pthread_setspecific(key.0, value) });
    g.status(rc, &[("key", &key.0), ("value", &value)])
}

/// Null when no value is set for this thread.
#[must_use]
pub fn pthread_getspecific(key: Key) -> *mut c_void {
    // SAFETY: integer argument only.
    unsafe { libc::pthread_getspecific(key.0) }
}
