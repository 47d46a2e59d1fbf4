//! Process control, environment and resource limits.
//!
//! `wait`/`waitpid` treat `ECHILD` as benign: having no children to reap is
//! an answer, not a fault.

use std::convert::Infallible;
use std::ffi::{CStr, CString, c_char, c_int};
use std::mem::MaybeUninit;
use std::ptr;

use guardlibc_core::{Suppress, errno};
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

/// Child pid and raw wait status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus {
    pub pid: libc::pid_t,
    pub status: c_int,
}

impl WaitStatus {
    /// Exit code when the child exited normally.
    #[must_use]
    pub fn exit_code(&self) -> Option<c_int> {
        libc::WIFEXITED(self.status).then(|| libc::WEXITSTATUS(self.status))
    }

    /// Terminating signal when the child was killed.
    #[must_use]
    pub fn signal(&self) -> Option<c_int> {
        libc::WIFSIGNALED(self.status).then(|| libc::WTERMSIG(self.status))
    }
}

/// Returns `0` in the child and the child's pid in the parent.
///
/// # Safety
///
/// In a multithreaded parent the child may only call async-signal-safe
/// functions before `exec` or `_exit`.
#[track_caller]
pub unsafe fn fork() -> GuardResult<libc::pid_t> {
    let g = Guard::new("fork");
    // SAFETY: upheld by the caller.
    let pid = g.call(|| unsafe { libc::fork() });
    g.int(pid, &[])
}

#[track_caller]
pub fn wait() -> GuardResult<WaitStatus> {
    let g = Guard::new("wait").suppress(Suppress::NO_CHILD);
    let mut status = 0;
    // SAFETY: `status` is a valid out-pointer.
    let pid = g.call(|| unsafe { libc::wait(&mut status) });
    let pid = g.int(pid, &[])?;
    Ok(WaitStatus { pid, status })
}

/// With `WNOHANG` and no state change the returned pid is `0`.
#[track_caller]
pub fn waitpid(pid: libc::pid_t, options: c_int) -> GuardResult<WaitStatus> {
    let g = Guard::new("waitpid").suppress(Suppress::NO_CHILD);
    let args: &[Arg<'_>] = &[("pid", &pid), ("options", &options)];
    let mut status = 0;
    // SAFETY: `status` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::waitpid(pid, &mut status, options) });
    let pid = g.int(rc, args)?;
    Ok(WaitStatus { pid, status })
}

#[track_caller]
pub fn kill(pid: libc::pid_t, sig: c_int) -> GuardResult<()> {
    let g = Guard::new("kill");
    let args: &[Arg<'_>] = &[("pid", &pid), ("sig", &sig)];
    g.ensure(sig >= 0, Severity::Error, errno::EINVAL, "negative signal number", args)?;
    // SAFETY: integer arguments only.
    let rc = g.call(|| unsafe { libc::kill(pid, sig) });
    g.unit(rc, args)
}

#[must_use]
pub fn getpid() -> libc::pid_t {
    // SAFETY: always succeeds.
    unsafe { libc::getpid() }
}

#[must_use]
pub fn getppid() -> libc::pid_t {
    // SAFETY: always succeeds.
    unsafe { libc::getppid() }
}

#[track_caller]
pub fn setsid() -> GuardResult<libc::pid_t> {
    let g = Guard::new("setsid");
    // SAFETY: no arguments.
    let sid = g.call(|| unsafe { libc::setsid() });
    g.int(sid, &[])
}

/// Replace the process image. Returns only on failure.
#[track_caller]
pub fn execvp(file: Option<&CStr>, argv: &[&CStr]) -> GuardResult<Infallible> {
    let g = Guard::new("execvp");
    let args: &[Arg<'_>] = &[("file", &file), ("argv", &argv)];
    let file = g.string(file, "file is null or empty", args)?;
    let mut ptrs: Vec<*const c_char> = argv.iter().map(|a| a.as_ptr()).collect();
    ptrs.push(ptr::null());
    // SAFETY: `file` and every argv entry are terminated; `ptrs` ends in null.
    g.call(|| unsafe { libc::execvp(file.as_ptr(), ptrs.as_ptr()) });
    Err(g.failure(args))
}

/// Run `command` through `/bin/sh`; returns its wait status. With `None`,
/// reports whether a shell is available (nonzero when it is).
#[track_caller]
pub fn system(command: Option<&CStr>) -> GuardResult<c_int> {
    let g = Guard::new("system");
    let args: &[Arg<'_>] = &[("command", &command)];
    if let Some(command) = command {
        g.string(Some(command), "command is empty", args)?;
    }
    let p = command.map_or(ptr::null(), CStr::as_ptr);
    // SAFETY: null or a terminated command.
    let rc = g.call(|| unsafe { libc::system(p) });
    g.int(rc, args)
}

/// Terminate the process after running `atexit` handlers.
pub fn exit(status: c_int) -> ! {
    // SAFETY: does not return.
    unsafe { libc::exit(status) }
}

/// Copy of the variable's value, or `None` when unset.
#[track_caller]
pub fn getenv(name: Option<&CStr>) -> GuardResult<Option<CString>> {
    let g = Guard::new("getenv");
    let args: &[Arg<'_>] = &[("name", &name)];
    let name = g.string(name, "name is null or empty", args)?;
    // SAFETY: `name` is terminated; the value is copied out immediately.
    let value = g.call(|| unsafe {
        let p = libc::getenv(name.as_ptr());
        (!p.is_null()).then(|| CStr::from_ptr(p).to_owned())
    });
    Ok(value)
}

fn env_name<'a>(g: &Guard, name: Option<&'a CStr>, args: &[Arg<'_>]) -> GuardResult<&'a CStr> {
    let name = g.string(name, "name is null or empty", args)?;
    g.ensure(
        !name.to_bytes().contains(&b'='),
        Severity::Error,
        errno::EINVAL,
        "name contains '='",
        args,
    )?;
    Ok(name)
}

#[track_caller]
pub fn setenv(name: Option<&CStr>, value: Option<&CStr>, overwrite: bool) -> GuardResult<()> {
    let g = Guard::new("setenv");
    let args: &[Arg<'_>] = &[("name", &name), ("value", &value), ("overwrite", &overwrite)];
    let name = env_name(&g, name, args)?;
    let value = g.required(value, "value is null", args)?;
    // SAFETY: both strings are terminated.
    let rc = g.call(|| unsafe {
        libc::setenv(name.as_ptr(), value.as_ptr(), c_int::from(overwrite))
    });
    g.unit(rc, args)
}

#[track_caller]
pub fn unsetenv(name: Option<&CStr>) -> GuardResult<()> {
    let g = Guard::new("unsetenv");
    let args: &[Arg<'_>] = &[("name", &name)];
    let name = env_name(&g, name, args)?;
    // SAFETY: `name` is terminated.
    let rc = g.call(|| unsafe { libc::unsetenv(name.as_ptr()) });
    g.unit(rc, args)
}

#[track_caller]
pub fn getrlimit(resource: c_int) -> GuardResult<libc::rlimit> {
    let g = Guard::new("getrlimit");
    let args: &[Arg<'_>] = &[("resource", &resource)];
    let mut lim = MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: `lim` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::getrlimit(resource as _, lim.as_mut_ptr()) });
    g.unit(rc, args)?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { lim.assume_init() })
}

#[track_caller]
pub fn setrlimit(resource: c_int, limit: &libc::rlimit) -> GuardResult<()> {
    let g = Guard::new("setrlimit");
    let args: &[Arg<'_>] = &[
        ("resource", &resource),
        ("cur", &limit.rlim_cur),
        ("max", &limit.rlim_max),
    ];
    g.ensure(
        limit.rlim_cur <= limit.rlim_max,
        Severity::Error,
        errno::EINVAL,
        "soft limit exceeds hard limit",
        args,
    )?;
    // SAFETY: `limit` is a valid pointer.
    let rc = g.call(|| unsafe { libc::setrlimit(resource as _, limit) });
    g.unit(rc, args)
}
