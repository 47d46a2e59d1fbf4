//! Signal dispositions, masks and delivery (`<signal.h>`).

use std::ffi::{c_int, c_uint};
use std::mem::MaybeUninit;
use std::ptr;

use guardlibc_core::errno;
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

// Highest signal number on Linux (`_NSIG - 1`).
const MAX_SIGNAL: c_int = 64;

fn valid_signal(sig: c_int) -> bool {
    (1..=MAX_SIGNAL).contains(&sig)
}

fn check_signal(g: &Guard, sig: c_int, args: &[Arg<'_>]) -> GuardResult<()> {
    g.ensure(
        valid_signal(sig),
        Severity::Error,
        errno::EINVAL,
        "signal number out of range",
        args,
    )
}

/// Install `handler` for `sig`; returns the previous disposition.
///
/// # Safety
///
/// `handler` must be `SIG_DFL`, `SIG_IGN`, or the address of an
/// async-signal-safe `extern "C" fn(c_int)`.
#[track_caller]
pub unsafe fn signal(sig: c_int, handler: libc::sighandler_t) -> GuardResult<libc::sighandler_t> {
    let g = Guard::new("signal");
    let args: &[Arg<'_>] = &[("sig", &sig), ("handler", &handler)];
    check_signal(&g, sig, args)?;
    // SAFETY: upheld by the caller.
    let prev = g.call(|| unsafe { libc::signal(sig, handler) });
    if prev == libc::SIG_ERR {
        return Err(g.failure(args));
    }
    Ok(prev)
}

/// Install `act` (or only query when `None`); returns the previous action.
///
/// # Safety
///
/// Any handler in `act` must be async-signal-safe.
#[track_caller]
pub unsafe fn sigaction(sig: c_int, act: Option<&libc::sigaction>) -> GuardResult<libc::sigaction> {
    let g = Guard::new("sigaction");
    let args: &[Arg<'_>] = &[("sig", &sig), ("install", &act.is_some())];
    check_signal(&g, sig, args)?;
    let new = act.map_or(ptr::null(), |a| a as *const _);
    let mut old = MaybeUninit::<libc::sigaction>::uninit();
    // SAFETY: `new` is null or valid; `old` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::sigaction(sig, new, old.as_mut_ptr()) });
    g.unit(rc, args)?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { old.assume_init() })
}

#[track_caller]
pub fn sigemptyset() -> GuardResult<libc::sigset_t> {
    let g = Guard::new("sigemptyset");
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    // SAFETY: `set` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::sigemptyset(set.as_mut_ptr()) });
    g.unit(rc, &[])?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { set.assume_init() })
}

#[track_caller]
pub fn sigfillset() -> GuardResult<libc::sigset_t> {
    let g = Guard::new("sigfillset");
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    // SAFETY: `set` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::sigfillset(set.as_mut_ptr()) });
    g.unit(rc, &[])?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { set.assume_init() })
}

#[track_caller]
pub fn sigaddset(set: &mut libc::sigset_t, sig: c_int) -> GuardResult<()> {
    let g = Guard::new("sigaddset");
    let args: &[Arg<'_>] = &[("sig", &sig)];
    check_signal(&g, sig, args)?;
    // SAFETY: `set` is an initialized set.
    let rc = g.call(|| unsafe { libc::sigaddset(set, sig) });
    g.unit(rc, args)
}

#[track_caller]
pub fn sigdelset(set: &mut libc::sigset_t, sig: c_int) -> GuardResult<()> {
    let g = Guard::new("sigdelset");
    let args: &[Arg<'_>] = &[("sig", &sig)];
    check_signal(&g, sig, args)?;
    // SAFETY: `set` is an initialized set.
    let rc = g.call(|| unsafe { libc::sigdelset(set, sig) });
    g.unit(rc, args)
}

#[must_use]
pub fn sigismember(set: &libc::sigset_t, sig: c_int) -> bool {
    // SAFETY: `set` is an initialized set.
    valid_signal(sig) && unsafe { libc::sigismember(set, sig) } == 1
}

/// Change the calling thread's mask (`SIG_BLOCK`, `SIG_UNBLOCK`,
/// `SIG_SETMASK`); returns the previous mask.
#[track_caller]
pub fn sigprocmask(how: c_int, set: Option<&libc::sigset_t>) -> GuardResult<libc::sigset_t> {
    let g = Guard::new("sigprocmask");
    let args: &[Arg<'_>] = &[("how", &how), ("change", &set.is_some())];
    g.ensure(
        matches!(how, libc::SIG_BLOCK | libc::SIG_UNBLOCK | libc::SIG_SETMASK),
        Severity::Error,
        errno::EINVAL,
        "how is not SIG_BLOCK, SIG_UNBLOCK or SIG_SETMASK",
        args,
    )?;
    let new = set.map_or(ptr::null(), |s| s as *const _);
    let mut old = MaybeUninit::<libc::sigset_t>::uninit();
    // SAFETY: `new` is null or valid; `old` is a valid out-pointer.
    let rc = g.call(|| unsafe { libc::sigprocmask(how, new, old.as_mut_ptr()) });
    g.unit(rc, args)?;
    // SAFETY: initialized by the successful call.
    Ok(unsafe { old.assume_init() })
}

#[track_caller]
pub fn raise(sig: c_int) -> GuardResult<()> {
    let g = Guard::new("raise");
    let args: &[Arg<'_>] = &[("sig", &sig)];
    check_signal(&g, sig, args)?;
    // SAFETY: integer argument only.
    let rc = g.call(|| unsafe { libc::raise(sig) });
    if rc != 0 {
        return Err(g.failure(args));
    }
    Ok(())
}

/// Schedule `SIGALRM`; returns the seconds left on the previous alarm.
#[must_use]
pub fn alarm(seconds: c_uint) -> c_uint {
    // SAFETY: integer argument only.
    unsafe { libc::alarm(seconds) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardlibc_membrane::diag;

    #[test]
    fn set_membership() {
        let mut set = sigemptyset().unwrap();
        assert!(!sigismember(&set, libc::SIGUSR1));
        sigaddset(&mut set, libc::SIGUSR1).unwrap();
        assert!(sigismember(&set, libc::SIGUSR1));
        sigdelset(&mut set, libc::SIGUSR1).unwrap();
        assert!(!sigismember(&set, libc::SIGUSR1));
        assert!(sigismember(&sigfillset().unwrap(), libc::SIGTERM));
    }

    #[test]
    fn out_of_range_signal_is_rejected() {
        let mut set = sigemptyset().unwrap();
        let (r, records) = diag::capture(|| sigaddset(&mut set, 0));
        assert_eq!(r.unwrap_err().errno(), Some(errno::EINVAL));
        assert_eq!(records[0].level, Severity::Error);
    }

    #[test]
    fn ignored_signal_can_be_raised() {
        let prev = unsafe { signal(libc::SIGUSR2, libc::SIG_IGN) }.unwrap();
        raise(libc::SIGUSR2).unwrap();
        unsafe { signal(libc::SIGUSR2, prev) }.unwrap();
    }

    #[test]
    fn query_current_action_and_mask() {
        let current = unsafe { sigaction(libc::SIGTERM, None) }.unwrap();
        assert_eq!(current.sa_sigaction, libc::SIG_DFL);
        let mask = sigprocmask(libc::SIG_BLOCK, None).unwrap();
        assert!(!sigismember(&mask, libc::SIGKILL));
        assert_eq!(alarm(0), 0);
    }
}
