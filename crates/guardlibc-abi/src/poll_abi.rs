//! Descriptor multiplexing (`poll`, `select`).

use std::ffi::c_int;
use std::ptr;

use guardlibc_core::{Suppress, errno};
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

/// Wait for events on `fds`; returns the number of ready entries.
/// `EINTR` is benign.
#[track_caller]
pub fn poll(fds: &mut [libc::pollfd], timeout_ms: c_int) -> GuardResult<usize> {
    let g = Guard::new("poll").suppress(Suppress::INTERRUPTED);
    let nfds = fds.len();
    let args: &[Arg<'_>] = &[("nfds", &nfds), ("timeout_ms", &timeout_ms)];
    let count = libc::nfds_t::try_from(nfds);
    g.ensure(
        count.is_ok(),
        Severity::Warn,
        errno::EINVAL,
        "too many descriptors",
        args,
    )?;
    let n = count.unwrap_or_default();
    // SAFETY: `fds` covers `n` entries.
    let rc = g.call(|| unsafe { libc::poll(fds.as_mut_ptr(), n, timeout_ms) });
    g.int(rc, args).map(|ready| ready as usize)
}

/// `select` over optional sets; `nfds` must lie within `0..=FD_SETSIZE`.
#[track_caller]
pub fn select(
    nfds: c_int,
    read: Option<&mut libc::fd_set>,
    write: Option<&mut libc::fd_set>,
    except: Option<&mut libc::fd_set>,
    timeout: Option<&mut libc::timeval>,
) -> GuardResult<usize> {
    let g = Guard::new("select");
    let args: &[Arg<'_>] = &[("nfds", &nfds)];
    g.ensure(
        (0..=libc::FD_SETSIZE as c_int).contains(&nfds),
        Severity::Error,
        errno::EINVAL,
        "nfds outside 0..=FD_SETSIZE",
        args,
    )?;
    let read = read.map_or(ptr::null_mut(), |s| s as *mut _);
    let write = write.map_or(ptr::null_mut(), |s| s as *mut _);
    let except = except.map_or(ptr::null_mut(), |s| s as *mut _);
    let timeout = timeout.map_or(ptr::null_mut(), |t| t as *mut _);
    // SAFETY: every pointer is null or an exclusive borrow.
    let rc = g.call(|| unsafe { libc::select(nfds, read, write, except, timeout) });
    g.int(rc, args).map(|ready| ready as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unistd_abi::{close, pipe, write};

    #[test]
    fn pipe_becomes_readable() {
        let [r, w] = pipe().unwrap();
        let mut fds = [libc::pollfd {
            fd: r,
            events: libc::POLLIN,
            revents: 0,
        }];
        assert_eq!(poll(&mut fds, 0).unwrap(), 0);
        write(w, b"x", 1).unwrap();
        assert_eq!(poll(&mut fds, 1000).unwrap(), 1);
        assert_ne!(fds[0].revents & libc::POLLIN, 0);
        close(r).unwrap();
        close(w).unwrap();
    }

    #[test]
    fn select_with_timeout_only() {
        let mut tv = libc::timeval {
            tv_sec: 0,
            tv_usec: 1000,
        };
        assert_eq!(select(0, None, None, None, Some(&mut tv)).unwrap(), 0);
    }

    #[test]
    fn select_rejects_oversized_nfds() {
        let (r, _) = guardlibc_membrane::diag::capture(|| select(-1, None, None, None, None));
        assert!(r.is_err());
    }
}
