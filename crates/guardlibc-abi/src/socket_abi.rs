//! Sockets, address conversion and name resolution.
//!
//! Non-blocking sockets report `EAGAIN` from `accept`/`send*`/`recv*` and
//! `EINPROGRESS` from `connect`; those are returned without a diagnostic.

use std::ffi::{CStr, CString, c_int};
use std::fmt;
use std::mem::{self, MaybeUninit};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::ptr::{self, NonNull};

use guardlibc_core::{Suppress, errno};
use guardlibc_membrane::{GuardResult, Severity};

use crate::guard::{Arg, Guard};

// ---------------------------------------------------------------------------
// Socket addresses
// ---------------------------------------------------------------------------

/// Socket address of any family, stored in a `sockaddr_storage`.
#[derive(Clone, Copy)]
pub struct SockAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

impl SockAddr {
    fn empty() -> Self {
        Self {
            // SAFETY: all-zero is a valid sockaddr_storage.
            storage: unsafe { mem::zeroed() },
            len: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    /// Copy `len` bytes of a raw address.
    ///
    /// # Safety
    ///
    /// `addr` must be readable for `len` bytes.
    #[must_use]
    pub unsafe fn from_raw(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
        if addr.is_null() || len as usize > mem::size_of::<libc::sockaddr_storage>() {
            return None;
        }
        let mut out = Self::empty();
        // SAFETY: bounded by the storage size checked above.
        unsafe {
            ptr::copy_nonoverlapping(
                addr.cast::<u8>(),
                (&raw mut out.storage).cast::<u8>(),
                len as usize,
            );
        }
        out.len = len;
        Some(out)
    }

    /// `AF_UNIX` address for `path`; `None` when the path does not fit.
    #[must_use]
    pub fn unix(path: &CStr) -> Option<Self> {
        let bytes = path.to_bytes_with_nul();
        let mut out = Self::empty();
        // SAFETY: sockaddr_un fits inside sockaddr_storage.
        let un = unsafe { &mut *(&raw mut out.storage).cast::<libc::sockaddr_un>() };
        if bytes.len() > un.sun_path.len() {
            return None;
        }
        un.sun_family = libc::AF_UNIX as libc::sa_family_t;
        for (dst, &src) in un.sun_path.iter_mut().zip(bytes) {
            *dst = src as libc::c_char;
        }
        out.len = (mem::size_of::<libc::sa_family_t>() + bytes.len()) as libc::socklen_t;
        Some(out)
    }

    #[must_use]
    pub fn family(&self) -> c_int {
        c_int::from(self.storage.ss_family)
    }

    #[must_use]
    pub fn len(&self) -> libc::socklen_t {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const libc::sockaddr {
        (&raw const self.storage).cast()
    }

    /// IPv4/IPv6 view of the address.
    #[must_use]
    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self.family() {
            libc::AF_INET => {
                // SAFETY: family tag says sockaddr_in.
                let sin = unsafe { &*(&raw const self.storage).cast::<libc::sockaddr_in>() };
                Some(SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
                    u16::from_be(sin.sin_port),
                )))
            }
            libc::AF_INET6 => {
                // SAFETY: family tag says sockaddr_in6.
                let sin6 = unsafe { &*(&raw const self.storage).cast::<libc::sockaddr_in6>() };
                Some(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                )))
            }
            _ => None,
        }
    }
}

impl From<SocketAddr> for SockAddr {
    fn from(addr: SocketAddr) -> Self {
        let mut out = Self::empty();
        match addr {
            SocketAddr::V4(v4) => {
                // SAFETY: sockaddr_in fits inside sockaddr_storage.
                let sin = unsafe { &mut *(&raw mut out.storage).cast::<libc::sockaddr_in>() };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = v4.port().to_be();
                sin.sin_addr.s_addr = u32::from(*v4.ip()).to_be();
                out.len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            }
            SocketAddr::V6(v6) => {
                // SAFETY: sockaddr_in6 fits inside sockaddr_storage.
                let sin6 = unsafe { &mut *(&raw mut out.storage).cast::<libc::sockaddr_in6>() };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = v6.port().to_be();
                sin6.sin6_addr.s6_addr = v6.ip().octets();
                sin6.sin6_flowinfo = v6.flowinfo();
                sin6.sin6_scope_id = v6.scope_id();
                out.len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
            }
        }
        out
    }
}

impl fmt::Debug for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_socket_addr() {
            Some(addr) => write!(f, "{addr}"),
            None => write!(f, "SockAddr(family={}, len={})", self.family(), self.len),
        }
    }
}

// ---------------------------------------------------------------------------
// Socket calls
// ---------------------------------------------------------------------------

#[track_caller]
pub fn socket(domain: c_int, ty: c_int, protocol: c_int) -> GuardResult<RawFd> {
    let g = Guard::new("socket");
    let args: &[Arg<'_>] = &[("domain", &domain), ("type", &ty), ("protocol", &protocol)];
    // SAFETY: integer arguments only.
    let fd = g.call(|| unsafe { libc::socket(domain, ty, protocol) });
    g.int(fd, args)
}

#[track_caller]
pub fn socketpair(domain: c_int, ty: c_int, protocol: c_int) -> GuardResult<[RawFd; 2]> {
    let g = Guard::new("socketpair");
    let args: &[Arg<'_>] = &[("domain", &domain), ("type", &ty), ("protocol", &protocol)];
    let mut fds = [-1; 2];
    // SAFETY: `fds` has room for two descriptors.
    let rc = g.call(|| unsafe { libc::socketpair(domain, ty, protocol, fds.as_mut_ptr()) });
    g.unit(rc, args)?;
    Ok(fds)
}

#[track_caller]
pub fn bind(fd: RawFd, addr: Option<&SockAddr>) -> GuardResult<()> {
    let g = Guard::new("bind");
    let args: &[Arg<'_>] = &[("fd", &fd), ("addr", &addr)];
    g.fd(fd, args)?;
    let addr = g.required(addr, "address is null", args)?;
    // SAFETY: `addr` covers `len` bytes.
    let rc = g.call(|| unsafe { libc::bind(fd, addr.as_ptr(), addr.len()) });
    g.unit(rc, args)
}

#[track_caller]
pub fn listen(fd: RawFd, backlog: c_int) -> GuardResult<()> {
    let g = Guard::new("listen");
    let args: &[Arg<'_>] = &[("fd", &fd), ("backlog", &backlog)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::listen(fd, backlog) });
    g.unit(rc, args)
}

/// Accept one connection. `EAGAIN` is benign.
#[track_caller]
pub fn accept(fd: RawFd) -> GuardResult<(RawFd, SockAddr)> {
    let g = Guard::new("accept").suppress(Suppress::WOULD_BLOCK);
    let args: &[Arg<'_>] = &[("fd", &fd)];
    g.fd(fd, args)?;
    let mut peer = SockAddr::empty();
    // SAFETY: `peer` is a sockaddr_storage with its size in `len`.
    let conn = g.call(|| unsafe {
        libc::accept(fd, (&raw mut peer.storage).cast(), &mut peer.len)
    });
    let conn = g.int(conn, args)?;
    Ok((conn, peer))
}

/// Connect `fd` to `addr`. `EINPROGRESS` is benign.
#[track_caller]
pub fn connect(fd: RawFd, addr: Option<&SockAddr>) -> GuardResult<()> {
    let g = Guard::new("connect").suppress(Suppress::IN_PROGRESS);
    let args: &[Arg<'_>] = &[("fd", &fd), ("addr", &addr)];
    g.fd(fd, args)?;
    let addr = g.required(addr, "address is null", args)?;
    // SAFETY: `addr` covers `len` bytes.
    let rc = g.call(|| unsafe { libc::connect(fd, addr.as_ptr(), addr.len()) });
    g.unit(rc, args)
}

/// `EAGAIN` is benign; short sends are returned as `Ok(n)`.
#[track_caller]
pub fn send(fd: RawFd, buf: &[u8], count: usize, flags: c_int) -> GuardResult<usize> {
    let g = Guard::new("send").suppress(Suppress::WOULD_BLOCK);
    let args: &[Arg<'_>] = &[("fd", &fd), ("count", &count), ("flags", &flags)];
    g.fd(fd, args)?;
    g.fits(count, buf.len(), "count exceeds buffer length", args)?;
    // SAFETY: `buf` is readable for `count` bytes.
    let n = g.call(|| unsafe { libc::send(fd, buf.as_ptr().cast(), count, flags) });
    let n = g.count(n, args)?;
    g.transfer(count, n, args);
    Ok(n)
}

/// `EAGAIN` is benign.
#[track_caller]
pub fn sendto(
    fd: RawFd,
    buf: &[u8],
    count: usize,
    flags: c_int,
    addr: Option<&SockAddr>,
) -> GuardResult<usize> {
    let g = Guard::new("sendto").suppress(Suppress::WOULD_BLOCK);
    let args: &[Arg<'_>] = &[("fd", &fd), ("count", &count), ("flags", &flags), ("addr", &addr)];
    g.fd(fd, args)?;
    g.fits(count, buf.len(), "count exceeds buffer length", args)?;
    let (dest, dest_len) = addr.map_or((ptr::null(), 0), |a| (a.as_ptr(), a.len()));
    // SAFETY: `buf` is readable for `count` bytes; `dest` is null or sized.
    let n = g.call(|| unsafe {
        libc::sendto(fd, buf.as_ptr().cast(), count, flags, dest, dest_len)
    });
    let n = g.count(n, args)?;
    g.transfer(count, n, args);
    Ok(n)
}

/// `EAGAIN` is benign; `Ok(0)` is an orderly shutdown by the peer.
#[track_caller]
pub fn recv(fd: RawFd, buf: &mut [u8], count: usize, flags: c_int) -> GuardResult<usize> {
    let g = Guard::new("recv").suppress(Suppress::WOULD_BLOCK);
    let args: &[Arg<'_>] = &[("fd", &fd), ("count", &count), ("flags", &flags)];
    g.fd(fd, args)?;
    g.fits(count, buf.len(), "count exceeds buffer length", args)?;
    // SAFETY: `buf` is writable for `count` bytes.
    let n = g.call(|| unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), count, flags) });
    let n = g.count(n, args)?;
    g.transfer(count, n, args);
    Ok(n)
}

/// `EAGAIN` is benign.
#[track_caller]
pub fn recvfrom(
    fd: RawFd,
    buf: &mut [u8],
    count: usize,
    flags: c_int,
) -> GuardResult<(usize, SockAddr)> {
    let g = Guard::new("recvfrom").suppress(Suppress::WOULD_BLOCK);
    let args: &[Arg<'_>] = &[("fd", &fd), ("count", &count), ("flags", &flags)];
    g.fd(fd, args)?;
    g.fits(count, buf.len(), "count exceeds buffer length", args)?;
    let mut from = SockAddr::empty();
    // SAFETY: `buf` is writable for `count` bytes; `from` is sized storage.
    let n = g.call(|| unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr().cast(),
            count,
            flags,
            (&raw mut from.storage).cast(),
            &mut from.len,
        )
    });
    let n = g.count(n, args)?;
    g.transfer(count, n, args);
    Ok((n, from))
}

#[track_caller]
pub fn shutdown(fd: RawFd, how: c_int) -> GuardResult<()> {
    let g = Guard::new("shutdown");
    let args: &[Arg<'_>] = &[("fd", &fd), ("how", &how)];
    g.fd(fd, args)?;
    // SAFETY: plain descriptor call.
    let rc = g.call(|| unsafe { libc::shutdown(fd, how) });
    g.unit(rc, args)
}

#[track_caller]
pub fn setsockopt(fd: RawFd, level: c_int, name: c_int, value: &[u8]) -> GuardResult<()> {
    let g = Guard::new("setsockopt");
    let len = value.len();
    let args: &[Arg<'_>] = &[("fd", &fd), ("level", &level), ("name", &name), ("len", &len)];
    g.fd(fd, args)?;
    let optlen = libc::socklen_t::try_from(len);
    g.ensure(optlen.is_ok(), Severity::Warn, errno::EINVAL, "option value too large", args)?;
    let optlen = optlen.unwrap_or_default();
    // SAFETY: `value` is readable for `optlen` bytes.
    let rc = g.call(|| unsafe { libc::setsockopt(fd, level, name, value.as_ptr().cast(), optlen) });
    g.unit(rc, args)
}

/// Returns the option length the kernel wrote into `value`.
#[track_caller]
pub fn getsockopt(fd: RawFd, level: c_int, name: c_int, value: &mut [u8]) -> GuardResult<usize> {
    let g = Guard::new("getsockopt");
    let len = value.len();
    let args: &[Arg<'_>] = &[("fd", &fd), ("level", &level), ("name", &name), ("len", &len)];
    g.fd(fd, args)?;
    let optlen = libc::socklen_t::try_from(len);
    g.ensure(optlen.is_ok(), Severity::Warn, errno::EINVAL, "option buffer too large", args)?;
    let mut optlen = optlen.unwrap_or_default();
    // SAFETY: `value` is writable for `optlen` bytes.
    let rc = g.call(|| unsafe {
        libc::getsockopt(fd, level, name, value.as_mut_ptr().cast(), &mut optlen)
    });
    g.unit(rc, args)?;
    Ok(optlen as usize)
}

fn name_of(
    g: &Guard,
    fd: RawFd,
    f: unsafe extern "C" fn(c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> c_int,
) -> GuardResult<SockAddr> {
    let args: &[Arg<'_>] = &[("fd", &fd)];
    g.fd(fd, args)?;
    let mut addr = SockAddr::empty();
    // SAFETY: `addr` is sized storage.
    let rc = g.call(|| unsafe { f(fd, (&raw mut addr.storage).cast(), &mut addr.len) });
    g.unit(rc, args)?;
    Ok(addr)
}

#[track_caller]
pub fn getsockname(fd: RawFd) -> GuardResult<SockAddr> {
    name_of(&Guard::new("getsockname"), fd, libc::getsockname)
}

#[track_caller]
pub fn getpeername(fd: RawFd) -> GuardResult<SockAddr> {
    name_of(&Guard::new("getpeername"), fd, libc::getpeername)
}

fn address_len(af: c_int) -> Option<usize> {
    match af {
        libc::AF_INET => Some(4),
        libc::AF_INET6 => Some(16),
        _ => None,
    }
}

/// Parse presentation text into network-order bytes written to `dst`
/// (4 bytes for `AF_INET`, 16 for `AF_INET6`).
#[track_caller]
pub fn inet_pton(af: c_int, src: Option<&CStr>, dst: &mut [u8]) -> GuardResult<()> {
    let g = Guard::new("inet_pton");
    let args: &[Arg<'_>] = &[("af", &af), ("src", &src)];
    let need = address_len(af);
    g.ensure(
        need.is_some(),
        Severity::Error,
        errno::EAFNOSUPPORT,
        "unsupported address family",
        args,
    )?;
    let src = g.string(src, "address text is null or empty", args)?;
    g.fits(need.unwrap_or_default(), dst.len(), "destination too small", args)?;
    // SAFETY: `src` is NUL-terminated and `dst` holds the family's size.
    let rc = g.call(|| unsafe { crate::ffi::inet_pton(af, src.as_ptr(), dst.as_mut_ptr().cast()) });
    match rc {
        1 => Ok(()),
        0 => Err(g.failure_or(errno::EINVAL, args)),
        _ => Err(g.failure(args)),
    }
}

/// Format network-order address bytes into `dst`.
#[track_caller]
pub fn inet_ntop<'b>(af: c_int, src: &[u8], dst: &'b mut [u8]) -> GuardResult<&'b CStr> {
    let g = Guard::new("inet_ntop");
    let args: &[Arg<'_>] = &[("af", &af), ("src", &src)];
    let need = address_len(af);
    g.ensure(
        need.is_some(),
        Severity::Error,
        errno::EAFNOSUPPORT,
        "unsupported address family",
        args,
    )?;
    g.fits(need.unwrap_or_default(), src.len(), "source shorter than the address", args)?;
    let size = libc::socklen_t::try_from(dst.len()).unwrap_or(libc::socklen_t::MAX);
    // SAFETY: `src` holds a full address and `dst` is writable for `size`.
    let p = g.call(|| unsafe {
        crate::ffi::inet_ntop(af, src.as_ptr().cast(), dst.as_mut_ptr().cast(), size)
    });
    g.ptr(p.cast_mut(), args)?;
    CStr::from_bytes_until_nul(dst).map_err(|_| g.failure_or(errno::ENOSPC, args))
}

// ---------------------------------------------------------------------------
// Name resolution
// ---------------------------------------------------------------------------

/// Result list of [`getaddrinfo`]; released with `freeaddrinfo` on drop.
pub struct AddrInfoList(NonNull<libc::addrinfo>);

// SAFETY: the list is immutable after getaddrinfo returns.
unsafe impl Send for AddrInfoList {}
unsafe impl Sync for AddrInfoList {}

/// One resolved entry.
#[derive(Debug, Clone)]
pub struct AddrInfo {
    pub family: c_int,
    pub socktype: c_int,
    pub protocol: c_int,
    pub addr: Option<SockAddr>,
    pub canonname: Option<CString>,
}

impl AddrInfoList {
    /// Entries in resolver order.
    pub fn iter(&self) -> impl Iterator<Item = AddrInfo> + '_ {
        let mut cur: *const libc::addrinfo = self.0.as_ptr();
        std::iter::from_fn(move || {
            // SAFETY: nodes stay alive as long as `self`.
            let node = unsafe { cur.as_ref()? };
            cur = node.ai_next;
            Some(AddrInfo {
                family: node.ai_family,
                socktype: node.ai_socktype,
                protocol: node.ai_protocol,
                // SAFETY: `ai_addr` covers `ai_addrlen` bytes.
                addr: unsafe { SockAddr::from_raw(node.ai_addr, node.ai_addrlen) },
                canonname: (!node.ai_canonname.is_null())
                    // SAFETY: non-null canonical names are NUL-terminated.
                    .then(|| unsafe { CStr::from_ptr(node.ai_canonname) }.to_owned()),
            })
        })
    }
}

impl fmt::Debug for AddrInfoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        // SAFETY: the list came from getaddrinfo and is freed once.
        unsafe { libc::freeaddrinfo(self.0.as_ptr()) };
    }
}

/// Description of a `getaddrinfo` status code.
#[must_use]
pub fn gai_strerror(code: c_int) -> String {
    // SAFETY: gai_strerror returns a static string for any code.
    let p = unsafe { libc::gai_strerror(code) };
    if p.is_null() {
        return format!("unknown resolver error {code}");
    }
    // SAFETY: non-null and NUL-terminated.
    unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
}

/// Resolve `node` and/or `service`; at least one must be given.
///
/// Resolver failures carry the `EAI_*` status; `EAI_SYSTEM` is reported
/// through errno instead.
#[track_caller]
pub fn getaddrinfo(
    node: Option<&CStr>,
    service: Option<&CStr>,
    hints: Option<&libc::addrinfo>,
) -> GuardResult<AddrInfoList> {
    let g = Guard::new("getaddrinfo");
    let args: &[Arg<'_>] = &[("node", &node), ("service", &service)];
    g.ensure(
        node.is_some() || service.is_some(),
        Severity::Error,
        errno::EINVAL,
        "node and service are both null",
        args,
    )?;
    let node = node.map_or(ptr::null(), CStr::as_ptr);
    let service = service.map_or(ptr::null(), CStr::as_ptr);
    let hints = hints.map_or(ptr::null(), |h| h as *const _);
    let mut res = MaybeUninit::<*mut libc::addrinfo>::new(ptr::null_mut());
    // SAFETY: strings are null or NUL-terminated; `res` is an out-pointer.
    let rc = g.call(|| unsafe { libc::getaddrinfo(node, service, hints, res.as_mut_ptr()) });
    if rc == libc::EAI_SYSTEM {
        return Err(g.failure(args));
    }
    if rc != 0 {
        return Err(g.status_failure(rc, gai_strerror(rc), false, args));
    }
    // SAFETY: written by the successful call.
    let res = unsafe { res.assume_init() };
    NonNull::new(res)
        .map(AddrInfoList)
        .ok_or_else(|| g.status_failure(libc::EAI_NONAME, gai_strerror(libc::EAI_NONAME), false, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unistd_abi::close;
    use guardlibc_membrane::diag;

    #[test]
    fn socketpair_send_recv() {
        let [a, b] = socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0).unwrap();
        assert_eq!(send(a, b"ping", 4, 0).unwrap(), 4);
        let mut buf = [0u8; 8];
        assert_eq!(recv(b, &mut buf, 8, 0).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");
        close(a).unwrap();
        close(b).unwrap();
    }

    #[test]
    fn nonblocking_recv_is_benign() {
        let [a, b] = socketpair(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_NONBLOCK, 0).unwrap();
        let mut buf = [0u8; 8];
        let (r, records) = diag::capture(|| recv(a, &mut buf, 8, 0));
        let err = r.unwrap_err();
        assert!(err.is_would_block());
        assert!(err.is_benign());
        assert!(records.is_empty());
        close(a).unwrap();
        close(b).unwrap();
    }

    #[test]
    fn loopback_bind_and_name() {
        let fd = socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        let addr = SockAddr::from("127.0.0.1:0".parse::<SocketAddr>().unwrap());
        bind(fd, Some(&addr)).unwrap();
        listen(fd, 1).unwrap();
        let bound = getsockname(fd).unwrap().as_socket_addr().unwrap();
        assert!(bound.ip().is_loopback());
        assert_ne!(bound.port(), 0);
        close(fd).unwrap();
    }

    #[test]
    fn bind_without_address_is_rejected() {
        let (r, _) = diag::capture(|| bind(3, None));
        assert_eq!(r.unwrap_err().errno(), Some(errno::EFAULT));
    }

    #[test]
    fn pton_ntop() {
        let mut raw = [0u8; 4];
        inet_pton(libc::AF_INET, Some(c"10.1.2.3"), &mut raw).unwrap();
        assert_eq!(raw, [10, 1, 2, 3]);
        let mut text = [0u8; 16];
        assert_eq!(inet_ntop(libc::AF_INET, &raw, &mut text).unwrap(), c"10.1.2.3");
        let (r, _) = diag::capture(|| inet_pton(libc::AF_INET, Some(c"not-an-ip"), &mut raw));
        assert!(r.is_err());
    }

    #[test]
    fn resolve_numeric_host() {
        let hints = libc::addrinfo {
            ai_flags: libc::AI_NUMERICHOST,
            ai_family: libc::AF_INET,
            ai_socktype: libc::SOCK_STREAM,
            ai_protocol: 0,
            ai_addrlen: 0,
            ai_addr: ptr::null_mut(),
            ai_canonname: ptr::null_mut(),
            ai_next: ptr::null_mut(),
        };
        let list = getaddrinfo(Some(c"127.0.0.1"), Some(c"80"), Some(&hints)).unwrap();
        let first = list.iter().next().unwrap();
        let addr = first.addr.unwrap().as_socket_addr().unwrap();
        assert_eq!(addr.port(), 80);
    }

    #[test]
    fn resolver_status_is_not_errno() {
        let (r, records) = diag::capture(|| getaddrinfo(None, None, None));
        assert!(r.is_err());
        assert_eq!(records.len(), 1);
        assert!(!gai_strerror(libc::EAI_NONAME).is_empty());
    }
}
