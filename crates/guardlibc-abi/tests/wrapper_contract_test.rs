#![cfg(target_os = "linux")]
//! End-to-end checks of the validate / delegate / classify / log contract
//! through the public wrapper surface.

use std::ffi::c_void;
use std::sync::Arc;

use guardlibc_abi::{errno_abi, malloc_abi, process_abi, stdio_abi, string_abi, unistd_abi};
use guardlibc_membrane::diag::{self, Diagnostic, DiagnosticSink};
use guardlibc_membrane::{ErrorClass, GuardError, Severity};

/// Sink that clobbers errno from inside the logging path.
struct ClobberingSink;

impl DiagnosticSink for ClobberingSink {
    fn emit(&self, _diagnostic: &Diagnostic) {
        errno_abi::set(0);
    }
}

fn temp_path(tag: &str) -> std::ffi::CString {
    let path = std::env::temp_dir().join(format!("guardlibc-{tag}-{}", std::process::id()));
    std::ffi::CString::new(path.into_os_string().into_encoded_bytes()).unwrap()
}

#[test]
fn zero_size_malloc_is_passed_through() {
    let (r, records) = diag::capture(|| malloc_abi::malloc(0));
    if let Ok(p) = r {
        let mut raw = p.as_ptr();
        unsafe { malloc_abi::free(&mut raw) };
    }
    assert!(records.is_empty());
}

#[test]
fn huge_malloc_is_refused_before_delegation() {
    let (r, records) = diag::capture(|| malloc_abi::malloc(usize::MAX));
    let err = r.unwrap_err();
    assert_eq!(err.kind(), ErrorClass::InvalidArgument);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Severity::Warn);
    assert_eq!(records[0].op, "malloc");
}

#[test]
fn fopen_without_path_is_rejected_with_efault() {
    let (r, records) = diag::capture(|| stdio_abi::fopen(None, Some(c"r")));
    assert_eq!(r.unwrap_err().errno(), Some(libc::EFAULT));
    assert_eq!(errno_abi::get(), libc::EFAULT);
    assert_eq!(records[0].level, Severity::Error);
}

#[test]
fn strcmp_orders_null_first_and_never_logs() {
    let ((), records) = diag::capture(|| {
        assert_eq!(string_abi::strcmp(None, None), 0);
        assert!(string_abi::strcmp(Some(c"a"), None) > 0);
        assert!(string_abi::strcmp(None, Some(c"a")) < 0);
        assert!(string_abi::strcmp(Some(c"a"), Some(c"b")) < 0);
    });
    assert!(records.is_empty());
}

#[test]
fn nonblocking_empty_pipe_read_is_benign() {
    let [rd, wr] = unistd_abi::pipe().unwrap();
    let flags = unistd_abi::fcntl(rd, libc::F_GETFL, 0).unwrap();
    unistd_abi::fcntl(rd, libc::F_SETFL, flags | libc::O_NONBLOCK).unwrap();

    let mut buf = [0u8; 16];
    let (r, records) = diag::capture(|| unistd_abi::read(rd, &mut buf, 16));
    let err = r.unwrap_err();
    assert!(err.is_would_block());
    assert_eq!(err.kind(), ErrorClass::Benign);
    assert!(records.is_empty());
    assert_eq!(errno_abi::get(), libc::EAGAIN);

    unistd_abi::close(rd).unwrap();
    unistd_abi::close(wr).unwrap();
}

#[test]
fn overlapping_memcpy_is_refused() {
    let mut buf = [0u8; 32];
    let base = buf.as_mut_ptr().cast::<c_void>();
    let (r, records) = diag::capture(|| unsafe {
        malloc_abi::memcpy(base, base.cast::<u8>().add(4).cast(), 16)
    });
    assert!(matches!(r, Err(GuardError::Overlap { len: 16, .. })));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Severity::Error);
    assert_eq!(buf, [0u8; 32]);
}

#[test]
fn waitpid_without_children_is_benign() {
    let (r, records) = diag::capture(|| process_abi::waitpid(-1, libc::WNOHANG));
    let err = r.unwrap_err();
    assert_eq!(err.errno(), Some(libc::ECHILD));
    assert!(err.is_benign());
    assert!(records.is_empty());
}

#[test]
fn file_round_trip_preserves_embedded_nuls() {
    let path = temp_path("roundtrip");
    let data = b"ab\0cd\0\0ef";
    let fd = unistd_abi::open(
        Some(&path),
        libc::O_CREAT | libc::O_TRUNC | libc::O_RDWR,
        0o600,
    )
    .unwrap();
    assert_eq!(unistd_abi::write(fd, data, data.len()).unwrap(), data.len());
    assert_eq!(unistd_abi::lseek(fd, 0, libc::SEEK_SET).unwrap(), 0);
    let mut back = [0u8; 16];
    assert_eq!(unistd_abi::read(fd, &mut back, 16).unwrap(), data.len());
    assert_eq!(&back[..data.len()], data);
    unistd_abi::close(fd).unwrap();
    unistd_abi::unlink(Some(&path)).unwrap();
}

#[test]
fn read_count_larger_than_buffer_is_refused() {
    let [rd, wr] = unistd_abi::pipe().unwrap();
    let mut small = [0u8; 4];
    let (r, records) = diag::capture(|| unistd_abi::read(rd, &mut small, 64));
    assert_eq!(r.unwrap_err().kind(), ErrorClass::InvalidArgument);
    assert_eq!(records[0].level, Severity::Warn);
    unistd_abi::close(rd).unwrap();
    unistd_abi::close(wr).unwrap();
}

#[test]
fn free_nulls_the_pointer_and_tolerates_repeats() {
    let p = malloc_abi::malloc(64).unwrap();
    let mut raw = p.as_ptr();
    unsafe { malloc_abi::free(&mut raw) };
    assert!(raw.is_null());
    let ((), records) = diag::capture(|| unsafe { malloc_abi::free(&mut raw) });
    assert!(raw.is_null());
    assert!(records.iter().all(|r| r.level == Severity::Warn));
}

#[test]
fn sink_side_effects_do_not_mask_errno() {
    let path = temp_path("missing-dir");
    let r = diag::with_sink(Arc::new(ClobberingSink), || unistd_abi::rmdir(Some(&path)));
    assert_eq!(r.unwrap_err().errno(), Some(libc::ENOENT));
    assert_eq!(errno_abi::get(), libc::ENOENT);
}

#[test]
fn short_pipe_write_returns_partial_count() {
    let [rd, wr] = unistd_abi::pipe().unwrap();
    let flags = unistd_abi::fcntl(wr, libc::F_GETFL, 0).unwrap();
    unistd_abi::fcntl(wr, libc::F_SETFL, flags | libc::O_NONBLOCK).unwrap();

    let chunk = vec![0x5a; 1 << 20];
    let (r, records) = diag::capture(|| unistd_abi::write(wr, &chunk, chunk.len()));
    let written = r.unwrap();
    assert!(written > 0 && written < chunk.len());
    // A short write with errno still zero is not a failure.
    assert!(records.iter().all(|r| r.level == Severity::Warn));

    unistd_abi::close(rd).unwrap();
    unistd_abi::close(wr).unwrap();
}

#[test]
fn stream_reaches_eof_without_logging() {
    let mut stream = stdio_abi::tmpfile().unwrap();
    stdio_abi::fputs(Some(c"one\ntwo"), &mut stream).unwrap();
    stdio_abi::rewind(&mut stream);
    let ((), records) = diag::capture(|| {
        assert_eq!(stdio_abi::getline(&mut stream).unwrap().as_deref(), Some(&b"one\n"[..]));
        assert_eq!(stdio_abi::getline(&mut stream).unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(stdio_abi::getline(&mut stream).unwrap(), None);
    });
    assert!(records.is_empty());
    assert!(stdio_abi::feof(&stream));
    stdio_abi::fclose(stream).unwrap();
}
