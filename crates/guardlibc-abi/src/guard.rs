//! The validate / delegate / classify / log template.
//!
//! Every wrapper builds a [`Guard`] for its operation, runs its argument
//! checks through it, delegates with [`Guard::call`] and maps the primitive's
//! sentinel through one of the result helpers. The guard owns the uniform
//! parts of the contract:
//!
//! 1. rejected arguments are logged, stored in errno and returned as
//!    `GuardError::InvalidArgument` without calling the primitive;
//! 2. errno is cleared right before delegation;
//! 3. a failure captures errno, logs it unless the operation tolerates the
//!    code, and writes the captured value back after the sink ran.

use std::ffi::{CStr, c_int};
use std::fmt::Debug;
use std::ptr::NonNull;

use guardlibc_core::{Suppress, errno, is_transient, validate};
use guardlibc_membrane::{
    CallSite, Diagnostic, GuardError, GuardResult, Severity, diag, global_metrics,
};

use crate::errno_abi;

/// Named argument rendered into a diagnostic only when one is emitted.
pub(crate) type Arg<'a> = (&'static str, &'a dyn Debug);

pub(crate) struct Guard {
    op: &'static str,
    site: CallSite,
    suppress: Suppress,
}

impl Guard {
    #[track_caller]
    #[inline]
    pub(crate) fn new(op: &'static str) -> Self {
        Self {
            op,
            site: CallSite::caller(),
            suppress: Suppress::NONE,
        }
    }

    /// Declare the benign conditions this operation tolerates.
    #[inline]
    pub(crate) fn suppress(mut self, suppress: Suppress) -> Self {
        self.suppress = suppress;
        self
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Refuse the call: log, store `code` in errno, build the error.
    pub(crate) fn reject(
        &self,
        severity: Severity,
        code: c_int,
        reason: &'static str,
        args: &[Arg<'_>],
    ) -> GuardError {
        global_metrics().record_rejected();
        diag::emit(
            Diagnostic::new(severity, self.op, self.site, reason)
                .with_args(args)
                .with_errno(code),
        );
        errno_abi::set(code);
        GuardError::InvalidArgument {
            op: self.op,
            reason,
            code,
        }
    }

    /// Generic check: `ok` or reject with the given severity and code.
    #[inline]
    pub(crate) fn ensure(
        &self,
        ok: bool,
        severity: Severity,
        code: c_int,
        reason: &'static str,
        args: &[Arg<'_>],
    ) -> GuardResult<()> {
        if ok {
            Ok(())
        } else {
            Err(self.reject(severity, code, reason, args))
        }
    }

    /// Descriptor must be non-negative.
    #[inline]
    pub(crate) fn fd(&self, fd: c_int, args: &[Arg<'_>]) -> GuardResult<()> {
        self.ensure(
            validate::valid_fd(fd),
            Severity::Error,
            errno::EBADF,
            "negative file descriptor",
            args,
        )
    }

    /// String must be present and non-empty.
    #[inline]
    pub(crate) fn string<'s>(
        &self,
        s: Option<&'s CStr>,
        reason: &'static str,
        args: &[Arg<'_>],
    ) -> GuardResult<&'s CStr> {
        match s {
            Some(s) if !validate::is_string_null(Some(s)) => Ok(s),
            Some(_) => Err(self.reject(Severity::Error, errno::EINVAL, reason, args)),
            None => Err(self.reject(Severity::Error, errno::EFAULT, reason, args)),
        }
    }

    /// Required value must be present (null pointer check).
    #[inline]
    pub(crate) fn required<T>(
        &self,
        value: Option<T>,
        reason: &'static str,
        args: &[Arg<'_>],
    ) -> GuardResult<T> {
        value.ok_or_else(|| self.reject(Severity::Error, errno::EFAULT, reason, args))
    }

    /// Raw pointer must be non-null.
    #[inline]
    pub(crate) fn non_null<T>(
        &self,
        ptr: *const T,
        reason: &'static str,
        args: &[Arg<'_>],
    ) -> GuardResult<()> {
        self.ensure(!ptr.is_null(), Severity::Error, errno::EFAULT, reason, args)
    }

    /// Size must not be the image of a negative C size.
    #[inline]
    pub(crate) fn size(&self, size: usize, args: &[Arg<'_>]) -> GuardResult<()> {
        self.ensure(
            validate::valid_size(size),
            Severity::Warn,
            errno::EINVAL,
            "size exceeds isize::MAX",
            args,
        )
    }

    /// Requested length must fit the buffer supplied for it.
    #[inline]
    pub(crate) fn fits(
        &self,
        len: usize,
        cap: usize,
        reason: &'static str,
        args: &[Arg<'_>],
    ) -> GuardResult<()> {
        self.ensure(
            validate::fits(len, cap),
            Severity::Warn,
            errno::EINVAL,
            reason,
            args,
        )
    }

    /// Source and destination ranges of a copy must not share bytes.
    pub(crate) fn disjoint(
        &self,
        dst: usize,
        src: usize,
        len: usize,
        args: &[Arg<'_>],
    ) -> GuardResult<()> {
        if !validate::ranges_overlap(dst, len, src, len) {
            return Ok(());
        }
        global_metrics().record_rejected();
        diag::emit(
            Diagnostic::new(
                Severity::Error,
                self.op,
                self.site,
                "source and destination overlap",
            )
            .with_args(args)
            .with_errno(errno::EINVAL),
        );
        errno_abi::set(errno::EINVAL);
        Err(GuardError::Overlap { op: self.op, len })
    }

    // -----------------------------------------------------------------------
    // Delegation
    // -----------------------------------------------------------------------

    /// Clear errno and run the primitive.
    #[inline]
    pub(crate) fn call<T>(&self, f: impl FnOnce() -> T) -> T {
        global_metrics().record_delegated();
        errno_abi::reset();
        f()
    }

    // -----------------------------------------------------------------------
    // Failure classification
    // -----------------------------------------------------------------------

    fn classify(&self, severity: Severity, code: c_int, args: &[Arg<'_>]) -> bool {
        let benign = self.suppress.covers(code);
        if benign {
            global_metrics().record_benign();
        } else {
            global_metrics().record_failure();
            diag::emit(
                Diagnostic::new(severity, self.op, self.site, "call failed")
                    .with_args(args)
                    .with_errno(code),
            );
        }
        benign
    }

    fn os_error(&self, severity: Severity, code: c_int, args: &[Arg<'_>]) -> GuardError {
        let benign = self.classify(severity, code, args);
        errno_abi::set(code);
        GuardError::Os {
            op: self.op,
            code,
            description: errno::describe(code),
            benign,
        }
    }

    /// The primitive signalled failure; errno holds the cause.
    pub(crate) fn failure(&self, args: &[Arg<'_>]) -> GuardError {
        self.failure_or(errno::EINVAL, args)
    }

    /// As [`Guard::failure`], for primitives that may fail without setting
    /// errno; `fallback` is used when errno is still zero.
    pub(crate) fn failure_or(&self, fallback: c_int, args: &[Arg<'_>]) -> GuardError {
        let code = match errno_abi::get() {
            0 => fallback,
            code => code,
        };
        self.os_error(Severity::Error, code, args)
    }

    /// Allocation failure: logged at panic severity, still returned.
    pub(crate) fn fatal(&self, args: &[Arg<'_>]) -> GuardError {
        let code = match errno_abi::get() {
            0 => errno::ENOMEM,
            code => code,
        };
        self.os_error(Severity::Panic, code, args)
    }

    /// An allocator returned `code` instead of setting errno. Only `ENOMEM`
    /// is an allocation failure; anything else is an ordinary one.
    pub(crate) fn alloc_failure(&self, code: c_int, args: &[Arg<'_>]) -> GuardError {
        errno_abi::set(code);
        if code == errno::ENOMEM {
            self.fatal(args)
        } else {
            self.failure(args)
        }
    }

    /// The primitive returned an errno-style code directly (pthread family).
    /// errno itself is left alone, so the error is a status, not an errno.
    pub(crate) fn returned(&self, code: c_int, args: &[Arg<'_>]) -> GuardError {
        let benign = self.suppress.covers(code);
        self.status_failure(code, errno::describe(code), benign, args)
    }

    /// The primitive failed with a status from its own code space.
    pub(crate) fn status_failure(
        &self,
        code: c_int,
        description: String,
        benign: bool,
        args: &[Arg<'_>],
    ) -> GuardError {
        if benign {
            global_metrics().record_benign();
        } else {
            global_metrics().record_failure();
            diag::emit(
                Diagnostic::new(Severity::Error, self.op, self.site, "call failed")
                    .with_args(args)
                    .with_status(code, description.clone()),
            );
        }
        GuardError::Status {
            op: self.op,
            code,
            description,
            benign,
        }
    }

    /// Emit a non-failure diagnostic (e.g. a tolerated misuse).
    pub(crate) fn note(&self, severity: Severity, message: &'static str, args: &[Arg<'_>]) {
        diag::emit(Diagnostic::new(severity, self.op, self.site, message).with_args(args));
    }

    // -----------------------------------------------------------------------
    // Sentinel mapping
    // -----------------------------------------------------------------------

    /// `-1` means failure.
    #[inline]
    pub(crate) fn int(&self, rc: c_int, args: &[Arg<'_>]) -> GuardResult<c_int> {
        if rc == -1 {
            Err(self.failure(args))
        } else {
            Ok(rc)
        }
    }

    /// `-1` means failure; any other value is discarded.
    #[inline]
    pub(crate) fn unit(&self, rc: c_int, args: &[Arg<'_>]) -> GuardResult<()> {
        self.int(rc, args).map(drop)
    }

    /// Negative byte count means failure.
    #[inline]
    pub(crate) fn count(&self, rc: isize, args: &[Arg<'_>]) -> GuardResult<usize> {
        if rc < 0 {
            Err(self.failure(args))
        } else {
            Ok(rc as usize)
        }
    }

    /// Null pointer means failure.
    #[inline]
    pub(crate) fn ptr<T>(&self, ptr: *mut T, args: &[Arg<'_>]) -> GuardResult<NonNull<T>> {
        NonNull::new(ptr).ok_or_else(|| self.failure(args))
    }

    /// Zero means success, anything else is an errno-style code.
    #[inline]
    pub(crate) fn status(&self, rc: c_int, args: &[Arg<'_>]) -> GuardResult<()> {
        if rc == 0 {
            Ok(())
        } else {
            Err(self.returned(rc, args))
        }
    }

    // -----------------------------------------------------------------------
    // Partial transfers
    // -----------------------------------------------------------------------

    /// Account for a transfer that moved `done` of `requested` units.
    ///
    /// A shortfall with errno still zero is end-of-stream and is silent.
    /// With errno set it is a warning for transient codes and an error
    /// otherwise; errno is written back afterwards.
    pub(crate) fn transfer(&self, requested: usize, done: usize, args: &[Arg<'_>]) {
        if done >= requested {
            return;
        }
        global_metrics().record_partial();
        let code = errno_abi::get();
        if code == 0 {
            return;
        }
        let severity = if is_transient(code) {
            Severity::Warn
        } else {
            Severity::Error
        };
        diag::emit(
            Diagnostic::new(severity, self.op, self.site, "partial transfer")
                .with_args(args)
                .with_arg("requested", &requested)
                .with_arg("transferred", &done)
                .with_errno(code),
        );
        errno_abi::set(code);
    }
}
