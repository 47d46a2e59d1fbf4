//! Structured error returned by every wrapper.

use thiserror::Error;

use guardlibc_core::errno;

/// Result type of every wrapper.
pub type GuardResult<T> = Result<T, GuardError>;

/// Broad category of a [`GuardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Rejected locally; the primitive was never invoked.
    InvalidArgument,
    /// The primitive ran and failed.
    Delegated,
    /// The primitive reported an expected condition (would-block, not-found, ...).
    Benign,
}

/// Why a wrapper call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Argument validation failed before delegation.
    #[error("{op}: invalid argument: {reason}")]
    InvalidArgument {
        op: &'static str,
        reason: &'static str,
        /// errno value stored for the caller (`EINVAL`, `EBADF`, `EFAULT`, ...).
        code: i32,
    },
    /// Copy refused because source and destination share bytes.
    #[error("{op}: source and destination overlap ({len} bytes)")]
    Overlap { op: &'static str, len: usize },
    /// The primitive failed and set errno.
    #[error("{op}: {description} (errno {code})")]
    Os {
        op: &'static str,
        code: i32,
        description: String,
        benign: bool,
    },
    /// The primitive reported failure through its return value and left
    /// errno untouched: pthread functions (errno-style codes), `regcomp`/
    /// `regexec` and `getaddrinfo` (their own code spaces).
    #[error("{op}: {description} (status {code})")]
    Status {
        op: &'static str,
        code: i32,
        description: String,
        benign: bool,
    },
}

impl GuardError {
    /// Operation that produced the error.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::InvalidArgument { op, .. }
            | Self::Overlap { op, .. }
            | Self::Os { op, .. }
            | Self::Status { op, .. } => op,
        }
    }

    /// errno value the caller observes, if the error lives in errno space.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::InvalidArgument { code, .. } | Self::Os { code, .. } => Some(*code),
            Self::Overlap { .. } => Some(errno::EINVAL),
            Self::Status { .. } => None,
        }
    }

    /// Raw numeric code, whatever its code space.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument { code, .. }
            | Self::Os { code, .. }
            | Self::Status { code, .. } => *code,
            Self::Overlap { .. } => errno::EINVAL,
        }
    }

    /// True when the failure was an expected condition and was not logged.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::Os { benign: true, .. } | Self::Status { benign: true, .. }
        )
    }

    #[must_use]
    pub fn kind(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument { .. } | Self::Overlap { .. } => ErrorClass::InvalidArgument,
            _ if self.is_benign() => ErrorClass::Benign,
            _ => ErrorClass::Delegated,
        }
    }

    /// True for `EAGAIN`/`EWOULDBLOCK`.
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        self.errno() == Some(errno::EAGAIN)
    }
}

impl From<GuardError> for std::io::Error {
    fn from(err: GuardError) -> Self {
        match err.errno() {
            Some(code) => std::io::Error::from_raw_os_error(code),
            None => std::io::Error::other(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(code: i32, benign: bool) -> GuardError {
        GuardError::Os {
            op: "read",
            code,
            description: errno::describe(code),
            benign,
        }
    }

    #[test]
    fn classes() {
        let invalid = GuardError::InvalidArgument {
            op: "close",
            reason: "negative descriptor",
            code: errno::EBADF,
        };
        assert_eq!(invalid.kind(), ErrorClass::InvalidArgument);
        assert_eq!(invalid.errno(), Some(errno::EBADF));
        assert_eq!(os(errno::EIO, false).kind(), ErrorClass::Delegated);
        assert_eq!(os(errno::EAGAIN, true).kind(), ErrorClass::Benign);
        assert_eq!(
            GuardError::Overlap { op: "memcpy", len: 10 }.kind(),
            ErrorClass::InvalidArgument
        );
    }

    #[test]
    fn would_block_detection() {
        assert!(os(errno::EAGAIN, true).is_would_block());
        assert!(!os(errno::EINTR, false).is_would_block());
    }

    #[test]
    fn status_codes_are_not_errno() {
        let status = GuardError::Status {
            op: "regexec",
            code: 1,
            description: "No match".into(),
            benign: true,
        };
        assert_eq!(status.errno(), None);
        assert_eq!(status.code(), 1);
        assert!(status.is_benign());
    }

    #[test]
    fn converts_to_io_error_with_raw_code() {
        let io: std::io::Error = os(errno::ENOENT, true).into();
        assert_eq!(io.raw_os_error(), Some(errno::ENOENT));
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn display_includes_op_and_code() {
        let text = os(errno::EBADF, false).to_string();
        assert!(text.starts_with("read: "));
        assert!(text.ends_with("(errno 9)"));
    }
}
