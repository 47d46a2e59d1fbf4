//! Benign-condition policy.
//!
//! Some error codes are normal outcomes for particular operations: a
//! non-blocking read that finds no data, a connect still in progress, a
//! stat of a path that does not exist. Wrappers declare which of these they
//! tolerate with a [`Suppress`] set; a failure whose code is covered is still
//! returned to the caller but produces no diagnostic.

use std::ops::BitOr;

use crate::errno;

/// Set of benign conditions an operation tolerates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Suppress(u8);

impl Suppress {
    /// Nothing is benign.
    pub const NONE: Self = Self(0);
    /// `EAGAIN` / `EWOULDBLOCK`.
    pub const WOULD_BLOCK: Self = Self(1 << 0);
    /// `EINPROGRESS`.
    pub const IN_PROGRESS: Self = Self(1 << 1);
    /// `EINTR`.
    pub const INTERRUPTED: Self = Self(1 << 2);
    /// `ENOENT`.
    pub const NOT_FOUND: Self = Self(1 << 3);
    /// `ECHILD`.
    pub const NO_CHILD: Self = Self(1 << 4);

    /// Union of two sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if every condition in `other` is in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if an errno value falls under one of the tolerated
    /// conditions.
    #[must_use]
    pub const fn covers(self, code: i32) -> bool {
        let condition = match code {
            errno::EAGAIN => Self::WOULD_BLOCK,
            errno::EINPROGRESS => Self::IN_PROGRESS,
            errno::EINTR => Self::INTERRUPTED,
            errno::ENOENT => Self::NOT_FOUND,
            errno::ECHILD => Self::NO_CHILD,
            _ => return false,
        };
        self.0 & condition.0 != 0
    }
}

impl BitOr for Suppress {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

/// Returns `true` for codes that describe a transient condition: a retry
/// may succeed. Partial transfers with a transient errno are warnings.
#[inline]
pub const fn is_transient(code: i32) -> bool {
    matches!(code, errno::EAGAIN | errno::EINTR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_covers_nothing() {
        for code in [errno::EAGAIN, errno::ENOENT, errno::ECHILD, errno::EINTR] {
            assert!(!Suppress::NONE.covers(code));
        }
    }

    #[test]
    fn each_flag_covers_its_code_only() {
        assert!(Suppress::WOULD_BLOCK.covers(errno::EAGAIN));
        assert!(Suppress::WOULD_BLOCK.covers(errno::EWOULDBLOCK));
        assert!(!Suppress::WOULD_BLOCK.covers(errno::EINTR));
        assert!(Suppress::IN_PROGRESS.covers(errno::EINPROGRESS));
        assert!(Suppress::INTERRUPTED.covers(errno::EINTR));
        assert!(Suppress::NOT_FOUND.covers(errno::ENOENT));
        assert!(!Suppress::NOT_FOUND.covers(errno::EACCES));
        assert!(Suppress::NO_CHILD.covers(errno::ECHILD));
    }

    #[test]
    fn union_combines() {
        let set = Suppress::WOULD_BLOCK | Suppress::INTERRUPTED;
        assert!(set.covers(errno::EAGAIN));
        assert!(set.covers(errno::EINTR));
        assert!(!set.covers(errno::ENOENT));
        assert!(set.contains(Suppress::WOULD_BLOCK));
        assert!(!set.contains(Suppress::NO_CHILD));
    }

    #[test]
    fn transient_codes() {
        assert!(is_transient(errno::EAGAIN));
        assert!(is_transient(errno::EINTR));
        assert!(!is_transient(errno::EIO));
        assert!(!is_transient(0));
    }
}
