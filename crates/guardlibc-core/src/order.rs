//! Null-safe three-way comparison.
//!
//! Comparison wrappers must not crash on missing input, but they still have
//! to return a usable ordering. Missing values sort first: two missing
//! values compare equal, a present value is greater than a missing one.

use core::cmp::Ordering;

/// Compare two optional values, delegating to `cmp` when both are present.
///
/// Returns the C-style sign convention: negative, zero or positive.
pub fn nullable_cmp<T>(a: Option<T>, b: Option<T>, cmp: impl FnOnce(T, T) -> i32) -> i32 {
    match (a, b) {
        (None, None) => 0,
        (Some(_), None) => 1,
        (None, Some(_)) => -1,
        (Some(a), Some(b)) => cmp(a, b),
    }
}

/// Map an [`Ordering`] onto `-1`, `0`, `1`.
#[inline]
pub const fn ordering_to_int(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(a: &[u8], b: &[u8]) -> i32 {
        ordering_to_int(a.cmp(b))
    }

    #[test]
    fn both_missing_is_equal() {
        assert_eq!(nullable_cmp::<&[u8]>(None, None, bytes), 0);
    }

    #[test]
    fn present_sorts_after_missing() {
        assert!(nullable_cmp(Some(&b"a"[..]), None, bytes) > 0);
        assert!(nullable_cmp(None, Some(&b"a"[..]), bytes) < 0);
    }

    #[test]
    fn present_values_use_comparator() {
        assert_eq!(nullable_cmp(Some(&b"abc"[..]), Some(&b"abc"[..]), bytes), 0);
        assert!(nullable_cmp(Some(&b"abc"[..]), Some(&b"abd"[..]), bytes) < 0);
        assert!(nullable_cmp(Some(&b"b"[..]), Some(&b"abd"[..]), bytes) > 0);
    }

    #[test]
    fn comparator_not_called_for_missing() {
        let mut called = false;
        let _ = nullable_cmp(Some(1), None, |_, _| {
            called = true;
            0
        });
        assert!(!called);
    }
}
