//! Argument validation predicates.
//!
//! These checks are cheap and local: they never touch the filesystem or
//! the kernel. A wrapper that fails one of them rejects the call without
//! delegating to the primitive.

use std::ffi::CStr;

/// Largest object size the allocator and the kernel will accept.
///
/// Anything above `isize::MAX` is the unsigned image of a negative C size.
pub const MAX_OBJECT_SIZE: usize = isize::MAX as usize;

/// Returns `true` if `fd` could name an open descriptor.
#[inline]
pub const fn valid_fd(fd: i32) -> bool {
    fd >= 0
}

/// Returns `true` if `size` is a plausible object size.
#[inline]
pub const fn valid_size(size: usize) -> bool {
    size <= MAX_OBJECT_SIZE
}

/// Returns `true` if a request for `len` units fits a buffer of `cap` units.
#[inline]
pub const fn fits(len: usize, cap: usize) -> bool {
    len <= cap
}

/// `nmemb * size`, or `None` on overflow or when the product is not a valid
/// object size.
#[inline]
pub fn array_size(nmemb: usize, size: usize) -> Option<usize> {
    nmemb.checked_mul(size).filter(|&total| valid_size(total))
}

/// Alignment accepted by `posix_memalign`: a power of two and a multiple of
/// `size_of::<*const ()>()`.
#[inline]
pub fn valid_alignment(alignment: usize) -> bool {
    alignment.is_power_of_two() && alignment % std::mem::size_of::<*const ()>() == 0
}

/// Null-string predicate: `true` for a missing string or an empty one.
#[inline]
pub fn is_string_null(s: Option<&CStr>) -> bool {
    s.is_none_or(|s| s.is_empty())
}

/// Returns `true` if `[a, a + a_len)` and `[b, b + b_len)` share a byte.
///
/// Empty ranges never overlap anything.
#[inline]
pub fn ranges_overlap(a: usize, a_len: usize, b: usize, b_len: usize) -> bool {
    if a_len == 0 || b_len == 0 {
        return false;
    }
    let a_end = a.saturating_add(a_len);
    let b_end = b.saturating_add(b_len);
    a < b_end && b < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd_sign_check() {
        assert!(valid_fd(0));
        assert!(valid_fd(1024));
        assert!(!valid_fd(-1));
        assert!(!valid_fd(i32::MIN));
    }

    #[test]
    fn negative_sizes_are_rejected() {
        assert!(valid_size(0));
        assert!(valid_size(MAX_OBJECT_SIZE));
        assert!(!valid_size(usize::MAX));
        assert!(!valid_size((-1_isize) as usize));
    }

    #[test]
    fn array_size_overflow() {
        assert_eq!(array_size(4, 8), Some(32));
        assert_eq!(array_size(0, usize::MAX), Some(0));
        assert_eq!(array_size(usize::MAX, 2), None);
        assert_eq!(array_size(MAX_OBJECT_SIZE, 2), None);
    }

    #[test]
    fn alignment_rules() {
        assert!(valid_alignment(8));
        assert!(valid_alignment(64));
        assert!(valid_alignment(4096));
        assert!(!valid_alignment(0));
        assert!(!valid_alignment(24));
        assert!(!valid_alignment(2));
    }

    #[test]
    fn string_null_predicate() {
        assert!(is_string_null(None));
        assert!(is_string_null(Some(c"")));
        assert!(!is_string_null(Some(c"/tmp")));
    }

    #[test]
    fn overlap_detection() {
        // buf[0..10] vs buf[5..15]
        assert!(ranges_overlap(100, 10, 105, 10));
        assert!(ranges_overlap(105, 10, 100, 10));
        // adjacent
        assert!(!ranges_overlap(100, 5, 105, 5));
        // disjoint
        assert!(!ranges_overlap(100, 5, 200, 5));
        // identical
        assert!(ranges_overlap(100, 1, 100, 1));
        // empty
        assert!(!ranges_overlap(100, 0, 100, 10));
    }

    #[test]
    fn overlap_near_address_space_end() {
        assert!(ranges_overlap(usize::MAX - 4, 8, usize::MAX - 2, 1));
        assert!(!ranges_overlap(usize::MAX - 4, 2, 0, 8));
    }
}
