//! Terminator scanning for NUL-terminated buffers.
//!
//! Byte strings (`[u8]`) and wide strings (`[wchar_t]`) arrive in the
//! wrappers as slices. The primitives underneath stop at the first zero
//! element, so before delegating a wrapper has to know that a terminator
//! exists inside the slice and how much room is left after it.

/// Length of the string stored in `s`: the index of the first zero element.
///
/// Returns `None` if `s` holds no terminator, in which case a C primitive
/// would read past the end of the slice.
#[inline]
pub fn terminated_len<T: Copy + Default + PartialEq>(s: &[T]) -> Option<usize> {
    let zero = T::default();
    s.iter().position(|&c| c == zero)
}

/// Returns `true` if `extra` more elements plus a terminator can be appended
/// to the string already stored in `dst`.
#[inline]
pub fn can_append<T: Copy + Default + PartialEq>(dst: &[T], extra: usize) -> bool {
    match terminated_len(dst) {
        Some(len) => len
            .checked_add(extra)
            .and_then(|n| n.checked_add(1))
            .is_some_and(|needed| needed <= dst.len()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_terminator() {
        assert_eq!(terminated_len(b"abc\0def"), Some(3));
        assert_eq!(terminated_len(b"\0"), Some(0));
        assert_eq!(terminated_len(b"abc"), None);
        assert_eq!(terminated_len::<u8>(&[]), None);
    }

    #[test]
    fn wide_terminator() {
        let s: [i32; 4] = ['h' as i32, 'i' as i32, 0, 'x' as i32];
        assert_eq!(terminated_len(&s), Some(2));
        let unterminated: [u32; 2] = [1, 2];
        assert_eq!(terminated_len(&unterminated), None);
    }

    #[test]
    fn append_room() {
        let mut buf = [0u8; 8];
        buf[..3].copy_from_slice(b"abc");
        assert!(can_append(&buf, 4));
        assert!(!can_append(&buf, 5));
        assert!(!can_append(b"full", 0));
    }
}
