//! Caller location attached to diagnostics.
//!
//! Wrappers are `#[track_caller]`, so [`CallSite::caller`] inside a wrapper
//! resolves to the application line that called it. Without the
//! `call-site` feature the type is zero-sized and records nothing.

#[cfg(feature = "call-site")]
use std::panic::Location;

/// Source location of a wrapper call (debug variant only).
#[cfg(feature = "call-site")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    location: &'static Location<'static>,
}

/// Source location of a wrapper call (production variant: empty).
#[cfg(not(feature = "call-site"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallSite;

impl CallSite {
    /// Capture the location of the nearest non-`#[track_caller]` frame.
    #[cfg(feature = "call-site")]
    #[track_caller]
    #[inline]
    #[must_use]
    pub fn caller() -> Self {
        Self {
            location: Location::caller(),
        }
    }

    #[cfg(not(feature = "call-site"))]
    #[track_caller]
    #[inline]
    #[must_use]
    pub fn caller() -> Self {
        Self
    }

    /// Source file, when recorded.
    #[must_use]
    pub fn file(&self) -> Option<&'static str> {
        #[cfg(feature = "call-site")]
        {
            Some(self.location.file())
        }
        #[cfg(not(feature = "call-site"))]
        {
            None
        }
    }

    /// Source line, when recorded.
    #[must_use]
    pub fn line(&self) -> Option<u32> {
        #[cfg(feature = "call-site")]
        {
            Some(self.location.line())
        }
        #[cfg(not(feature = "call-site"))]
        {
            None
        }
    }
}
