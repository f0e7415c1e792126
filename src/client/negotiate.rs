//! Deciding which read window to install.
//!
//! Pure decision logic with no I/O. Reusing a window the port may already be
//! reading saves a multi-cycle switch into read mode, so an existing window is
//! preferred whenever it can serve the request; otherwise a one-shot window
//! scoped exactly to the request is synthesized.

use crate::client::{ClientResult, ReadMode, ReadWindow};

/// Outcome of negotiating a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiated {
    /// The installed window stays as it is.
    Keep,
    /// Install this window (a fresh copy of an existing one, or a new one).
    Install(ReadWindow),
}

impl Negotiated {
    /// The window to install, if any.
    pub fn into_window(self) -> Option<ReadWindow> {
        match self {
            Negotiated::Keep => None,
            Negotiated::Install(window) => Some(window),
        }
    }
}

/// Decides whether `requested` should replace `existing`.
///
/// The existing window is replaced if it is absent, exhausted, or differs in
/// range or mode. The installed window is always an unissued copy.
pub fn negotiate_set(existing: Option<&ReadWindow>, requested: &ReadWindow) -> Negotiated {
    match existing {
        Some(current) if current.can_be_used_for_read() && current.same_as(requested) => {
            Negotiated::Keep
        }
        _ => Negotiated::Install(requested.fresh_copy()),
    }
}

/// Decides whether `to_set` should be installed to cover `needed`.
///
/// Only replaces when the existing window is absent or does not cover `needed`
/// with the same read mode.
pub fn negotiate_ensure(
    existing: Option<&ReadWindow>,
    needed: &ReadWindow,
    to_set: &ReadWindow,
) -> Negotiated {
    match existing {
        Some(current) if current.contains_with_same_mode(needed) => Negotiated::Keep,
        _ => negotiate_set(existing, to_set),
    }
}

/// Decides which window should serve a read of `count` registers at `first_register`.
///
/// A usable window is kept as is, whether or not it covers the request: a
/// repeating window that misses the request is the caller's to fix, and the
/// read reports a range error. An exhausted one-shot window that covers the
/// request is refreshed. Anything else gives way to a one-shot window over
/// exactly the requested registers.
pub fn negotiate_read(
    existing: Option<&ReadWindow>,
    first_register: u8,
    count: usize,
) -> ClientResult<Negotiated> {
    match existing {
        Some(current) if current.can_be_used_for_read() => Ok(Negotiated::Keep),
        Some(current) if current.contains_registers(first_register, count) => {
            debug_assert_eq!(current.mode(), ReadMode::Once);
            Ok(Negotiated::Install(current.fresh_copy()))
        }
        _ => Ok(Negotiated::Install(ReadWindow::once(
            first_register,
            count,
        )?)),
    }
}
