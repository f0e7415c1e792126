use std::time::Instant;

use crate::client::{
    ClientResult,
    helpers::{MAX_REGISTER_COUNT, register_span, span_contains},
    slice::RegisterView,
};

/// Register values returned by a read, at most one transaction's worth.
pub type RegisterBytes = heapless::Vec<u8, MAX_REGISTER_COUNT>;

/// How long the data of a [`ReadWindow`] stays wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Re-read the window on every polling cycle.
    Repeat,
    /// Read the window once; the result may be consumed once.
    Once,
}

/// A contiguous run of registers to mirror in the read cache.
///
/// Windows are value-like: [`ReadWindow::same_as`] compares range and mode,
/// ignoring whether the window has been issued. A [`ReadMode::Once`] window
/// becomes unusable the first time it arms a read; call
/// [`ReadWindow::fresh_copy`] to obtain a usable one again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWindow {
    first: u8,
    count: usize,
    mode: ReadMode,
    issued: bool,
}

impl ReadWindow {
    /// Creates a window over `[first_register, first_register + count)`.
    ///
    /// # Errors
    /// Fails if the range is empty, longer than one transaction, or runs past
    /// register 0xFF.
    pub fn new(first_register: u8, count: usize, mode: ReadMode) -> ClientResult<Self> {
        register_span(first_register, count)?;
        Ok(Self {
            first: first_register,
            count,
            mode,
            issued: false,
        })
    }

    /// Creates a repeating window.
    pub fn repeat(first_register: u8, count: usize) -> ClientResult<Self> {
        Self::new(first_register, count, ReadMode::Repeat)
    }

    /// Creates a one-shot window.
    pub fn once(first_register: u8, count: usize) -> ClientResult<Self> {
        Self::new(first_register, count, ReadMode::Once)
    }

    /// Creates a window from a register interval `[first, end)`.
    pub fn from_range(first_register: u8, end: usize, mode: ReadMode) -> ClientResult<Self> {
        let count = end.saturating_sub(first_register as usize);
        Self::new(first_register, count, mode)
    }

    pub fn first_register(&self) -> u8 {
        self.first
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// One past the last register of the window.
    pub fn end_register(&self) -> usize {
        self.first as usize + self.count
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Returns true once the window has armed a read.
    pub fn has_been_issued(&self) -> bool {
        self.issued
    }

    /// Returns true if the window may still arm a read.
    pub fn can_be_used_for_read(&self) -> bool {
        self.mode == ReadMode::Repeat || !self.issued
    }

    /// Records that the window armed a read.
    pub(crate) fn set_read_issued(&mut self) {
        self.issued = true;
    }

    /// Returns an unissued copy with the same range and mode.
    pub fn fresh_copy(&self) -> Self {
        Self {
            issued: false,
            ..self.clone()
        }
    }

    /// Compares range and mode, ignoring the issued flag.
    pub fn same_as(&self, other: &ReadWindow) -> bool {
        self.first == other.first && self.count == other.count && self.mode == other.mode
    }

    /// Returns true if `other`'s registers all lie inside this window.
    pub fn contains(&self, other: &ReadWindow) -> bool {
        self.contains_registers(other.first, other.count)
    }

    /// Returns true if `[first_register, first_register + count)` lies inside this window.
    pub fn contains_registers(&self, first_register: u8, count: usize) -> bool {
        span_contains(self.first, self.count, first_register, count)
    }

    /// Returns true if `other` has the same mode and lies inside this window.
    pub fn contains_with_same_mode(&self, other: &ReadWindow) -> bool {
        self.mode == other.mode && self.contains(other)
    }

    /// Returns true if this window is still usable and covers the registers.
    pub fn is_compatible_with(&self, first_register: u8, count: usize) -> bool {
        self.can_be_used_for_read() && self.contains_registers(first_register, count)
    }
}

/// Register values stamped with the moment the hardware snapshot became valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedData {
    /// Register values, starting at `first_register`.
    pub data: RegisterBytes,
    /// Register held by `data[0]`.
    pub first_register: u8,
    /// When the read cache holding these values was marked valid.
    pub capture_time: Instant,
}

impl TimestampedData {
    /// Register-addressed view over the data.
    pub fn view(&self) -> RegisterView<'_> {
        RegisterView::new(self.first_register, &self.data)
    }
}

/// What the polling loop does to keep the device from timing out.
///
/// Options are tried in field order; the first applicable one fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatAction {
    /// Re-arm the read last programmed into the port, if it is still in read mode.
    pub reread_last: bool,
    /// Send the last written registers again.
    pub rewrite_last: bool,
    /// Read this window, without disturbing the client's own read window.
    pub heartbeat_window: Option<ReadWindow>,
}

impl Default for HeartbeatAction {
    fn default() -> Self {
        Self {
            reread_last: true,
            rewrite_last: false,
            heartbeat_window: None,
        }
    }
}

impl HeartbeatAction {
    /// Heartbeat by re-reading only.
    pub fn reread() -> Self {
        Self::default()
    }

    /// Heartbeat by re-writing only.
    pub fn rewrite() -> Self {
        Self {
            reread_last: false,
            rewrite_last: true,
            heartbeat_window: None,
        }
    }

    /// Returns true if the action can never fire.
    pub fn is_empty(&self) -> bool {
        !self.reread_last && !self.rewrite_last && self.heartbeat_window.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;

    #[test]
    fn once_window_exhausts_after_issue() {
        let mut window = ReadWindow::once(0x40, 4).unwrap();
        assert!(window.can_be_used_for_read());

        window.set_read_issued();
        assert!(window.has_been_issued());
        assert!(!window.can_be_used_for_read());

        let fresh = window.fresh_copy();
        assert!(fresh.can_be_used_for_read());
        assert!(fresh.same_as(&window));
        assert_ne!(fresh, window);
    }

    #[test]
    fn repeat_window_stays_usable() {
        let mut window = ReadWindow::repeat(0x40, 22).unwrap();
        window.set_read_issued();
        assert!(window.can_be_used_for_read());
        assert!(window.is_compatible_with(0x40, 4));
    }

    #[test]
    fn containment_and_mode() {
        let outer = ReadWindow::repeat(0x40, 22).unwrap();
        let inner = ReadWindow::repeat(0x44, 2).unwrap();
        let inner_once = ReadWindow::once(0x44, 2).unwrap();

        assert!(outer.contains(&inner));
        assert!(outer.contains(&inner_once));
        assert!(outer.contains_with_same_mode(&inner));
        assert!(!outer.contains_with_same_mode(&inner_once));
        assert!(!inner.contains(&outer));
        assert_eq!(outer.end_register(), 0x56);
    }

    #[test]
    fn invalid_windows_are_rejected() {
        assert_eq!(ReadWindow::once(0x40, 0), Err(ClientError::ZeroLength));
        assert!(matches!(
            ReadWindow::repeat(0x00, 27),
            Err(ClientError::TooManyRegisters { .. })
        ));
        assert!(matches!(
            ReadWindow::repeat(0xF8, 9),
            Err(ClientError::RegisterOverflow { .. })
        ));
        assert_eq!(
            ReadWindow::from_range(0x40, 0x56, ReadMode::Once)
                .unwrap()
                .count(),
            22
        );
    }

    #[test]
    fn heartbeat_action_presets() {
        assert!(HeartbeatAction::default().reread_last);
        assert!(HeartbeatAction::rewrite().rewrite_last);
        assert!(!HeartbeatAction::rewrite().reread_last);
        assert!(
            HeartbeatAction {
                reread_last: false,
                rewrite_last: false,
                heartbeat_window: None
            }
            .is_empty()
        );
    }
}
