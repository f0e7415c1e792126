use std::{thread::ThreadId, time::Instant};

use crate::client::{
    HeartbeatPolicy, ModeCacheStatus, PendingWrite, ReadCacheStatus, ReadWindow, WriteCacheStatus,
};

/// Everything guarded by the inner lock.
///
/// Shared between client operations and the polling callback. Only the state
/// machine moves the statuses forward; client operations install windows,
/// stage writes and consume valid data.
#[derive(Debug)]
pub(crate) struct CacheState {
    /// Window the client wants mirrored.
    pub(crate) read_window: Option<ReadWindow>,
    /// Window whose data the read cache holds once valid. May be a superset
    /// of `read_window`.
    pub(crate) read_window_actually_read: Option<ReadWindow>,
    /// Window last programmed into the port header. Cleared when the header
    /// switches to write mode.
    pub(crate) read_window_sent: Option<ReadWindow>,
    /// Set by client operations that install a window, cleared by the state
    /// machine once it has acted on it.
    pub(crate) read_window_changed: bool,

    pub(crate) read_status: ReadCacheStatus,
    pub(crate) write_status: WriteCacheStatus,
    pub(crate) mode_status: ModeCacheStatus,

    /// Meaningful only while `write_status` is not idle.
    pub(crate) pending_write: PendingWrite,
    /// Last write drained to the device, for rewrite heartbeats.
    pub(crate) last_write: Option<PendingWrite>,

    /// When the read cache last became valid.
    pub(crate) capture_time: Instant,
    pub(crate) heartbeat: HeartbeatPolicy,

    pub(crate) armed: bool,
    /// Bumped on every disarm so a waiter spanning a disarm/arm pair still
    /// sees the cancellation.
    pub(crate) arm_epoch: u64,

    pub(crate) cycle_count: u64,
    pub(crate) callback_thread: Option<ThreadId>,
    pub(crate) logging: bool,
    pub(crate) logging_tag: String,
}

impl CacheState {
    pub(crate) fn new(read_window: Option<ReadWindow>, heartbeat: HeartbeatPolicy) -> Self {
        Self {
            read_window,
            read_window_actually_read: None,
            read_window_sent: None,
            read_window_changed: false,
            read_status: ReadCacheStatus::Idle,
            write_status: WriteCacheStatus::Idle,
            mode_status: ModeCacheStatus::Idle,
            pending_write: PendingWrite {
                first_register: 0,
                len: 0,
            },
            last_write: None,
            capture_time: Instant::now(),
            heartbeat,
            armed: false,
            arm_epoch: 0,
            cycle_count: 0,
            callback_thread: None,
            logging: false,
            logging_tag: String::from("I2cDeviceClient"),
        }
    }

    /// Installs `window` as the client's read window.
    pub(crate) fn install_read_window(&mut self, window: ReadWindow) {
        self.read_window = Some(window);
        self.read_window_changed = true;
    }

    /// Returns true while a staged write has not drained.
    pub(crate) fn write_in_flight(&self) -> bool {
        self.write_status != WriteCacheStatus::Idle
    }

    /// Returns true when the read cache holds data for the current window.
    pub(crate) fn read_ready(&self) -> bool {
        !self.read_window_changed && self.read_status.is_valid()
    }
}
