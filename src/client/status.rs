/// What is known about the contents of the read cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadCacheStatus {
    /// Quiescent; the cache holds no valid data.
    #[default]
    Idle,
    /// The port has been asked to switch into read mode.
    SwitchingToReadMode,
    /// A read has been armed but its data has not been seen yet.
    Queued,
    /// An armed read just completed. Only visible inside a callback step.
    QueueCompleted,
    /// The cache holds valid data that may be consumed once.
    ValidOnce,
    /// The cache holds valid data and another read is armed.
    ValidQueued,
}

impl ReadCacheStatus {
    /// Returns true if the cache holds data a caller may return.
    #[inline]
    pub fn is_valid(self) -> bool {
        matches!(self, ReadCacheStatus::ValidOnce | ReadCacheStatus::ValidQueued)
    }

    /// Returns true if a read is armed on the port.
    #[inline]
    pub fn is_queued(self) -> bool {
        matches!(self, ReadCacheStatus::Queued | ReadCacheStatus::ValidQueued)
    }

    /// Short name used in cycle logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ReadCacheStatus::Idle => "Idle",
            ReadCacheStatus::SwitchingToReadMode => "Switching",
            ReadCacheStatus::Queued => "Queued",
            ReadCacheStatus::QueueCompleted => "Completed",
            ReadCacheStatus::ValidOnce => "ValidOnce",
            ReadCacheStatus::ValidQueued => "ValidQueued",
        }
    }
}

/// What is known about the payload of the write cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteCacheStatus {
    /// Quiescent.
    #[default]
    Idle,
    /// A client staged bytes that have not been sent.
    Dirty,
    /// The port is sending the staged bytes.
    Queued,
}

impl WriteCacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteCacheStatus::Idle => "Idle",
            WriteCacheStatus::Dirty => "Dirty",
            WriteCacheStatus::Queued => "Queued",
        }
    }
}

/// What is known about the control header of the write cache.
///
/// Tracked independently of the payload, for consistency checks only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeCacheStatus {
    /// Quiescent.
    #[default]
    Idle,
    /// The header changed and must be pushed.
    Dirty,
    /// The header was pushed and has not come back yet.
    Queued,
}

/// Where the next drained write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWrite {
    pub first_register: u8,
    pub len: usize,
}
