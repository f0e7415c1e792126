//! Keep-alive traffic for devices that time out when the bus goes quiet.
//!
//! Evaluated once per callback step rather than on a timer thread. A beat is
//! only considered on a step that arms nothing else.

use std::time::{Duration, Instant};

use crate::client::{HeartbeatAction, ReadCacheStatus, ReadWindow};

/// The keep-alive transaction chosen for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Beat {
    /// Re-arm the read already programmed into the port.
    Reread,
    /// Re-stage the last write.
    Rewrite,
    /// Read the heartbeat window.
    ReadWindow(ReadWindow),
}

/// What the state machine knows when a beat is due.
#[derive(Debug, Clone, Copy)]
pub struct BeatContext {
    pub read_status: ReadCacheStatus,
    pub port_in_read_mode: bool,
    pub read_window_sent: bool,
    pub has_last_write: bool,
}

#[derive(Debug, Clone)]
pub struct HeartbeatPolicy {
    interval: Duration,
    action: HeartbeatAction,
    last_beat: Instant,
}

impl HeartbeatPolicy {
    /// A disabled policy with the default action.
    pub fn new() -> Self {
        Self {
            interval: Duration::ZERO,
            action: HeartbeatAction::default(),
            last_beat: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sets the idle time after which a beat is due. Zero disables heartbeats.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn action(&self) -> &HeartbeatAction {
        &self.action
    }

    pub fn set_action(&mut self, action: HeartbeatAction) {
        self.action = action;
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Returns true if the bus has been idle for at least the interval.
    pub fn is_due(&self, now: Instant) -> bool {
        self.is_enabled() && now.saturating_duration_since(self.last_beat) >= self.interval
    }

    /// Restarts the idle timer.
    pub fn restart(&mut self, now: Instant) {
        self.last_beat = now;
    }

    /// Picks the first applicable action for a quiet step.
    ///
    /// Only beats on an idle read cache. Any other status belongs to a read a
    /// caller may be waiting on: a rewrite would discard it and a reread would
    /// refresh its bytes without a new capture time.
    pub fn choose(&self, ctx: BeatContext) -> Option<Beat> {
        if ctx.read_status != ReadCacheStatus::Idle {
            return None;
        }

        if self.action.reread_last && ctx.port_in_read_mode && ctx.read_window_sent {
            return Some(Beat::Reread);
        }
        if self.action.rewrite_last && ctx.has_last_write {
            return Some(Beat::Rewrite);
        }
        self.action
            .heartbeat_window
            .as_ref()
            .map(|window| Beat::ReadWindow(window.fresh_copy()))
    }
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> BeatContext {
        BeatContext {
            read_status: ReadCacheStatus::Idle,
            port_in_read_mode: false,
            read_window_sent: false,
            has_last_write: false,
        }
    }

    #[test]
    fn disabled_policy_is_never_due() {
        let policy = HeartbeatPolicy::new();
        assert!(!policy.is_due(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn due_after_interval() {
        let mut policy = HeartbeatPolicy::new();
        let start = Instant::now();
        policy.restart(start);
        policy.set_interval(Duration::from_millis(100));

        assert!(!policy.is_due(start + Duration::from_millis(99)));
        assert!(policy.is_due(start + Duration::from_millis(100)));

        policy.restart(start + Duration::from_millis(100));
        assert!(!policy.is_due(start + Duration::from_millis(150)));
    }

    #[test]
    fn reread_needs_port_in_read_mode() {
        let policy = HeartbeatPolicy::new();
        assert_eq!(policy.choose(quiet()), None);

        let ctx = BeatContext {
            port_in_read_mode: true,
            read_window_sent: true,
            ..quiet()
        };
        assert_eq!(policy.choose(ctx), Some(Beat::Reread));
    }

    #[test]
    fn actions_are_tried_in_order() {
        let window = ReadWindow::once(0x4C, 1).unwrap();
        let mut policy = HeartbeatPolicy::new();
        policy.set_action(HeartbeatAction {
            reread_last: true,
            rewrite_last: true,
            heartbeat_window: Some(window.clone()),
        });

        // Port in write mode with a previous write: rewrite wins over the window
        let ctx = BeatContext {
            has_last_write: true,
            ..quiet()
        };
        assert_eq!(policy.choose(ctx), Some(Beat::Rewrite));

        // Nothing written yet: fall back to the heartbeat window
        assert_eq!(policy.choose(quiet()), Some(Beat::ReadWindow(window)));
    }

    #[test]
    fn never_beats_over_a_live_read() {
        let mut policy = HeartbeatPolicy::new();
        policy.set_action(HeartbeatAction {
            reread_last: true,
            rewrite_last: true,
            heartbeat_window: None,
        });

        for status in [
            ReadCacheStatus::SwitchingToReadMode,
            ReadCacheStatus::Queued,
            ReadCacheStatus::ValidQueued,
            ReadCacheStatus::ValidOnce,
        ] {
            let ctx = BeatContext {
                read_status: status,
                port_in_read_mode: true,
                read_window_sent: true,
                has_last_write: true,
            };
            assert_eq!(policy.choose(ctx), None, "{status:?}");
        }
    }

    #[test]
    fn heartbeat_window_waits_for_idle_cache() {
        let mut policy = HeartbeatPolicy::new();
        policy.set_action(HeartbeatAction {
            reread_last: false,
            rewrite_last: false,
            heartbeat_window: Some(ReadWindow::once(0x4C, 1).unwrap()),
        });

        let ctx = BeatContext {
            read_status: ReadCacheStatus::ValidOnce,
            ..quiet()
        };
        assert_eq!(policy.choose(ctx), None);
    }
}
