//! The cache state machine.
//!
//! [`step`] runs once per polling cycle on the callback thread with the inner
//! lock held. It retires what the port just finished, chooses at most one new
//! transaction, optionally fires a heartbeat, then tells the port what to push
//! and pull before the next cycle.

use std::{fmt::Write as _, thread, time::Instant};

use crate::client::{
    ModeCacheStatus, Port, ReadCacheStatus, ReadWindow, WriteCacheStatus,
    heartbeat::{Beat, BeatContext},
    state::CacheState,
};

/// What a single step asks of the port.
#[derive(Debug, Default)]
struct StepActions {
    set_action_flag: bool,
    queue_full_write: bool,
    queue_read: bool,
    read_mode: Option<(u8, usize)>,
    write_mode: Option<(u8, usize)>,
    beat: Option<&'static str>,
}

/// Advances the state machine by one polling cycle.
pub(crate) fn step<P: Port + ?Sized>(state: &mut CacheState, port: &P, now: Instant) {
    record_callback_thread(state);
    state.cycle_count += 1;

    let mut actions = StepActions::default();
    let previous = (state.read_status, state.write_status);
    let heartbeat_due = state.heartbeat.is_due(now);

    retire_completed(state, now);

    debug_assert!(matches!(
        state.read_status,
        ReadCacheStatus::Idle
            | ReadCacheStatus::SwitchingToReadMode
            | ReadCacheStatus::ValidOnce
            | ReadCacheStatus::QueueCompleted
    ));
    debug_assert!(matches!(
        state.write_status,
        WriteCacheStatus::Idle | WriteCacheStatus::Dirty
    ));

    if state.read_status == ReadCacheStatus::SwitchingToReadMode {
        // Wait until the controller reports read mode, then arm the read
        if port.is_in_read_mode() {
            state.read_status = ReadCacheStatus::Queued;
            actions.set_action_flag = true;
        }
    } else if state.write_status == WriteCacheStatus::Dirty {
        issue_write(state, port, &mut actions);
        // Whatever the read cache held is stale once the header leaves read mode
        state.read_status = ReadCacheStatus::Idle;
    } else if state.read_status == ReadCacheStatus::Idle || state.read_window_changed {
        issue_read(state, port, &mut actions);
        state.read_window_changed = false;
    } else if state.read_status == ReadCacheStatus::QueueCompleted {
        if state
            .read_window
            .as_ref()
            .is_some_and(ReadWindow::can_be_used_for_read)
        {
            state.read_status = ReadCacheStatus::ValidQueued;
            actions.set_action_flag = true;
        } else {
            state.read_status = ReadCacheStatus::ValidOnce;
        }
    }

    // The read cache is refreshed every cycle regardless
    actions.queue_read = true;

    if actions.set_action_flag {
        state.heartbeat.restart(now);
    } else if heartbeat_due {
        fire_heartbeat(state, port, &mut actions, now);
    }

    if actions.set_action_flag {
        port.arm_action_flag();
    } else {
        port.clear_action_flag();
    }

    if actions.set_action_flag && !actions.queue_full_write {
        port.push_flag_to_device();
    } else if actions.queue_full_write {
        port.push_cache_to_device();
        if state.mode_status == ModeCacheStatus::Dirty {
            state.mode_status = ModeCacheStatus::Queued;
        }
    }

    if actions.queue_read {
        port.pull_cache_from_device();
    }

    if state.logging {
        log_step(state, previous, &actions);
    }
}

/// Hook for a client that just staged a write.
///
/// Pushing staged bytes out ahead of the next polling cycle would shave a
/// cycle off every write. Until that lands the write waits for the callback.
pub(crate) fn on_new_data_to_write<P: Port + ?Sized>(state: &CacheState, port: &P) {
    if state.callback_thread.is_some() && port.is_port_ready() {
        // TODO: drain the write immediately when the port is idle between cycles
    }
}

fn record_callback_thread(state: &mut CacheState) {
    let current = thread::current().id();
    match state.callback_thread {
        None => state.callback_thread = Some(current),
        Some(id) => debug_assert_eq!(id, current, "polling callback changed threads"),
    }
}

/// Retires the transactions the port completed during the last cycle.
fn retire_completed(state: &mut CacheState, now: Instant) {
    if state.mode_status == ModeCacheStatus::Queued {
        state.mode_status = ModeCacheStatus::Idle;
    }

    if state.read_status.is_queued() {
        state.read_status = ReadCacheStatus::QueueCompleted;
        state.capture_time = now;
    }

    if state.write_status == WriteCacheStatus::Queued {
        state.write_status = WriteCacheStatus::Idle;
        state.last_write = Some(state.pending_write);
    }
}

fn issue_write<P: Port + ?Sized>(state: &mut CacheState, port: &P, actions: &mut StepActions) {
    let pending = state.pending_write;
    state.write_status = WriteCacheStatus::Queued;
    port.enable_write_mode(pending.first_register, pending.len);
    actions.write_mode = Some((pending.first_register, pending.len));
    state.read_window_sent = None;

    actions.set_action_flag = true;
    actions.queue_full_write = true;
    dirty_mode(state);
}

fn issue_read<P: Port + ?Sized>(state: &mut CacheState, port: &P, actions: &mut StepActions) {
    let window = match state.read_window.as_mut() {
        Some(window) if window.can_be_used_for_read() => {
            window.set_read_issued();
            window.clone()
        }
        _ => {
            state.read_status = ReadCacheStatus::Idle;
            return;
        }
    };

    let covered_by_sent = state
        .read_window_sent
        .as_ref()
        .is_some_and(|sent| sent.contains(&window));

    if covered_by_sent && port.is_in_read_mode() {
        // The port already reads a superset; arm it again without a switch
        state.read_window_actually_read = state.read_window_sent.clone();
        state.read_status = ReadCacheStatus::Queued;
        actions.set_action_flag = true;
    } else {
        switch_to_read_mode(state, port, actions, &window);
        state.read_window_actually_read = Some(window);
        state.read_status = ReadCacheStatus::SwitchingToReadMode;
    }
}

fn switch_to_read_mode<P: Port + ?Sized>(
    state: &mut CacheState,
    port: &P,
    actions: &mut StepActions,
    window: &ReadWindow,
) {
    port.enable_read_mode(window.first_register(), window.count());
    actions.read_mode = Some((window.first_register(), window.count()));
    state.read_window_sent = Some(window.clone());

    actions.set_action_flag = true;
    actions.queue_full_write = true;
    dirty_mode(state);
}

fn dirty_mode(state: &mut CacheState) {
    debug_assert_eq!(state.mode_status, ModeCacheStatus::Idle);
    state.mode_status = ModeCacheStatus::Dirty;
}

fn fire_heartbeat<P: Port + ?Sized>(
    state: &mut CacheState,
    port: &P,
    actions: &mut StepActions,
    now: Instant,
) {
    let ctx = BeatContext {
        read_status: state.read_status,
        port_in_read_mode: port.is_in_read_mode(),
        read_window_sent: state.read_window_sent.is_some(),
        has_last_write: state.last_write.is_some(),
    };

    let Some(beat) = state.heartbeat.choose(ctx) else {
        return;
    };

    match beat {
        Beat::Reread => {
            actions.set_action_flag = true;
            actions.beat = Some("reread");
        }
        Beat::Rewrite => {
            if let Some(last) = state.last_write {
                // Payload bytes are still in the write cache behind the header
                state.pending_write = last;
                state.write_status = WriteCacheStatus::Dirty;
                actions.beat = Some("rewrite");
            }
        }
        Beat::ReadWindow(window) => {
            // Read statuses stay idle: nobody is waiting on this data
            switch_to_read_mode(state, port, actions, &window);
            actions.beat = Some("window");
        }
    }

    state.heartbeat.restart(now);
}

fn log_step(
    state: &CacheState,
    previous: (ReadCacheStatus, WriteCacheStatus),
    actions: &StepActions,
) {
    let mut line = String::new();
    let _ = write!(
        line,
        "cyc {}|{}|{}|{}|",
        state.cycle_count,
        if actions.set_action_flag { "flag" } else { "    " },
        if actions.queue_full_write { "f" } else { " " },
        if actions.queue_read { "r" } else { " " },
    );
    if previous.0 != state.read_status {
        let _ = write!(
            line,
            " R.{}->{}|",
            previous.0.as_str(),
            state.read_status.as_str()
        );
    }
    if previous.1 != state.write_status {
        let _ = write!(
            line,
            " W.{}->{}|",
            previous.1.as_str(),
            state.write_status.as_str()
        );
    }
    if let Some((first, count)) = actions.write_mode {
        let _ = write!(line, " setWrite({first:#04x},{count})|");
    }
    if let Some((first, count)) = actions.read_mode {
        let _ = write!(line, " setRead({first:#04x},{count})|");
    }
    if let Some(beat) = actions.beat {
        let _ = write!(line, " beat({beat})|");
    }

    tracing::debug!(target: "i2c_device_client::cycle", tag = %state.logging_tag, "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        HeartbeatAction, PendingWrite,
        heartbeat::HeartbeatPolicy,
        port::{CACHE_HEADER_LEN, CacheHeader, MODE_WRITE},
        sim::{SimulatedPort, Transaction},
        test_support::{loaded_port, stepped_state},
    };
    use std::time::Duration;

    fn cycle(state: &mut CacheState, port: &SimulatedPort) {
        port.cycle_with(|port| step(state, port, Instant::now()));
    }

    fn stage(state: &mut CacheState, port: &SimulatedPort, first: u8, data: &[u8]) {
        state.pending_write = PendingWrite {
            first_register: first,
            len: data.len(),
        };
        state.write_status = WriteCacheStatus::Dirty;
        port.caches().stage_payload(data);
    }

    #[test]
    fn repeat_window_becomes_valid_after_switch() {
        let port = loaded_port();
        let mut state = stepped_state(Some(ReadWindow::repeat(0x40, 22).unwrap()));

        cycle(&mut state, &port);
        assert_eq!(state.read_status, ReadCacheStatus::SwitchingToReadMode);
        assert_eq!(state.mode_status, ModeCacheStatus::Queued);
        let sent = state.read_window_sent.as_ref().unwrap();
        assert!(sent.same_as(&ReadWindow::repeat(0x40, 22).unwrap()));

        cycle(&mut state, &port);
        assert_eq!(state.read_status, ReadCacheStatus::Queued);
        assert_eq!(state.mode_status, ModeCacheStatus::Idle);

        let before = Instant::now();
        cycle(&mut state, &port);
        assert_eq!(state.read_status, ReadCacheStatus::ValidQueued);
        assert!(state.capture_time >= before);

        port.caches().with_read_cache(|cache| {
            assert_eq!(cache[CACHE_HEADER_LEN], 0x40);
            assert_eq!(cache[CACHE_HEADER_LEN + 21], 0x55);
        });

        // Repeating windows keep reading every cycle
        cycle(&mut state, &port);
        assert_eq!(state.read_status, ReadCacheStatus::ValidQueued);
    }

    #[test]
    fn once_window_settles_in_valid_once() {
        let port = loaded_port();
        let mut state = stepped_state(Some(ReadWindow::once(0x40, 4).unwrap()));

        for _ in 0..3 {
            cycle(&mut state, &port);
        }
        assert_eq!(state.read_status, ReadCacheStatus::ValidOnce);
        assert!(!state.read_window.as_ref().unwrap().can_be_used_for_read());

        let reads = port.device(|dev| dev.read_transactions());
        cycle(&mut state, &port);
        cycle(&mut state, &port);
        assert_eq!(state.read_status, ReadCacheStatus::ValidOnce);
        assert_eq!(port.device(|dev| dev.read_transactions()), reads);
    }

    #[test]
    fn fresh_window_inside_sent_window_skips_switch() {
        let port = loaded_port();
        let mut state = stepped_state(Some(ReadWindow::once(0x40, 8).unwrap()));
        for _ in 0..3 {
            cycle(&mut state, &port);
        }
        assert_eq!(state.read_status, ReadCacheStatus::ValidOnce);

        // Consume, then ask for a sub-range
        state.read_status = ReadCacheStatus::Idle;
        state.install_read_window(ReadWindow::once(0x42, 2).unwrap());

        cycle(&mut state, &port);
        assert_eq!(state.read_status, ReadCacheStatus::Queued);
        assert!(
            state
                .read_window_actually_read
                .as_ref()
                .unwrap()
                .same_as(&ReadWindow::once(0x40, 8).unwrap())
        );
        assert_eq!(state.mode_status, ModeCacheStatus::Idle);

        cycle(&mut state, &port);
        assert_eq!(state.read_status, ReadCacheStatus::ValidOnce);
    }

    #[test]
    fn staged_write_preempts_reads() {
        let port = loaded_port();
        let mut state = stepped_state(Some(ReadWindow::repeat(0x40, 22).unwrap()));
        for _ in 0..3 {
            cycle(&mut state, &port);
        }
        assert_eq!(state.read_status, ReadCacheStatus::ValidQueued);

        stage(&mut state, &port, 0x45, &[0x64]);
        cycle(&mut state, &port);
        assert_eq!(state.write_status, WriteCacheStatus::Queued);
        assert_eq!(state.read_status, ReadCacheStatus::Idle);
        assert_eq!(state.read_window_sent, None);
        let header = port.caches().with_write_cache(CacheHeader::parse);
        assert_eq!(header.mode, MODE_WRITE);
        assert_eq!((header.first_register, header.count), (0x45, 1));

        // The write drains, then the repeating window switches back in
        cycle(&mut state, &port);
        assert_eq!(state.write_status, WriteCacheStatus::Idle);
        assert_eq!(state.read_status, ReadCacheStatus::SwitchingToReadMode);
        assert_eq!(port.device(|dev| dev.register(0x45)), 0x64);
        assert_eq!(
            state.last_write,
            Some(PendingWrite {
                first_register: 0x45,
                len: 1
            })
        );

        cycle(&mut state, &port);
        cycle(&mut state, &port);
        assert_eq!(state.read_status, ReadCacheStatus::ValidQueued);
        port.caches()
            .with_read_cache(|cache| assert_eq!(cache[CACHE_HEADER_LEN + 5], 0x64));
    }

    #[test]
    fn no_window_stays_idle() {
        let port = loaded_port();
        let mut state = stepped_state(None);
        for _ in 0..4 {
            cycle(&mut state, &port);
        }
        assert_eq!(state.read_status, ReadCacheStatus::Idle);
        assert_eq!(state.mode_status, ModeCacheStatus::Idle);
        assert!(port.device(|dev| dev.transactions().is_empty()));
        assert_eq!(state.cycle_count, 4);
    }

    #[test]
    fn reread_heartbeat_rearms_last_read() {
        let port = loaded_port();
        let mut state = stepped_state(Some(ReadWindow::once(0x40, 4).unwrap()));
        for _ in 0..3 {
            cycle(&mut state, &port);
        }
        // Consumed by a caller
        state.read_status = ReadCacheStatus::Idle;
        cycle(&mut state, &port);

        let mut policy = HeartbeatPolicy::new();
        policy.set_interval(Duration::from_millis(5));
        policy.restart(Instant::now());
        state.heartbeat = policy;

        let reads = port.device(|dev| dev.read_transactions());
        std::thread::sleep(Duration::from_millis(10));
        cycle(&mut state, &port);
        assert!(port.caches().action_flag());
        assert_eq!(state.read_status, ReadCacheStatus::Idle);

        cycle(&mut state, &port);
        assert_eq!(port.device(|dev| dev.read_transactions()), reads + 1);
        assert_eq!(state.read_status, ReadCacheStatus::Idle);
    }

    #[test]
    fn rewrite_heartbeat_repeats_last_write() {
        let port = loaded_port();
        let mut state = stepped_state(None);

        stage(&mut state, &port, 0x41, &[0x11, 0x22]);
        cycle(&mut state, &port);
        cycle(&mut state, &port);
        assert_eq!(state.write_status, WriteCacheStatus::Idle);

        let mut policy = HeartbeatPolicy::new();
        policy.set_interval(Duration::from_millis(5));
        policy.set_action(HeartbeatAction::rewrite());
        policy.restart(Instant::now());
        state.heartbeat = policy;

        std::thread::sleep(Duration::from_millis(10));
        cycle(&mut state, &port);
        assert_eq!(state.write_status, WriteCacheStatus::Dirty);
        cycle(&mut state, &port);
        cycle(&mut state, &port);
        assert_eq!(state.write_status, WriteCacheStatus::Idle);

        let writes: Vec<_> = port.device(|dev| {
            dev.transactions()
                .iter()
                .filter(|t| matches!(t, Transaction::Write { .. }))
                .cloned()
                .collect()
        });
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], writes[1]);
    }

    #[test]
    fn heartbeat_window_reads_without_touching_client_window() {
        let port = loaded_port();
        let mut state = stepped_state(None);

        let mut policy = HeartbeatPolicy::new();
        policy.set_interval(Duration::from_millis(5));
        policy.set_action(HeartbeatAction {
            reread_last: false,
            rewrite_last: false,
            heartbeat_window: Some(ReadWindow::once(0x4C, 1).unwrap()),
        });
        policy.restart(Instant::now());
        state.heartbeat = policy;

        std::thread::sleep(Duration::from_millis(10));
        cycle(&mut state, &port);
        assert_eq!(state.read_window, None);
        assert_eq!(state.read_status, ReadCacheStatus::Idle);
        assert_eq!(state.mode_status, ModeCacheStatus::Queued);

        cycle(&mut state, &port);
        assert_eq!(
            port.device(|dev| dev.transactions().last().cloned()),
            Some(Transaction::Read {
                first_register: 0x4C,
                count: 1
            })
        );
        assert_eq!(state.read_status, ReadCacheStatus::Idle);
    }

    #[test]
    fn heartbeat_holds_off_until_one_shot_data_is_consumed() {
        let port = loaded_port();
        let mut state = stepped_state(Some(ReadWindow::once(0x40, 4).unwrap()));
        state.last_write = Some(PendingWrite {
            first_register: 0x41,
            len: 1,
        });
        let mut policy = HeartbeatPolicy::new();
        policy.set_interval(Duration::from_millis(1));
        policy.set_action(HeartbeatAction {
            reread_last: true,
            rewrite_last: true,
            heartbeat_window: None,
        });
        state.heartbeat = policy;

        for _ in 0..3 {
            cycle(&mut state, &port);
        }
        assert_eq!(state.read_status, ReadCacheStatus::ValidOnce);
        let captured = state.capture_time;
        let reads = port.device(|dev| dev.read_transactions());

        // Neither a rewrite nor a reread may touch data a caller has not taken
        for _ in 0..6 {
            std::thread::sleep(Duration::from_millis(2));
            cycle(&mut state, &port);
            assert_eq!(state.read_status, ReadCacheStatus::ValidOnce);
            assert_eq!(state.write_status, WriteCacheStatus::Idle);
            assert!(!port.caches().action_flag());
        }
        assert_eq!(state.capture_time, captured);
        assert_eq!(port.device(|dev| dev.read_transactions()), reads);

        state.read_status = ReadCacheStatus::Idle;
        std::thread::sleep(Duration::from_millis(2));
        cycle(&mut state, &port);
        assert!(port.caches().action_flag());
    }

    #[test]
    fn busy_steps_postpone_heartbeat() {
        let port = loaded_port();
        let mut state = stepped_state(Some(ReadWindow::repeat(0x40, 4).unwrap()));
        let mut policy = HeartbeatPolicy::new();
        policy.set_interval(Duration::from_millis(1));
        policy.set_action(HeartbeatAction::rewrite());
        state.heartbeat = policy;
        state.last_write = Some(PendingWrite {
            first_register: 0x41,
            len: 1,
        });

        // Every step arms a read, so the rewrite never fires
        for _ in 0..6 {
            std::thread::sleep(Duration::from_millis(2));
            cycle(&mut state, &port);
            assert_ne!(state.write_status, WriteCacheStatus::Dirty);
        }
    }
}
