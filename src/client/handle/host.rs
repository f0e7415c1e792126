use std::{
    sync::Arc,
    thread::ThreadId,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::client::{
    ClientConfig, ClientError, ClientResult, HeartbeatAction, PendingWrite, Port, ReadCacheStatus,
    ReadWindow, RegisterBytes, TimestampedData, WriteCacheStatus,
    handle::{PortReadyCallback, Shared},
    heartbeat::HeartbeatPolicy,
    helpers::{MAX_REGISTER_COUNT, cache_span, register_span},
    lock::{ClientLocks, StateGuard},
    machine,
    negotiate::{negotiate_ensure, negotiate_read, negotiate_set},
    slice::RegisterViewMut,
    state::CacheState,
};

/// Blocking register reads and writes against one device behind a [`Port`].
///
/// Any number of threads may share a client; top-level operations are
/// serialized. Nothing moves until the client is [armed](Self::arm), after
/// which the port's polling callback advances the caches once per cycle and
/// wakes blocked callers.
///
/// Reads return data captured after every write staged before them. Dropping
/// the client disarms it.
pub struct I2cDeviceClient<P: Port> {
    pub(crate) shared: Arc<Shared<P>>,
}

impl<P: Port> core::fmt::Debug for I2cDeviceClient<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("I2cDeviceClient")
            .field("device", &self.shared.port.device_name())
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

impl<P: Port> I2cDeviceClient<P> {
    /// Creates an unarmed client from stored configuration.
    pub fn with_config(port: Arc<P>, config: ClientConfig) -> Self {
        port.set_address(config.address);

        let mut heartbeat = HeartbeatPolicy::new();
        heartbeat.set_interval(config.heartbeat_interval);
        heartbeat.set_action(config.heartbeat_action);

        let mut state = CacheState::new(config.read_window.map(|w| w.fresh_copy()), heartbeat);
        state.logging = config.logging;
        if let Some(tag) = config.logging_tag {
            state.logging_tag = tag;
        }

        Self {
            shared: Arc::new(Shared {
                port,
                locks: ClientLocks::new(state),
                arming: Mutex::new(()),
                wait_timeout: config.wait_timeout,
            }),
        }
    }

    /// The port this client drives.
    pub fn port(&self) -> &Arc<P> {
        &self.shared.port
    }

    pub fn device_name(&self) -> &str {
        self.shared.port.device_name()
    }

    // ---------------------------------------------------------------------------------------------
    // Arming
    // ---------------------------------------------------------------------------------------------

    /// Attaches to the port's polling callback. Does nothing if already armed.
    pub fn arm(&self) {
        let _arming = self.shared.arming.lock();
        let newly_armed = self.with_state(|state| {
            if state.armed {
                return false;
            }
            state.armed = true;
            state.callback_thread = None;
            true
        });
        if !newly_armed {
            return;
        }

        let mut callback = PortReadyCallback::new(&self.shared);
        self.shared
            .port
            .register_ready_callback(Box::new(move || callback.port_is_ready()));
        tracing::debug!(device = self.device_name(), "client armed");
    }

    /// Detaches from the port's polling callback.
    ///
    /// Idempotent. Every caller blocked in a read or write wakes up. Reads and
    /// writes that have not staged their bytes fail with
    /// [`ClientError::Cancelled`]; writes already staged return quietly.
    pub fn disarm(&self) {
        let _arming = self.shared.arming.lock();
        let was_armed = self.with_state(|state| {
            if !state.armed {
                return false;
            }
            state.armed = false;
            state.arm_epoch += 1;
            state.notify_all();
            true
        });
        if !was_armed {
            return;
        }

        self.shared.port.deregister_ready_callback();
        tracing::debug!(device = self.device_name(), "client disarmed");
    }

    /// Same as [`disarm`](Self::disarm).
    pub fn close(&self) {
        self.disarm();
    }

    pub fn is_armed(&self) -> bool {
        self.with_state(|state| state.armed)
    }

    // ---------------------------------------------------------------------------------------------
    // Read windows
    // ---------------------------------------------------------------------------------------------

    /// Installs `window` unless an identical, still usable window is installed.
    pub fn set_read_window(&self, window: &ReadWindow) {
        let mut client = self.shared.locks.client();
        let mut state = client.state();
        if let Some(window) = negotiate_set(state.read_window.as_ref(), window).into_window() {
            tracing::trace!(?window, "read window replaced");
            state.install_read_window(window);
        }
    }

    /// Installs `to_set` unless the current window already covers `needed`
    /// in the same mode.
    pub fn ensure_read_window(&self, needed: &ReadWindow, to_set: &ReadWindow) {
        let mut client = self.shared.locks.client();
        let mut state = client.state();
        if let Some(window) =
            negotiate_ensure(state.read_window.as_ref(), needed, to_set).into_window()
        {
            tracing::trace!(?window, "read window replaced");
            state.install_read_window(window);
        }
    }

    /// The installed read window, if any.
    pub fn read_window(&self) -> Option<ReadWindow> {
        self.with_state(|state| state.read_window.clone())
    }

    // ---------------------------------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------------------------------

    /// Reads one register.
    pub fn read8(&self, register: u8) -> ClientResult<u8> {
        let result = self.read_timestamped(register, 1)?;
        result
            .data
            .first()
            .copied()
            .ok_or(ClientError::Inconsistent("single register read returned no data"))
    }

    /// Reads `count` consecutive registers.
    pub fn read(&self, register: u8, count: usize) -> ClientResult<RegisterBytes> {
        Ok(self.read_timestamped(register, count)?.data)
    }

    /// Reads `count` consecutive registers along with their capture time.
    ///
    /// Blocks until no write is pending and the read cache holds valid data
    /// covering the request. If the installed window cannot serve the
    /// request, a one-shot window over exactly the requested registers is
    /// installed in its place.
    ///
    /// # Errors
    /// * [`ClientError::OutOfRange`] if a usable window is installed that does
    ///   not cover the request
    /// * [`ClientError::Cancelled`] if the client is or becomes unarmed
    /// * [`ClientError::TimedOut`] if the configured wait timeout elapses
    pub fn read_timestamped(&self, register: u8, count: usize) -> ClientResult<TimestampedData> {
        register_span(register, count)?;

        let mut client = self.shared.locks.client();
        let mut state = client.state();
        let deadline = self.deadline();
        let epoch = state.arm_epoch;

        // Reads observe every write staged before them
        wait_while_armed(&mut state, deadline, epoch, |s| !s.write_in_flight())?;

        if let Some(window) =
            negotiate_read(state.read_window.as_ref(), register, count)?.into_window()
        {
            tracing::trace!(?window, "read window replaced");
            state.install_read_window(window);
        }

        let window = state
            .read_window
            .as_ref()
            .ok_or(ClientError::Inconsistent("no read window after negotiation"))?;
        if !window.contains_registers(register, count) {
            return Err(ClientError::OutOfRange {
                first_register: register,
                count,
                window_first: window.first_register(),
                window_count: window.count(),
            });
        }

        wait_while_armed(&mut state, deadline, epoch, CacheState::read_ready)?;

        let extracted = self.extract(&state, register, count);

        // Data from a one-shot read may be handed out only once
        if state.read_status == ReadCacheStatus::ValidOnce {
            state.read_status = ReadCacheStatus::Idle;
        }

        extracted
    }

    fn extract(
        &self,
        state: &CacheState,
        register: u8,
        count: usize,
    ) -> ClientResult<TimestampedData> {
        let actual = state
            .read_window_actually_read
            .as_ref()
            .ok_or(ClientError::Inconsistent("valid read cache without a source window"))?;

        let (start, end) = cache_span(actual.first_register(), actual.count(), register, count)
            .map_err(|_| {
                ClientError::Inconsistent("read cache does not hold the requested registers")
            })?;

        let data = self
            .shared
            .port
            .caches()
            .with_read_cache(|cache| RegisterBytes::from_slice(&cache[start..end]))
            .map_err(|_| ClientError::Inconsistent("read exceeds transaction size"))?;

        Ok(TimestampedData {
            data,
            first_register: register,
            capture_time: state.capture_time,
        })
    }

    // ---------------------------------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------------------------------

    /// Writes one register.
    pub fn write8(&self, register: u8, value: u8, wait: bool) -> ClientResult<()> {
        self.write(register, &[value], wait)
    }

    /// Writes consecutive registers starting at `register`.
    ///
    /// Blocks until any earlier write has been handed to the port, then stages
    /// `data`. With `wait`, also blocks until this write has been handed to
    /// the port. Once staged the bytes go out on a later cycle, so being
    /// disarmed or timing out during that second wait is logged and otherwise
    /// ignored.
    ///
    /// # Errors
    /// * Range errors if the register range is invalid
    /// * [`ClientError::Cancelled`] if the client is or becomes unarmed before
    ///   `data` could be staged
    /// * [`ClientError::TimedOut`] if the wait timeout elapses before `data`
    ///   could be staged
    pub fn write(&self, register: u8, data: &[u8], wait: bool) -> ClientResult<()> {
        register_span(register, data.len())?;

        let mut client = self.shared.locks.client();
        let mut state = client.state();
        let deadline = self.deadline();
        let epoch = state.arm_epoch;

        wait_while_armed(&mut state, deadline, epoch, |s| !s.write_in_flight())?;
        self.stage(&mut state, register, data);

        if wait {
            match wait_while_armed(&mut state, deadline, epoch, |s| !s.write_in_flight()) {
                Err(err) if err.is_interrupted() => {
                    tracing::warn!(
                        device = self.device_name(),
                        register,
                        len = data.len(),
                        %err,
                        "staged write not yet drained"
                    );
                }
                other => other?,
            }
        }
        Ok(())
    }

    /// Fills `count` registers starting at `first_register` through a
    /// register-addressed view, then writes them.
    ///
    /// The view starts zeroed.
    pub fn write_with<R>(
        &self,
        first_register: u8,
        count: usize,
        wait: bool,
        f: impl FnOnce(&mut RegisterViewMut<'_>) -> ClientResult<R>,
    ) -> ClientResult<R> {
        register_span(first_register, count)?;

        let mut scratch = [0u8; MAX_REGISTER_COUNT];
        let result = {
            let mut view = RegisterViewMut::new(first_register, &mut scratch[..count]);
            f(&mut view)?
        };
        self.write(first_register, &scratch[..count], wait)?;
        Ok(result)
    }

    fn stage(&self, state: &mut StateGuard<'_, CacheState>, register: u8, data: &[u8]) {
        state.pending_write = PendingWrite {
            first_register: register,
            len: data.len(),
        };
        state.write_status = WriteCacheStatus::Dirty;
        self.shared.port.caches().stage_payload(data);
        machine::on_new_data_to_write(state, &*self.shared.port);
    }

    // ---------------------------------------------------------------------------------------------
    // Heartbeat
    // ---------------------------------------------------------------------------------------------

    pub fn heartbeat_interval(&self) -> Duration {
        self.with_state(|state| state.heartbeat.interval())
    }

    /// Sets the bus idle time after which a heartbeat fires. Zero disables.
    pub fn set_heartbeat_interval(&self, interval: Duration) {
        self.with_state(|state| state.heartbeat.set_interval(interval));
    }

    pub fn heartbeat_action(&self) -> HeartbeatAction {
        self.with_state(|state| state.heartbeat.action().clone())
    }

    pub fn set_heartbeat_action(&self, action: HeartbeatAction) {
        self.with_state(|state| state.heartbeat.set_action(action));
    }

    /// Heartbeats by re-reading every `interval`.
    pub fn set_heartbeat_read(&self, interval: Duration) {
        self.with_state(|state| {
            state.heartbeat.set_action(HeartbeatAction::reread());
            state.heartbeat.set_interval(interval);
        });
    }

    /// Heartbeats by re-writing the last write every `interval`.
    pub fn set_heartbeat_write(&self, interval: Duration) {
        self.with_state(|state| {
            state.heartbeat.set_action(HeartbeatAction::rewrite());
            state.heartbeat.set_interval(interval);
        });
    }

    // ---------------------------------------------------------------------------------------------
    // Diagnostics
    // ---------------------------------------------------------------------------------------------

    /// Number of polling cycles seen since construction.
    pub fn cycle_count(&self) -> u64 {
        self.with_state(|state| state.cycle_count)
    }

    /// Thread driving the polling callback since the last arm, once known.
    pub fn callback_thread(&self) -> Option<ThreadId> {
        self.with_state(|state| state.callback_thread)
    }

    pub fn logging(&self) -> bool {
        self.with_state(|state| state.logging)
    }

    /// Turns the per-cycle debug trace on or off.
    pub fn set_logging(&self, enabled: bool) {
        self.with_state(|state| state.logging = enabled);
    }

    pub fn logging_tag(&self) -> String {
        self.with_state(|state| state.logging_tag.clone())
    }

    pub fn set_logging_tag(&self, tag: impl Into<String>) {
        let tag = tag.into();
        self.with_state(|state| state.logging_tag = tag);
    }

    /// Inner-lock bookkeeping that must not queue behind a blocked operation.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&mut StateGuard<'_, CacheState>) -> R,
    ) -> R {
        self.shared.locks.with_state(f)
    }

    fn deadline(&self) -> Option<Instant> {
        self.shared.wait_timeout.map(|timeout| Instant::now() + timeout)
    }
}

impl<P: Port> Drop for I2cDeviceClient<P> {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Waits for `ready`, failing with [`ClientError::Cancelled`] once the client
/// is disarmed or was re-armed since `epoch`.
fn wait_while_armed(
    state: &mut StateGuard<'_, CacheState>,
    deadline: Option<Instant>,
    epoch: u64,
    mut ready: impl FnMut(&CacheState) -> bool,
) -> ClientResult<()> {
    state.wait_for(deadline, |s| {
        if ready(s) {
            Ok(true)
        } else if !s.armed || s.arm_epoch != epoch {
            Err(ClientError::Cancelled)
        } else {
            Ok(false)
        }
    })
}
