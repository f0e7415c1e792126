//! An in-memory port driving a simulated register device.
//!
//! Models the controller the client talks to: pushes land in a controller
//! buffer at the start of the next cycle, an armed action flag runs one bus
//! transaction against a [`SimDevice`], and pulls copy the controller buffer
//! back into the read cache. The ready callback fires last. Cycles are driven
//! by hand with [`SimulatedPort::cycle`] or by a background thread from
//! [`SimulatedPort::spawn_polling`].

use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use bitmaps::Bitmap;
use parking_lot::Mutex;

use crate::client::{
    RegisterBytes,
    helpers::{MAX_REGISTER_COUNT, REGISTER_SPACE},
    port::{
        ACTION_FLAG_OFFSET, ACTION_FLAG_SET, CACHE_HEADER_LEN, CACHE_SIZE, CacheHeader, Port,
        PortCaches, ReadyCallback,
    },
};

/// A bus transaction the simulated device has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Read { first_register: u8, count: usize },
    Write { first_register: u8, data: RegisterBytes },
}

/// A 256-register device on the simulated bus.
#[derive(Debug, Clone)]
pub struct SimDevice {
    registers: [u8; REGISTER_SPACE],
    written: Bitmap<REGISTER_SPACE>,
    tick_register: Option<u8>,
    transactions: Vec<Transaction>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    /// A device with every register zeroed.
    pub fn new() -> Self {
        Self {
            registers: [0; REGISTER_SPACE],
            written: Bitmap::new(),
            tick_register: None,
            transactions: Vec::new(),
        }
    }

    /// Makes `register` count bus reads, like a free-running sample counter.
    pub fn with_tick_register(mut self, register: u8) -> Self {
        self.tick_register = Some(register);
        self
    }

    pub fn register(&self, register: u8) -> u8 {
        self.registers[register as usize]
    }

    pub fn registers(&self) -> &[u8; REGISTER_SPACE] {
        &self.registers
    }

    /// Changes registers from the device side, as its own firmware would.
    ///
    /// Bytes past register 0xFF are dropped.
    pub fn set_registers(&mut self, first_register: u8, data: &[u8]) {
        let start = first_register as usize;
        let end = (start + data.len()).min(REGISTER_SPACE);
        self.registers[start..end].copy_from_slice(&data[..end - start]);
    }

    /// Returns true if a bus write has touched `register`.
    pub fn was_written(&self, register: u8) -> bool {
        self.written.get(register as usize)
    }

    /// Visits every register touched by a bus write, in ascending order.
    pub fn for_each_written(&self, mut f: impl FnMut(u8, u8)) {
        let mut next = self.written.first_index();
        while let Some(index) = next {
            f(index as u8, self.registers[index]);
            next = self.written.next_index(index);
        }
    }

    /// Forgets which registers were written.
    pub fn clear_written(&mut self) {
        self.written = Bitmap::new();
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of bus reads served so far.
    pub fn read_transactions(&self) -> usize {
        self.transactions
            .iter()
            .filter(|t| matches!(t, Transaction::Read { .. }))
            .count()
    }

    fn bus_read(&mut self, first_register: u8, out: &mut [u8]) {
        if let Some(tick) = self.tick_register {
            self.registers[tick as usize] = self.registers[tick as usize].wrapping_add(1);
        }
        let start = first_register as usize;
        let end = (start + out.len()).min(REGISTER_SPACE);
        out[..end - start].copy_from_slice(&self.registers[start..end]);
        self.transactions.push(Transaction::Read {
            first_register,
            count: out.len(),
        });
    }

    fn bus_write(&mut self, first_register: u8, data: &[u8]) {
        let start = first_register as usize;
        let end = (start + data.len()).min(REGISTER_SPACE);
        self.registers[start..end].copy_from_slice(&data[..end - start]);
        for index in start..end {
            self.written.set(index, true);
        }
        let mut logged = RegisterBytes::new();
        let _ = logged.extend_from_slice(&data[..(end - start).min(MAX_REGISTER_COUNT)]);
        self.transactions.push(Transaction::Write {
            first_register,
            data: logged,
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum Push {
    Full([u8; CACHE_SIZE]),
    FlagOnly(u8),
}

#[derive(Debug)]
struct Controller {
    buffer: [u8; CACHE_SIZE],
    push: Option<Push>,
    pull: bool,
    device: SimDevice,
}

impl Controller {
    fn apply_push(&mut self) {
        match self.push.take() {
            Some(Push::Full(snapshot)) => self.buffer = snapshot,
            Some(Push::FlagOnly(flag)) => self.buffer[ACTION_FLAG_OFFSET] = flag,
            None => {}
        }
    }

    fn run_transaction(&mut self) {
        if self.buffer[ACTION_FLAG_OFFSET] != ACTION_FLAG_SET {
            return;
        }
        let header = CacheHeader::parse(&self.buffer);
        let count = header.count.min(MAX_REGISTER_COUNT);
        let payload = CACHE_HEADER_LEN..CACHE_HEADER_LEN + count;

        if header.is_read() {
            let mut out = [0u8; MAX_REGISTER_COUNT];
            self.device.bus_read(header.first_register, &mut out[..count]);
            self.buffer[payload].copy_from_slice(&out[..count]);
        } else {
            let mut data = [0u8; MAX_REGISTER_COUNT];
            data[..count].copy_from_slice(&self.buffer[payload]);
            self.device.bus_write(header.first_register, &data[..count]);
        }
        tracing::trace!(
            read = header.is_read(),
            first_register = header.first_register,
            count,
            "simulated bus transaction"
        );
        self.buffer[ACTION_FLAG_OFFSET] = 0;
    }
}

/// A [`Port`] whose controller and device live in memory.
pub struct SimulatedPort {
    name: String,
    caches: PortCaches,
    controller: Mutex<Controller>,
    callback: Mutex<Option<ReadyCallback>>,
    ready: AtomicBool,
    cycles: AtomicU64,
}

impl core::fmt::Debug for SimulatedPort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedPort")
            .field("name", &self.name)
            .field("cycles", &self.cycles())
            .finish_non_exhaustive()
    }
}

impl SimulatedPort {
    pub fn new(name: impl Into<String>, device: SimDevice) -> Self {
        Self {
            name: name.into(),
            caches: PortCaches::new(),
            controller: Mutex::new(Controller {
                buffer: [0; CACHE_SIZE],
                push: None,
                pull: false,
                device,
            }),
            callback: Mutex::new(None),
            ready: AtomicBool::new(true),
            cycles: AtomicU64::new(0),
        }
    }

    /// Runs `f` over the simulated device.
    pub fn device<R>(&self, f: impl FnOnce(&mut SimDevice) -> R) -> R {
        f(&mut self.controller.lock().device)
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Returns true while a ready callback is registered.
    pub fn has_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Runs one polling cycle and fires the registered callback.
    pub fn cycle(&self) {
        self.transfer();
        let mut callback = self.callback.lock();
        if let Some(callback) = callback.as_mut() {
            callback();
        }
    }

    /// Runs one polling cycle, handing the port to `ready` instead of the
    /// registered callback.
    pub fn cycle_with(&self, ready: impl FnOnce(&Self)) {
        self.transfer();
        ready(self);
    }

    /// Cycles the port every `period` on a background thread.
    pub fn spawn_polling(self: &Arc<Self>, period: Duration) -> std::io::Result<PollingHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let port = Arc::clone(self);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("poll-{}", self.name))
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        port.cycle();
                        thread::sleep(period);
                    }
                })?
        };
        Ok(PollingHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn transfer(&self) {
        self.ready.store(false, Ordering::Release);
        {
            let mut controller = self.controller.lock();
            controller.apply_push();
            controller.run_transaction();
            if mem::take(&mut controller.pull) {
                let snapshot = controller.buffer;
                self.caches.with_read_cache_mut(|cache| *cache = snapshot);
            }
        }
        self.cycles.fetch_add(1, Ordering::AcqRel);
        self.ready.store(true, Ordering::Release);
    }
}

impl Port for SimulatedPort {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn caches(&self) -> &PortCaches {
        &self.caches
    }

    fn is_port_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn push_cache_to_device(&self) {
        let snapshot = self.caches.with_write_cache(|cache| *cache);
        self.controller.lock().push = Some(Push::Full(snapshot));
    }

    fn push_flag_to_device(&self) {
        let flag = self.caches.with_write_cache(|cache| cache[ACTION_FLAG_OFFSET]);
        let mut controller = self.controller.lock();
        controller.push = match controller.push.take() {
            Some(Push::Full(mut snapshot)) => {
                snapshot[ACTION_FLAG_OFFSET] = flag;
                Some(Push::Full(snapshot))
            }
            _ => Some(Push::FlagOnly(flag)),
        };
    }

    fn pull_cache_from_device(&self) {
        self.controller.lock().pull = true;
    }

    fn register_ready_callback(&self, callback: ReadyCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn deregister_ready_callback(&self) {
        // Blocks until a running callback returns
        self.callback.lock().take();
    }
}

/// Stops and joins the polling thread when dropped.
#[derive(Debug)]
pub struct PollingHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PollingHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::port::{MODE_READ, MODE_WRITE};

    fn arm(port: &SimulatedPort, mode: u8, first: u8, count: usize) {
        port.caches().set_header(mode, 0x02, first, count);
        port.caches().set_action_flag(true);
        port.push_cache_to_device();
    }

    #[test]
    fn armed_read_lands_in_read_cache_after_pull() {
        let mut device = SimDevice::new();
        device.set_registers(0x40, &[1, 2, 3, 4]);
        let port = SimulatedPort::new("sim", device);

        arm(&port, MODE_READ, 0x40, 4);
        port.pull_cache_from_device();
        port.cycle();

        port.caches().with_read_cache(|cache| {
            assert_eq!(&cache[CACHE_HEADER_LEN..CACHE_HEADER_LEN + 4], &[1, 2, 3, 4]);
            assert_eq!(cache[ACTION_FLAG_OFFSET], 0);
        });
        assert!(port.is_in_read_mode());
        assert_eq!(
            port.device(|dev| dev.transactions().to_vec()),
            [Transaction::Read {
                first_register: 0x40,
                count: 4
            }]
        );
    }

    #[test]
    fn armed_write_reaches_device_and_marks_written() {
        let port = SimulatedPort::new("sim", SimDevice::new());
        port.caches().stage_payload(&[0xAB, 0xCD]);
        arm(&port, MODE_WRITE, 0x10, 2);
        port.cycle();

        port.device(|dev| {
            assert_eq!(dev.register(0x10), 0xAB);
            assert_eq!(dev.register(0x11), 0xCD);
            assert!(dev.was_written(0x11));
            assert!(!dev.was_written(0x12));

            let mut seen = Vec::new();
            dev.for_each_written(|reg, value| seen.push((reg, value)));
            assert_eq!(seen, [(0x10, 0xAB), (0x11, 0xCD)]);
        });
    }

    #[test]
    fn unarmed_cycle_runs_no_transaction() {
        let port = SimulatedPort::new("sim", SimDevice::new());
        port.caches().set_header(MODE_READ, 0x02, 0x40, 4);
        port.push_cache_to_device();
        port.cycle();
        assert!(port.device(|dev| dev.transactions().is_empty()));
    }

    #[test]
    fn flag_push_reuses_controller_header() {
        let port = SimulatedPort::new("sim", SimDevice::new().with_tick_register(0x40));
        arm(&port, MODE_READ, 0x40, 1);
        port.pull_cache_from_device();
        port.cycle();

        port.caches().set_action_flag(true);
        port.push_flag_to_device();
        port.pull_cache_from_device();
        port.cycle();

        assert_eq!(port.device(|dev| dev.read_transactions()), 2);
        port.caches()
            .with_read_cache(|cache| assert_eq!(cache[CACHE_HEADER_LEN], 2));
    }

    #[test]
    fn callback_fires_after_transfer_until_deregistered() {
        let port = Arc::new(SimulatedPort::new("sim", SimDevice::new()));
        let fired = Arc::new(AtomicU64::new(0));
        {
            let fired = Arc::clone(&fired);
            port.register_ready_callback(Box::new(move || {
                fired.fetch_add(1, Ordering::Relaxed);
            }));
        }

        port.cycle();
        port.cycle();
        port.deregister_ready_callback();
        port.deregister_ready_callback();
        port.cycle();

        assert_eq!(fired.load(Ordering::Relaxed), 2);
        assert_eq!(port.cycles(), 3);
        assert!(!port.has_callback());
    }

    #[test]
    fn polling_thread_stops_on_drop() {
        let port = Arc::new(SimulatedPort::new("sim", SimDevice::new()));
        let handle = port.spawn_polling(Duration::from_millis(1)).unwrap();
        while port.cycles() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        drop(handle);
        let stopped_at = port.cycles();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(port.cycles(), stopped_at);
    }
}
