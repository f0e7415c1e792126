//! The port a client drives, and the caches it shares with it.
//!
//! A port performs at most one bus transaction per polling cycle. Between
//! cycles it exposes two fixed-size byte caches: the write cache, which the
//! client fills and the port pushes to the device controller, and the read
//! cache, which the port refreshes from the controller. Both caches start with
//! a small control header:
//!
//! ```text
//! byte:  0      1        2               3        4 ..= 30    31
//!       [mode] [addr8]  [first register] [count]  [payload]   [action flag]
//! ```
//!
//! How bytes travel between the caches and the hardware is the port's
//! business; this module fixes only the layout and the operations the client
//! relies on.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::client::slice::{RegisterView, RegisterViewMut};

/// Size of each port cache in bytes.
pub const CACHE_SIZE: usize = 32;
/// Bytes at the start of each cache reserved for the control header.
pub const CACHE_HEADER_LEN: usize = 4;
/// Index of the action flag byte.
pub const ACTION_FLAG_OFFSET: usize = 31;
/// Header mode byte requesting a bus read.
pub const MODE_READ: u8 = 0x80;
/// Header mode byte requesting a bus write.
pub const MODE_WRITE: u8 = 0x00;
/// Action flag value that asks the controller to run the transaction.
pub const ACTION_FLAG_SET: u8 = 0xFF;

const HEADER_MODE: usize = 0;
const HEADER_ADDRESS: usize = 1;
const HEADER_REGISTER: usize = 2;
const HEADER_COUNT: usize = 3;

/// Callback a port fires once per polling cycle, after it is ready for new work.
pub type ReadyCallback = Box<dyn FnMut() + Send + 'static>;

struct CacheBuffers {
    read: [u8; CACHE_SIZE],
    write: [u8; CACHE_SIZE],
}

/// The read and write caches of a port.
///
/// Every access happens inside a short critical section, so a caller can
/// never observe a cache half-updated by the polling thread. No access is
/// ever held across a blocking wait.
pub struct PortCaches {
    buffers: Mutex<RefCell<CacheBuffers>>,
}

impl core::fmt::Debug for PortCaches {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PortCaches").finish_non_exhaustive()
    }
}

impl Default for PortCaches {
    fn default() -> Self {
        Self::new()
    }
}

impl PortCaches {
    pub const fn new() -> Self {
        Self {
            buffers: Mutex::new(RefCell::new(CacheBuffers {
                read: [0; CACHE_SIZE],
                write: [0; CACHE_SIZE],
            })),
        }
    }

    /// Runs `f` over the whole read cache, header included.
    pub fn with_read_cache<R>(&self, f: impl FnOnce(&[u8; CACHE_SIZE]) -> R) -> R {
        critical_section::with(|cs| f(&self.buffers.borrow_ref(cs).read))
    }

    /// Runs `f` over the whole read cache with write access, header included.
    ///
    /// Meant for port implementations refreshing the cache from the controller.
    pub fn with_read_cache_mut<R>(&self, f: impl FnOnce(&mut [u8; CACHE_SIZE]) -> R) -> R {
        critical_section::with(|cs| f(&mut self.buffers.borrow_ref_mut(cs).read))
    }

    /// Runs `f` over the whole write cache, header included.
    pub fn with_write_cache<R>(&self, f: impl FnOnce(&[u8; CACHE_SIZE]) -> R) -> R {
        critical_section::with(|cs| f(&self.buffers.borrow_ref(cs).write))
    }

    /// Runs `f` over the whole write cache with write access, header included.
    pub fn with_write_cache_mut<R>(&self, f: impl FnOnce(&mut [u8; CACHE_SIZE]) -> R) -> R {
        critical_section::with(|cs| f(&mut self.buffers.borrow_ref_mut(cs).write))
    }

    /// Provides the read cache payload as registers starting at `first_register`.
    pub fn with_read_registers<R>(
        &self,
        first_register: u8,
        count: usize,
        f: impl FnOnce(RegisterView<'_>) -> R,
    ) -> R {
        let end = (CACHE_HEADER_LEN + count).min(ACTION_FLAG_OFFSET);
        self.with_read_cache(|cache| {
            f(RegisterView::new(
                first_register,
                &cache[CACHE_HEADER_LEN..end],
            ))
        })
    }

    /// Provides the write cache payload as registers starting at `first_register`.
    pub fn with_write_registers<R>(
        &self,
        first_register: u8,
        count: usize,
        f: impl FnOnce(RegisterViewMut<'_>) -> R,
    ) -> R {
        let end = (CACHE_HEADER_LEN + count).min(ACTION_FLAG_OFFSET);
        self.with_write_cache_mut(|cache| {
            f(RegisterViewMut::new(
                first_register,
                &mut cache[CACHE_HEADER_LEN..end],
            ))
        })
    }

    /// Copies `data` into the write cache payload.
    ///
    /// # Panics
    /// Panics if `data` does not fit between the header and the action flag.
    pub fn stage_payload(&self, data: &[u8]) {
        self.with_write_cache_mut(|cache| {
            cache[CACHE_HEADER_LEN..CACHE_HEADER_LEN + data.len()].copy_from_slice(data);
        })
    }

    /// Writes the control header into the write cache.
    pub fn set_header(&self, mode: u8, address: u8, first_register: u8, count: usize) {
        self.with_write_cache_mut(|cache| {
            cache[HEADER_MODE] = mode;
            cache[HEADER_ADDRESS] = address;
            cache[HEADER_REGISTER] = first_register;
            cache[HEADER_COUNT] = count as u8;
        })
    }

    /// Writes the device address into the write cache header.
    pub fn set_address(&self, address: u8) {
        self.with_write_cache_mut(|cache| cache[HEADER_ADDRESS] = address)
    }

    /// Sets or clears the action flag in the write cache.
    pub fn set_action_flag(&self, armed: bool) {
        self.with_write_cache_mut(|cache| {
            cache[ACTION_FLAG_OFFSET] = if armed { ACTION_FLAG_SET } else { 0 };
        })
    }

    /// Returns true if the write cache carries an armed action flag.
    pub fn action_flag(&self) -> bool {
        self.with_write_cache(|cache| cache[ACTION_FLAG_OFFSET] == ACTION_FLAG_SET)
    }

    /// Returns true if the read cache header reports the controller in read mode.
    pub fn read_cache_in_read_mode(&self) -> bool {
        self.with_read_cache(|cache| cache[HEADER_MODE] == MODE_READ)
    }
}

/// Decoded control header of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    pub mode: u8,
    pub address: u8,
    pub first_register: u8,
    pub count: usize,
}

impl CacheHeader {
    /// Decodes the header at the start of `cache`.
    pub fn parse(cache: &[u8; CACHE_SIZE]) -> Self {
        Self {
            mode: cache[HEADER_MODE],
            address: cache[HEADER_ADDRESS],
            first_register: cache[HEADER_REGISTER],
            count: cache[HEADER_COUNT] as usize,
        }
    }

    /// Returns true if the header selects a bus read.
    pub fn is_read(&self) -> bool {
        self.mode == MODE_READ
    }
}

/// A hardware port serviced once per polling cycle.
///
/// Implementors supply the transport (`push_*`, `pull_*`, readiness and callback
/// registration) and own a [`PortCaches`]. The mode and flag operations have
/// default implementations in terms of the cache header layout.
///
/// Every method is called with the client's state lock held and must not
/// block on the polling cycle.
pub trait Port: Send + Sync + 'static {
    /// Human-readable name of the device behind the port.
    fn device_name(&self) -> &str;

    /// The caches shared with the client.
    fn caches(&self) -> &PortCaches;

    /// Returns true if the port is between cycles and may be handed new work.
    fn is_port_ready(&self) -> bool;

    /// Queues the whole write cache (header, payload and flag) for the controller.
    fn push_cache_to_device(&self);

    /// Queues only the action flag byte of the write cache for the controller.
    fn push_flag_to_device(&self);

    /// Queues a refresh of the read cache from the controller.
    fn pull_cache_from_device(&self);

    /// Installs the callback fired at the end of every polling cycle.
    fn register_ready_callback(&self, callback: ReadyCallback);

    /// Removes the installed callback. Must be idempotent.
    ///
    /// Once this returns, the previously installed callback is not running
    /// and will not be called again.
    fn deregister_ready_callback(&self);

    /// Sets the 8-bit bus address of the device.
    fn set_address(&self, address: u8) {
        self.caches().set_address(address);
    }

    /// Current 8-bit bus address of the device.
    fn address(&self) -> u8 {
        self.caches()
            .with_write_cache(|cache| cache[HEADER_ADDRESS])
    }

    /// Programs the write cache header for a read of `count` registers.
    fn enable_read_mode(&self, first_register: u8, count: usize) {
        let address = self.address();
        self.caches()
            .set_header(MODE_READ, address, first_register, count);
    }

    /// Programs the write cache header for a write of `count` registers.
    fn enable_write_mode(&self, first_register: u8, count: usize) {
        let address = self.address();
        self.caches()
            .set_header(MODE_WRITE, address, first_register, count);
    }

    /// Arms the action flag in the write cache.
    fn arm_action_flag(&self) {
        self.caches().set_action_flag(true);
    }

    /// Clears the action flag in the write cache.
    fn clear_action_flag(&self) {
        self.caches().set_action_flag(false);
    }

    /// Returns true if the controller last reported itself in read mode.
    fn is_in_read_mode(&self) -> bool {
        self.caches().read_cache_in_read_mode()
    }
}
