//! A blocking, register-oriented client for an I2C device behind a polled port.
//!
//! The port is serviced by a periodic callback that can run at most one bus
//! transaction per cycle and exposes two small byte caches between cycles.
//! [`I2cDeviceClient`](client::I2cDeviceClient) turns that into synchronous
//! `read` and `write` calls that any number of threads can share.
//!
//! # Features
//!
//! - **Read windows** - Mirror a contiguous run of registers, once or on every cycle
//! - **Write ordering** - A read always reflects every write staged before it
//! - **Window reuse** - Sub-range reads are served without switching bus direction
//! - **Heartbeats** - Keep-alive traffic for devices that time out when idle
//! - **Simulation** - An in-memory port and device for tests and demos
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐           ┌───────────────────────────┐
//! │  Caller threads      │           │  Port polling thread      │
//! │                      │           │                           │
//! │  read() / write()    │  outer    │  PortReadyCallback        │
//! │  (one at a time)     │──lock────▶│  (inner lock only)        │
//! │                      │           │                           │
//! │  wait on condvar     │◀──notify──│  machine::step()          │
//! │                      │           │  push / pull port caches  │
//! └──────────────────────┘           └───────────────────────────┘
//! ```
//!
//! - **Callers** install read windows and stage writes, then block
//! - **The callback** advances the cache state machine once per cycle
//! - **Writes preempt reads**, so a read queued before a write is discarded
//!
//! # Example
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//! use i2c_device_client::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let port = Arc::new(SimulatedPort::new("motor controller", SimDevice::new()));
//! let _poller = port.spawn_polling(Duration::from_millis(10))?;
//!
//! let client = ClientBuilder::new(Arc::clone(&port))
//!     .address(0x02)
//!     .read_window(ReadWindow::repeat(0x40, 22)?)
//!     .build();
//! client.arm();
//!
//! // Set the motor power register, then read the encoder back
//! client.write8(0x45, 0x64, false)?;
//! let encoder = client.read_i32_be(0x4C)?;
//! # let _ = encoder;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;

pub mod prelude {
    pub use crate::client::prelude::*;
}
