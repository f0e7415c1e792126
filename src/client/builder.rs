use core::marker::PhantomData;
use std::{sync::Arc, time::Duration};

use crate::client::{HeartbeatAction, I2cDeviceClient, Port, ReadWindow};

/// Everything needed to construct a client, as a plain value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// 8-bit bus address of the device.
    pub address: u8,
    /// Window installed before the first read.
    pub read_window: Option<ReadWindow>,
    /// Bus idle time before a heartbeat fires. Zero disables heartbeats.
    pub heartbeat_interval: Duration,
    pub heartbeat_action: HeartbeatAction,
    /// Upper bound on every blocking wait. `None` waits until satisfied or
    /// disarmed.
    pub wait_timeout: Option<Duration>,
    /// Emit the per-cycle debug trace.
    pub logging: bool,
    /// Tag carried by the per-cycle trace. Defaults to `I2cDeviceClient`.
    pub logging_tag: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: 0,
            read_window: None,
            heartbeat_interval: Duration::ZERO,
            heartbeat_action: HeartbeatAction::default(),
            wait_timeout: None,
            logging: false,
            logging_tag: None,
        }
    }
}

// Builder states
pub struct NeedAddress;
pub struct Ready;

/// Typestate builder for [`I2cDeviceClient`].
///
/// The device address is mandatory; everything else is optional.
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use i2c_device_client::prelude::*;
///
/// let port = Arc::new(SimulatedPort::new("motor", SimDevice::new()));
/// let client = ClientBuilder::new(port)
///     .address(0x02)
///     .read_window(ReadWindow::repeat(0x40, 22).unwrap())
///     .heartbeat_interval(Duration::from_secs(2))
///     .build();
/// assert!(!client.is_armed());
/// ```
pub struct ClientBuilder<P: Port, State> {
    port: Arc<P>,
    config: ClientConfig,
    _state: PhantomData<State>,
}

impl<P: Port> ClientBuilder<P, NeedAddress> {
    pub fn new(port: Arc<P>) -> Self {
        Self {
            port,
            config: ClientConfig::default(),
            _state: PhantomData,
        }
    }

    /// Sets the 8-bit bus address of the device.
    pub fn address(self, address: u8) -> ClientBuilder<P, Ready> {
        ClientBuilder {
            port: self.port,
            config: ClientConfig {
                address,
                ..self.config
            },
            _state: PhantomData,
        }
    }
}

impl<P: Port> ClientBuilder<P, Ready> {
    pub fn read_window(mut self, window: ReadWindow) -> Self {
        self.config.read_window = Some(window);
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn heartbeat_action(mut self, action: HeartbeatAction) -> Self {
        self.config.heartbeat_action = action;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.config.logging = enabled;
        self
    }

    pub fn logging_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.logging_tag = Some(tag.into());
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Builds an unarmed client.
    pub fn build(self) -> I2cDeviceClient<P> {
        I2cDeviceClient::with_config(self.port, self.config)
    }
}
