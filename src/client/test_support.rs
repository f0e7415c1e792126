//! Test support utilities - only compiled in test builds.

use std::{sync::Arc, time::Duration};

use crate::client::{
    ClientConfig, I2cDeviceClient, ReadCacheStatus, ReadWindow, WriteCacheStatus,
    heartbeat::HeartbeatPolicy,
    port::Port,
    sim::{PollingHandle, SimDevice, SimulatedPort},
    state::CacheState,
};

/// Bus address used by every test client.
pub const TEST_ADDRESS: u8 = 0x02;

/// Polling period of background test ports.
pub const TEST_PERIOD: Duration = Duration::from_millis(1);

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A simulated port whose device registers each hold their own number.
pub fn loaded_port() -> Arc<SimulatedPort> {
    let mut device = SimDevice::new();
    let pattern: Vec<u8> = (0..=u8::MAX).collect();
    device.set_registers(0, &pattern);

    let port = SimulatedPort::new("test-device", device);
    port.set_address(TEST_ADDRESS);
    Arc::new(port)
}

/// Cache state for driving the state machine by hand.
pub fn stepped_state(read_window: Option<ReadWindow>) -> CacheState {
    init_tracing();
    let mut state = CacheState::new(read_window, HeartbeatPolicy::new());
    state.logging = true;
    state.logging_tag = String::from("stepped");
    state
}

/// Current read and write cache statuses of a client.
pub fn statuses<P: Port>(client: &I2cDeviceClient<P>) -> (ReadCacheStatus, WriteCacheStatus) {
    client.with_state(|state| (state.read_status, state.write_status))
}

/// An armed client on a port cycled by a background thread.
///
/// Fields drop in order: the client disarms before polling stops.
pub struct Polled {
    pub client: I2cDeviceClient<SimulatedPort>,
    pub poller: PollingHandle,
    pub port: Arc<SimulatedPort>,
}

impl Polled {
    /// Arms a client over [`loaded_port`].
    pub fn start(read_window: Option<ReadWindow>) -> Self {
        Self::on(loaded_port(), read_window)
    }

    /// Arms a client over `port`.
    pub fn on(port: Arc<SimulatedPort>, read_window: Option<ReadWindow>) -> Self {
        init_tracing();
        let config = ClientConfig {
            address: TEST_ADDRESS,
            read_window,
            wait_timeout: Some(Duration::from_secs(5)),
            ..ClientConfig::default()
        };
        let client = I2cDeviceClient::with_config(Arc::clone(&port), config);
        client.arm();
        let poller = port.spawn_polling(TEST_PERIOD).unwrap();
        Self {
            client,
            poller,
            port,
        }
    }
}
