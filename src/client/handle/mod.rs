mod host;
mod kernel;

pub use host::I2cDeviceClient;
pub use kernel::PortReadyCallback;

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::client::{Port, lock::ClientLocks, state::CacheState};

/// State shared by the client handle and its polling callback.
pub(crate) struct Shared<P: Port> {
    pub(crate) port: Arc<P>,
    pub(crate) locks: ClientLocks<CacheState>,
    /// Serializes arm and disarm. Never held together with the outer lock.
    pub(crate) arming: Mutex<()>,
    pub(crate) wait_timeout: Option<Duration>,
}
