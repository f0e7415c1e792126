pub mod builder;
pub mod error;
pub mod handle;
pub mod heartbeat;
pub mod helpers;
pub(crate) mod lock;
pub(crate) mod machine;
pub mod negotiate;
pub mod port;
pub mod sim;
pub mod slice;
pub(crate) mod state;
pub mod status;
mod typed;
pub mod types;

#[cfg(test)]
mod test_support;

pub use builder::{ClientBuilder, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use handle::{I2cDeviceClient, PortReadyCallback};
pub use heartbeat::HeartbeatPolicy;
pub use negotiate::Negotiated;
pub use port::{Port, PortCaches, ReadyCallback};
pub use sim::{PollingHandle, SimDevice, SimulatedPort};
pub use slice::{RegisterView, RegisterViewMut};
pub use status::{ModeCacheStatus, PendingWrite, ReadCacheStatus, WriteCacheStatus};
pub use types::{HeartbeatAction, ReadMode, ReadWindow, RegisterBytes, TimestampedData};

pub mod prelude {
    pub use super::{
        ClientBuilder, ClientConfig, ClientError, ClientResult, HeartbeatAction, I2cDeviceClient,
        PollingHandle, Port, PortCaches, ReadMode, ReadWindow, RegisterBytes, RegisterView,
        RegisterViewMut, SimDevice, SimulatedPort, TimestampedData,
    };
}
