use std::{
    sync::{Arc, Weak},
    time::Instant,
};

use crate::client::{Port, handle::Shared, machine};

/// The sole driver of a client's state machine.
///
/// One is created on every arm and moved into the port's callback
/// registration. It is not `Clone`, so only the port's polling thread can
/// advance the state machine. It holds the client weakly: a callback outliving
/// its client does nothing.
pub struct PortReadyCallback<P: Port> {
    shared: Weak<Shared<P>>,
}

impl<P: Port> core::fmt::Debug for PortReadyCallback<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PortReadyCallback")
            .field("attached", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl<P: Port> PortReadyCallback<P> {
    pub(crate) fn new(shared: &Arc<Shared<P>>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    /// Runs one state machine step and wakes every blocked caller.
    ///
    /// Takes only the inner lock.
    pub fn port_is_ready(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut state = shared.locks.callback_state();
        machine::step(&mut state, &*shared.port, Instant::now());
        state.notify_all();
    }
}
