//! When the portal should be serving.
//!
//! The portal runs while the device has an address: a station lease or a
//! running access point. [`PortalLifecycle`] turns the driver's event stream
//! into start/stop commands, dropping repeats.

use devcfg_core::NetworkEvent;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
}

#[derive(Debug, Default)]
pub struct PortalLifecycle {
    running: bool,
}

impl PortalLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Record that the portal is not serving, e.g. after a failed start.
    pub fn mark_stopped(&mut self) {
        self.running = false;
    }

    /// The command `event` calls for, if any.
    pub fn on_event(&mut self, event: NetworkEvent) -> Option<LifecycleAction> {
        let action = match (event.is_up(), self.running) {
            (true, false) => LifecycleAction::Start,
            (false, true) => LifecycleAction::Stop,
            _ => {
                debug!("Ignoring {:?}, portal running: {}", event, self.running);
                return None;
            }
        };
        self.running = action == LifecycleAction::Start;
        Some(action)
    }
}
