//! Delivery of cue messages to devices.
//!
//! A [`Dispatcher`] takes one message for one named device and sends it
//! without waiting for an answer. Delivery problems are logged by the
//! dispatcher itself; the scheduler never sees them.

mod osc;
mod recording;

pub use osc::{encode_message, OscDispatcher};
pub use recording::{Delivery, RecordingDispatcher};

use crate::common::MatchId;
use crate::components::action::{Action, CueMessage};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while setting up a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A device address could not be resolved.
    #[error("cannot resolve address {address:?} for device {device:?}")]
    Resolve { device: String, address: String },

    /// The local socket could not be bound.
    #[error("failed to bind socket: {0}")]
    Bind(#[source] std::io::Error),
}

/// A device that can receive cue messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceConfig {
    /// The name actions use to refer to this device.
    pub name: String,
    /// `host:port` of the device's OSC listener.
    pub address: String,
}

/// Delivers one message to one named device. Fire-and-forget.
///
/// Implementations should not block; a slow dispatcher delays every cue
/// that follows it.
pub trait Dispatcher: Send + Sync {
    fn deliver(&self, message: &CueMessage, match_id: MatchId);
}

/// Runs every abort action, in order, outside of any match context.
///
/// Safe to call repeatedly; nothing about the schedule or the verifier is
/// consulted or changed.
pub fn run_abort(actions: &[Action], dispatcher: &dyn Dispatcher) {
    warn!("[UNEXPECTED TIMING] Running abort actions. A delay may have been added.");
    for (index, action) in actions.iter().enumerate() {
        info!("Performing action {}: {}", index, action.label());
        dispatcher.deliver(&action.message, MatchId::NONE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::action::action;

    #[test]
    fn abort_delivers_every_action_in_order_with_no_match() {
        let dispatcher = RecordingDispatcher::new();
        let actions = vec![
            action(0.0, "lights", "/house/up"),
            action(0.0, "sound", "/stop"),
            action(0.0, "lights", "/arena/off"),
        ];

        run_abort(&actions, &dispatcher);
        run_abort(&actions, &dispatcher);

        let sent = dispatcher.deliveries();
        assert_eq!(sent.len(), 6);
        let addresses: Vec<_> = sent.iter().map(|d| d.message.address.as_str()).collect();
        assert_eq!(
            addresses,
            ["/house/up", "/stop", "/arena/off", "/house/up", "/stop", "/arena/off"]
        );
        assert!(sent.iter().all(|d| d.match_id == MatchId::NONE));
    }

    #[test]
    fn abort_with_no_actions_sends_nothing() {
        let dispatcher = RecordingDispatcher::new();
        run_abort(&[], &dispatcher);
        assert!(dispatcher.deliveries().is_empty());
    }
}
