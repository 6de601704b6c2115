//! In-memory dispatcher for tests and dry runs.
//!
//! Records every delivery, with the moment it happened, instead of sending it.

use super::Dispatcher;
use crate::common::MatchId;
use crate::components::action::CueMessage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::debug;

/// A single recorded delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: CueMessage,
    pub match_id: MatchId,
    /// When the delivery happened, on the tokio clock.
    pub at: Instant,
}

/// Dispatcher that keeps deliveries in memory.
///
/// Clones share the same record, so a test can hand one clone to the engine
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All deliveries so far, oldest first.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Delivery>> {
        self.deliveries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Dispatcher for RecordingDispatcher {
    fn deliver(&self, message: &CueMessage, match_id: MatchId) {
        debug!(target_device = %message.target, address = %message.address, "Recorded delivery");
        self.lock().push(Delivery {
            message: message.clone(),
            match_id,
            at: Instant::now(),
        });
    }
}
