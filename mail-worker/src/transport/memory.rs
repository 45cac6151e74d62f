//! In-memory backend that records deliveries.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::Transport;
use crate::message::Message;

/// One recorded delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: Vec<String>,
    pub message: Message,
}

/// Records every delivery instead of sending it. Clones share the same
/// record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    fail: bool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects every delivery.
    pub fn failing() -> Self {
        Self {
            deliveries: Arc::default(),
            fail: true,
        }
    }

    /// Snapshot of the deliveries so far.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Transport for InMemoryTransport {
    fn deliver(&self, to: &[String], message: &Message) -> bool {
        if self.fail {
            warn!(recipients = to.len(), "memory_transport_rejected");
            return false;
        }

        let mut deliveries = self
            .deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        deliveries.push(Delivery {
            to: to.to_vec(),
            message: message.clone(),
        });

        info!(
            recipients = to.len(),
            recorded = deliveries.len(),
            "memory_transport_recorded"
        );
        true
    }
}
