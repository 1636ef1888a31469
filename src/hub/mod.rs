//! Fan-out of broadcast events to every connected subscriber.
//!
//! Each published event is serialized once and pushed into a
//! `tokio::sync::broadcast` channel. Every WebSocket connection holds its own
//! receiver, so a slow or closed subscriber never holds up the others.

pub mod server;

pub use server::{router, AppState};

use tokio::sync::broadcast;
use tracing::debug;

use crate::db::models::BroadcastEvent;
use crate::error::PublishError;

/// Messages buffered per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Anything the play clock can publish to.
pub trait Publisher: Send + Sync {
    /// Deliver to all open subscribers; returns how many received it.
    fn publish(&self, event: &BroadcastEvent) -> Result<usize, PublishError>;
}

#[derive(Clone)]
pub struct SubscriberHub {
    tx: broadcast::Sender<String>,
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        SubscriberHub { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Publisher for SubscriberHub {
    fn publish(&self, event: &BroadcastEvent) -> Result<usize, PublishError> {
        let text = serde_json::to_string(event)?;
        // `send` only fails when nobody is listening, which is not an error here.
        match self.tx.send(text) {
            Ok(n) => Ok(n),
            Err(_) => {
                debug!("No subscribers connected, event dropped");
                Ok(0)
            }
        }
    }
}
