//! Delivery-event fan-out over a tokio broadcast channel.

use {
    async_trait::async_trait,
    tokio::sync::broadcast,
    tracing::debug,
};

use herald_channels::events::{DeliveryEvent, DeliveryEventSink};

/// Publishes every delivery event to all current subscribers. Lagging
/// subscribers drop events (broadcast semantics); the pipeline never blocks
/// on a slow listener.
pub struct BroadcastSink {
    tx: broadcast::Sender<DeliveryEvent>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Open a new subscription. Receives events emitted from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl DeliveryEventSink for BroadcastSink {
    async fn emit(&self, event: DeliveryEvent) {
        // Err means no subscriber is currently listening, which is fine.
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(subscribers = delivered, "delivery event broadcast");
    }
}
