//! Delivery-lifecycle notifications.
//!
//! The pipeline publishes one event per message movement so real-time
//! listeners (UI, audit taps) can observe traffic without polling the store.
//! The gateway provides the concrete broadcast implementation.

use async_trait::async_trait;

use crate::model::DeliveryStatus;

/// Events emitted as messages move through the pipeline.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryEvent {
    MessageReceived {
        account_id: String,
        provider_message_id: String,
        sender: String,
        body: String,
        timestamp: i64,
    },
    MessageSent {
        account_id: String,
        provider_message_id: String,
        recipient: String,
        body: String,
        timestamp: i64,
    },
    StatusChanged {
        account_id: String,
        provider_message_id: String,
        status: DeliveryStatus,
    },
}

/// Sink for delivery events — the gateway provides the concrete
/// implementation.
#[async_trait]
pub trait DeliveryEventSink: Send + Sync {
    async fn emit(&self, event: DeliveryEvent);
}

/// Discards every event. Used in tests and for components wired without a
/// listener.
pub struct NoopDeliveryEventSink;

#[async_trait]
impl DeliveryEventSink for NoopDeliveryEventSink {
    async fn emit(&self, _event: DeliveryEvent) {}
}
