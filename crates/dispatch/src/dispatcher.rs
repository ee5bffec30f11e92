//! The outbound dispatcher.

use std::sync::Arc;

use {
    anyhow::{Context, Result},
    tracing::{error, info},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, histogram, labels, outbound as out_metrics};

use herald_channels::{
    adapter::AdapterRegistry,
    events::{DeliveryEvent, DeliveryEventSink},
    model::{MessageRecord, OutboundPayload},
    store::{ChannelStore, MessageStore, NewOutboundMessage},
};

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Executes one outbound send end to end: credential lookup, provider
/// request, message record with status `sent`, delivery notification.
///
/// A provider rejection returns an error without creating a record; the
/// owning task's retry policy decides whether the send is attempted again.
pub struct OutboundDispatcher {
    channels: Arc<dyn ChannelStore>,
    messages: Arc<dyn MessageStore>,
    adapters: Arc<AdapterRegistry>,
    events: Arc<dyn DeliveryEventSink>,
}

impl OutboundDispatcher {
    pub fn new(
        channels: Arc<dyn ChannelStore>,
        messages: Arc<dyn MessageStore>,
        adapters: Arc<AdapterRegistry>,
        events: Arc<dyn DeliveryEventSink>,
    ) -> Self {
        Self {
            channels,
            messages,
            adapters,
            events,
        }
    }

    pub async fn send(
        &self,
        account_id: &str,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<MessageRecord> {
        let channel = self
            .channels
            .get(account_id)
            .await?
            .filter(|c| c.is_active())
            .with_context(|| format!("no active channel for account {account_id}"))?;

        let adapter = self
            .adapters
            .get(channel.kind)
            .with_context(|| format!("no adapter registered for {}", channel.kind))?;

        // Credential problems surface here, before any provider call.
        let own_address = adapter.own_address(&channel).map_err(|e| {
            error!(account_id, error = %e, "channel credentials unusable, send aborted");
            anyhow::anyhow!(e)
        })?;

        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let ack = match adapter.send(&channel, to, payload).await {
            Ok(ack) => ack,
            Err(e) => {
                error!(account_id, to, error = %e, "provider send failed");
                #[cfg(feature = "metrics")]
                counter!(out_metrics::FAILURES_TOTAL, labels::PROVIDER => channel.kind.as_str())
                    .increment(1);
                return Err(e.into());
            },
        };

        #[cfg(feature = "metrics")]
        {
            counter!(out_metrics::SENT_TOTAL, labels::PROVIDER => channel.kind.as_str())
                .increment(1);
            histogram!(out_metrics::SEND_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
        }

        let sent_at = now_secs();
        let record = self
            .messages
            .record_outbound(NewOutboundMessage {
                account_id: account_id.to_string(),
                provider_message_id: ack.provider_message_id.clone(),
                sender: own_address,
                recipient: to.to_string(),
                kind: payload.kind(),
                body: payload.stored_body(),
                raw_response: Some(ack.raw),
                sent_at,
            })
            .await?;

        info!(
            account_id,
            to,
            provider_message_id = %record.provider_message_id,
            kind = %record.kind,
            "outbound message sent"
        );

        self.events
            .emit(DeliveryEvent::MessageSent {
                account_id: account_id.to_string(),
                provider_message_id: record.provider_message_id.clone(),
                recipient: to.to_string(),
                body: record.body.clone(),
                timestamp: sent_at,
            })
            .await;

        Ok(record)
    }
}
