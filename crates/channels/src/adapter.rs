//! Provider adapter seam.
//!
//! One implementation per provider, selected by [`ChannelKind`] value. The
//! webhook surface calls `verify_handshake`/`authenticate`/`normalize`; the
//! outbound dispatcher calls `send`.

use std::{collections::HashMap, sync::Arc};

use {async_trait::async_trait, http::HeaderMap};

#[cfg(feature = "metrics")]
use herald_metrics::{channels as ch_metrics, gauge};

use crate::{
    Result,
    model::{ChannelKind, NormalizedBatch, OutboundPayload},
    store::StoredChannel,
};

/// Provider acknowledgement of an accepted outbound send.
#[derive(Debug, Clone)]
pub struct ProviderSendAck {
    /// Provider-assigned id of the outbound message.
    pub provider_message_id: String,
    /// Full response body, preserved for the message record.
    pub raw: serde_json::Value,
}

/// Webhook handling and outbound sending for one provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this adapter speaks for.
    fn kind(&self) -> ChannelKind;

    /// The channel's own outbound-facing address (configured phone number
    /// id, bot identifier). Routing keys on it and outbound records store it
    /// as the sender.
    fn own_address(&self, channel: &StoredChannel) -> Result<String>;

    /// Handle the provider's webhook subscription handshake (GET).
    ///
    /// Returns the literal challenge string to echo back. Providers without a
    /// handshake return [`Error::Unavailable`](crate::Error::Unavailable);
    /// a failed secret comparison returns
    /// [`Error::Forbidden`](crate::Error::Forbidden).
    fn verify_handshake(
        &self,
        channel: &StoredChannel,
        params: &HashMap<String, String>,
    ) -> Result<String>;

    /// Authenticate a webhook data call (POST) against the channel's
    /// configured secret. A failure means 403 at the boundary with no state
    /// change; adapters whose channel has no secret configured accept the
    /// call.
    fn authenticate(&self, channel: &StoredChannel, headers: &HeaderMap, body: &[u8])
    -> Result<()>;

    /// Convert a raw webhook body into canonical events and statuses.
    ///
    /// Entries addressed to a different provider account than the channel's
    /// configured one are skipped with a warning, not an error.
    fn normalize(&self, channel: &StoredChannel, body: &[u8]) -> Result<NormalizedBatch>;

    /// Build and execute the provider send request for one payload.
    async fn send(
        &self,
        channel: &StoredChannel,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<ProviderSendAck>;
}

/// Registry of provider adapters, keyed by channel kind.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChannelKind, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
        #[cfg(feature = "metrics")]
        gauge!(ch_metrics::ADAPTERS_REGISTERED).set(self.adapters.len() as f64);
    }

    #[must_use]
    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).map(Arc::clone)
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.adapters.keys().copied().collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct FakeAdapter(ChannelKind);

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn kind(&self) -> ChannelKind {
            self.0
        }

        fn own_address(&self, channel: &StoredChannel) -> Result<String> {
            Ok(channel.account_id.clone())
        }

        fn verify_handshake(
            &self,
            _channel: &StoredChannel,
            _params: &HashMap<String, String>,
        ) -> Result<String> {
            Err(Error::unavailable("no handshake"))
        }

        fn authenticate(
            &self,
            _channel: &StoredChannel,
            _headers: &HeaderMap,
            _body: &[u8],
        ) -> Result<()> {
            Ok(())
        }

        fn normalize(&self, _channel: &StoredChannel, _body: &[u8]) -> Result<NormalizedBatch> {
            Ok(NormalizedBatch::default())
        }

        async fn send(
            &self,
            _channel: &StoredChannel,
            _to: &str,
            _payload: &OutboundPayload,
        ) -> Result<ProviderSendAck> {
            Err(Error::unavailable("not wired"))
        }
    }

    #[test]
    fn registry_selects_by_kind() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(FakeAdapter(ChannelKind::Whatsapp)));
        registry.register(Arc::new(FakeAdapter(ChannelKind::Telegram)));

        let adapter = registry.get(ChannelKind::Telegram).unwrap();
        assert_eq!(adapter.kind(), ChannelKind::Telegram);
        assert_eq!(registry.kinds().len(), 2);
    }

    #[test]
    fn registry_miss_is_none() {
        let registry = AdapterRegistry::new();
        assert!(registry.get(ChannelKind::Whatsapp).is_none());
    }
}
