//! Per-channel WhatsApp Cloud configuration.

use {
    secrecy::{ExposeSecret, SecretString},
    serde::Deserialize,
};

use herald_channels::{Error, Result, store::StoredChannel};

/// Credentials and identity of one WhatsApp Business account, deserialized
/// from the channel's config document on use so secrets never sit in
/// long-lived state.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppChannelConfig {
    /// Provider-side account identifier; embedded webhooks must match it.
    pub phone_number_id: String,
    /// Graph API bearer token.
    pub access_token: SecretString,
    /// Shared secret echoed back during the subscription handshake.
    pub verify_token: SecretString,
    /// App secret for `X-Hub-Signature-256` body verification. Signature
    /// checks are skipped when absent.
    #[serde(default)]
    pub app_secret: Option<SecretString>,
    /// Graph API base override, for tests and regional endpoints.
    #[serde(default)]
    pub api_base: Option<String>,
}

impl WhatsAppChannelConfig {
    /// Deserialize from a stored channel, failing with a credentials error
    /// when the document is missing required fields or they are empty.
    pub fn from_channel(channel: &StoredChannel) -> Result<Self> {
        let config: Self = serde_json::from_value(channel.config.clone())
            .map_err(|_| Error::missing_credentials(&channel.account_id))?;
        if config.phone_number_id.is_empty() || config.access_token.expose_secret().is_empty() {
            return Err(Error::missing_credentials(&channel.account_id));
        }
        Ok(config)
    }
}
