//! Per-channel Telegram Bot API configuration.

use {
    secrecy::{ExposeSecret, SecretString},
    serde::Deserialize,
};

use herald_channels::{Error, Result, store::StoredChannel};

/// Credentials and identity of one Telegram bot, deserialized from the
/// channel's config document on use.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChannelConfig {
    /// Bot API token (`123456:ABC-...`).
    pub bot_token: SecretString,
    /// The bot's own identifier, used as the channel's outbound-facing
    /// address.
    pub bot_id: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` header value. Header
    /// checks are skipped when absent.
    #[serde(default)]
    pub secret_token: Option<SecretString>,
    /// Bot API base override, for tests.
    #[serde(default)]
    pub api_base: Option<String>,
}

impl TelegramChannelConfig {
    pub fn from_channel(channel: &StoredChannel) -> Result<Self> {
        let config: Self = serde_json::from_value(channel.config.clone())
            .map_err(|_| Error::missing_credentials(&channel.account_id))?;
        if config.bot_token.expose_secret().is_empty() || config.bot_id.is_empty() {
            return Err(Error::missing_credentials(&channel.account_id));
        }
        Ok(config)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use herald_channels::{
        model::ChannelKind,
        store::{ChannelState, StoredChannel},
    };

    use super::*;

    fn channel(config: serde_json::Value) -> StoredChannel {
        StoredChannel {
            account_id: "tg-main".into(),
            kind: ChannelKind::Telegram,
            config,
            status: ChannelState::Active,
            is_default: false,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn parses_and_redacts() {
        let config = TelegramChannelConfig::from_channel(&channel(serde_json::json!({
            "bot_token": "123456:ABC",
            "bot_id": "herald_bot",
            "secret_token": "st",
        })))
        .unwrap();
        assert_eq!(config.bot_id, "herald_bot");
        assert!(!format!("{config:?}").contains("123456:ABC"));
    }

    #[test]
    fn empty_token_is_missing_credentials() {
        assert!(matches!(
            TelegramChannelConfig::from_channel(&channel(serde_json::json!({
                "bot_token": "",
                "bot_id": "herald_bot",
            }))),
            Err(Error::MissingCredentials { .. })
        ));
    }
}
