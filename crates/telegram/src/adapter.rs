//! `ProviderAdapter` implementation for the Telegram Bot API.

use std::collections::HashMap;

use {async_trait::async_trait, http::HeaderMap, secrecy::ExposeSecret, tracing::debug};

use herald_channels::{
    Error, Result,
    adapter::{ProviderAdapter, ProviderSendAck},
    model::{ChannelKind, InboundEvent, NormalizedBatch, OutboundPayload},
    store::StoredChannel,
};

use crate::{
    config::TelegramChannelConfig,
    payload::{Message, Update},
};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Telegram Bot API adapter: secret-token webhook authentication, update
/// normalization, `sendMessage`/`sendPhoto` sends.
pub struct TelegramAdapter {
    http: reqwest::Client,
    api_base: String,
}

impl Default for TelegramAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.into(),
        }
    }

    fn api_base<'a>(&'a self, config: &'a TelegramChannelConfig) -> &'a str {
        config.api_base.as_deref().unwrap_or(&self.api_base)
    }

    async fn call_method(
        &self,
        config: &TelegramChannelConfig,
        method: &str,
        request: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!(
            "{}/bot{}/{method}",
            self.api_base(config).trim_end_matches('/'),
            config.bot_token.expose_secret()
        );
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::external(format!("telegram {method}"), e))?;

        let status = response.status();
        let raw: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        if !status.is_success() || raw["ok"] != true {
            return Err(Error::provider(format!(
                "telegram {method} failed ({status}): {raw}"
            )));
        }
        Ok(raw)
    }
}

/// Provider message ids are scoped per chat in the Bot API; the canonical id
/// joins both so it is unique across the message table.
fn provider_message_id(chat_id: i64, message_id: i64) -> String {
    format!("{chat_id}:{message_id}")
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn event_from_message(
    msg: &Message,
    config: &TelegramChannelConfig,
    raw: serde_json::Value,
) -> Option<InboundEvent> {
    let from = msg.from.as_ref()?;
    Some(InboundEvent {
        provider_message_id: provider_message_id(msg.chat.id, msg.message_id),
        sender: from.id.to_string(),
        recipient: config.bot_id.clone(),
        sender_name: Some(from.display_name()),
        kind: msg.kind(),
        body: msg.content(),
        timestamp: msg.date.unwrap_or_else(now_secs),
        raw,
    })
}

#[async_trait]
impl ProviderAdapter for TelegramAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn own_address(&self, channel: &StoredChannel) -> Result<String> {
        Ok(TelegramChannelConfig::from_channel(channel)?.bot_id)
    }

    fn verify_handshake(
        &self,
        _channel: &StoredChannel,
        _params: &HashMap<String, String>,
    ) -> Result<String> {
        Err(Error::unavailable("telegram has no webhook handshake"))
    }

    fn authenticate(
        &self,
        channel: &StoredChannel,
        headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<()> {
        let config = TelegramChannelConfig::from_channel(channel)?;
        let Some(expected) = config.secret_token else {
            return Ok(());
        };

        let presented = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::forbidden("missing secret token header"))?;
        if presented != expected.expose_secret() {
            return Err(Error::forbidden("secret token mismatch"));
        }
        Ok(())
    }

    fn normalize(&self, channel: &StoredChannel, body: &[u8]) -> Result<NormalizedBatch> {
        let config = TelegramChannelConfig::from_channel(channel)?;
        let raw: serde_json::Value = serde_json::from_slice(body)?;
        let update: Update = serde_json::from_value(raw.clone())?;

        let mut batch = NormalizedBatch::default();

        if let Some(ref msg) = update.message {
            match event_from_message(msg, &config, raw.get("message").cloned().unwrap_or_default())
            {
                Some(event) => batch.events.push(event),
                None => debug!(update_id = update.update_id, "message without sender, skipping"),
            }
        }

        // Button presses arrive as callback queries; surface them as
        // callback-kind events so routing sees them like any other message.
        if let Some(ref query) = update.callback_query {
            let chat_id = query
                .message
                .as_ref()
                .map_or(query.from.id, |m| m.chat.id);
            batch.events.push(InboundEvent {
                provider_message_id: format!("cbq:{}", query.id),
                sender: query.from.id.to_string(),
                recipient: config.bot_id.clone(),
                sender_name: Some(query.from.display_name()),
                kind: herald_channels::model::MessageKind::Callback,
                body: serde_json::json!({
                    "kind": "callback",
                    "data": query.data,
                    "chat_id": chat_id,
                })
                .to_string(),
                timestamp: now_secs(),
                raw: raw.get("callback_query").cloned().unwrap_or_default(),
            });
        }

        // The Bot API has no delivery receipts; statuses stay empty.
        Ok(batch)
    }

    async fn send(
        &self,
        channel: &StoredChannel,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<ProviderSendAck> {
        let config = TelegramChannelConfig::from_channel(channel)?;
        let chat_id: i64 = to
            .parse()
            .map_err(|_| Error::invalid_input(format!("telegram chat id not numeric: {to}")))?;

        let (method, request) = match payload {
            OutboundPayload::Text { body } => (
                "sendMessage",
                serde_json::json!({ "chat_id": chat_id, "text": body }),
            ),
            OutboundPayload::Image { url, .. } => {
                let mut request = serde_json::json!({ "chat_id": chat_id, "photo": url });
                if let Some(caption) = payload.caption()
                    && let Some(obj) = request.as_object_mut()
                {
                    obj.insert("caption".into(), caption.into());
                }
                ("sendPhoto", request)
            },
        };

        let raw = self.call_method(&config, method, &request).await?;
        let message_id = raw["result"]["message_id"].as_i64().ok_or_else(|| {
            Error::provider(format!("telegram {method} response missing message_id"))
        })?;

        Ok(ProviderSendAck {
            provider_message_id: provider_message_id(chat_id, message_id),
            raw,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use herald_channels::{model::MessageKind, store::ChannelState};

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

    fn base_channel() -> StoredChannel {
        channel(serde_json::json!({
            "bot_token": "123456:ABC",
            "bot_id": "herald_bot",
            "secret_token": "st-secret",
        }))
    }

    fn update_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "update_id": 9001,
            "message": {
                "message_id": 7,
                "from": {"id": 100200300, "first_name": "Asha", "last_name": "K"},
                "chat": {"id": 100200300},
                "date": 1_700_000_000,
                "text": "Hello",
            },
        }))
        .unwrap()
    }

    #[test]
    fn handshake_is_unsupported() {
        let adapter = TelegramAdapter::new();
        assert!(matches!(
            adapter.verify_handshake(&base_channel(), &HashMap::new()),
            Err(Error::Unavailable { .. })
        ));
    }

    #[test]
    fn authenticate_checks_secret_token() {
        let adapter = TelegramAdapter::new();
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_TOKEN_HEADER, "st-secret".parse().unwrap());
        assert!(adapter.authenticate(&base_channel(), &headers, b"{}").is_ok());

        let mut wrong = HeaderMap::new();
        wrong.insert(SECRET_TOKEN_HEADER, "nope".parse().unwrap());
        assert!(matches!(
            adapter.authenticate(&base_channel(), &wrong, b"{}"),
            Err(Error::Forbidden { .. })
        ));
        assert!(matches!(
            adapter.authenticate(&base_channel(), &HeaderMap::new(), b"{}"),
            Err(Error::Forbidden { .. })
        ));
    }

    #[test]
    fn authenticate_accepts_without_configured_token() {
        let adapter = TelegramAdapter::new();
        let channel = channel(serde_json::json!({
            "bot_token": "123456:ABC",
            "bot_id": "herald_bot",
        }));
        assert!(adapter.authenticate(&channel, &HeaderMap::new(), b"{}").is_ok());
    }

    #[test]
    fn normalize_extracts_one_event_and_no_statuses() {
        let adapter = TelegramAdapter::new();
        let batch = adapter.normalize(&base_channel(), &update_body()).unwrap();

        assert_eq!(batch.events.len(), 1);
        assert!(batch.statuses.is_empty());
        let event = &batch.events[0];
        assert_eq!(event.provider_message_id, "100200300:7");
        assert_eq!(event.sender, "100200300");
        assert_eq!(event.recipient, "herald_bot");
        assert_eq!(event.sender_name.as_deref(), Some("Asha K"));
        assert_eq!(event.kind, MessageKind::Text);
        assert_eq!(event.body, "Hello");
        assert_eq!(event.raw["message_id"], 7);
    }

    #[test]
    fn normalize_callback_query() {
        let adapter = TelegramAdapter::new();
        let body = serde_json::to_vec(&serde_json::json!({
            "update_id": 9002,
            "callback_query": {
                "id": "55443322",
                "from": {"id": 100200300, "first_name": "Asha"},
                "data": "buy:42",
                "message": {"message_id": 7, "chat": {"id": 100200300}},
            },
        }))
        .unwrap();
        let batch = adapter.normalize(&base_channel(), &body).unwrap();
        assert_eq!(batch.events.len(), 1);
        let event = &batch.events[0];
        assert_eq!(event.kind, MessageKind::Callback);
        assert_eq!(event.provider_message_id, "cbq:55443322");
        let content: serde_json::Value = serde_json::from_str(&event.body).unwrap();
        assert_eq!(content["data"], "buy:42");
    }

    #[tokio::test]
    async fn send_text_calls_send_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123456:ABC/sendMessage")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "chat_id": 100200300,
                "text": "Hi there",
            })))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {"message_id": 88, "chat": {"id": 100200300}}}"#)
            .create_async()
            .await;

        let channel = channel(serde_json::json!({
            "bot_token": "123456:ABC",
            "bot_id": "herald_bot",
            "api_base": server.url(),
        }));
        let ack = TelegramAdapter::new()
            .send(&channel, "100200300", &OutboundPayload::text("Hi there"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(ack.provider_message_id, "100200300:88");
    }

    #[tokio::test]
    async fn send_rejects_api_level_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123456:ABC/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok": false, "description": "Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let channel = channel(serde_json::json!({
            "bot_token": "123456:ABC",
            "bot_id": "herald_bot",
            "api_base": server.url(),
        }));
        let result = TelegramAdapter::new()
            .send(&channel, "100200300", &OutboundPayload::text("hi"))
            .await;
        assert!(matches!(result, Err(Error::Provider { .. })));
    }

    #[tokio::test]
    async fn send_rejects_non_numeric_chat_id() {
        let result = TelegramAdapter::new()
            .send(&base_channel(), "not-a-chat", &OutboundPayload::text("hi"))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }
}
