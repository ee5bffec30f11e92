//! `ProviderAdapter` implementation for the WhatsApp Cloud API.

use std::collections::HashMap;

use {
    async_trait::async_trait,
    hmac::{Hmac, Mac},
    http::HeaderMap,
    secrecy::ExposeSecret,
    sha2::Sha256,
    tracing::{debug, warn},
};

use herald_channels::{
    Error, Result,
    adapter::{ProviderAdapter, ProviderSendAck},
    model::{ChannelKind, InboundEvent, NormalizedBatch, OutboundPayload, StatusEvent},
    store::StoredChannel,
};

use crate::{config::WhatsAppChannelConfig, payload::WebhookPayload};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v20.0";

/// WhatsApp Cloud API adapter: webhook handshake and signature verification,
/// payload normalization, Graph API sends.
pub struct WhatsAppAdapter {
    http: reqwest::Client,
    api_base: String,
}

impl Default for WhatsAppAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WhatsAppAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.into(),
        }
    }

    fn api_base<'a>(&'a self, config: &'a WhatsAppChannelConfig) -> &'a str {
        config.api_base.as_deref().unwrap_or(&self.api_base)
    }
}

/// Verify the `X-Hub-Signature-256` header (`sha256=<hex>`) over the raw
/// body.
fn verify_signature(body: &[u8], signature_header: &str, app_secret: &str) -> bool {
    let Some(expected) = signature_header.strip_prefix("sha256=") else {
        warn!("invalid signature header format (missing sha256= prefix)");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        warn!("failed to create HMAC");
        return false;
    };
    mac.update(body);
    let computed = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&computed, expected)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[async_trait]
impl ProviderAdapter for WhatsAppAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    fn own_address(&self, channel: &StoredChannel) -> Result<String> {
        Ok(WhatsAppChannelConfig::from_channel(channel)?.phone_number_id)
    }

    fn verify_handshake(
        &self,
        channel: &StoredChannel,
        params: &HashMap<String, String>,
    ) -> Result<String> {
        let config = WhatsAppChannelConfig::from_channel(channel)?;
        let mode = params.get("hub.mode").map(String::as_str);
        let token = params.get("hub.verify_token").map(String::as_str);
        let challenge = params
            .get("hub.challenge")
            .ok_or_else(|| Error::invalid_input("missing hub.challenge"))?;

        if mode == Some("subscribe") && token == Some(config.verify_token.expose_secret()) {
            Ok(challenge.clone())
        } else {
            Err(Error::forbidden("webhook verify token mismatch"))
        }
    }

    fn authenticate(
        &self,
        channel: &StoredChannel,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<()> {
        let config = WhatsAppChannelConfig::from_channel(channel)?;
        let Some(app_secret) = config.app_secret else {
            return Ok(());
        };

        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::forbidden("missing X-Hub-Signature-256 header"))?;
        if !verify_signature(body, signature, app_secret.expose_secret()) {
            return Err(Error::forbidden("webhook signature mismatch"));
        }
        Ok(())
    }

    fn normalize(&self, channel: &StoredChannel, body: &[u8]) -> Result<NormalizedBatch> {
        let config = WhatsAppChannelConfig::from_channel(channel)?;
        // Parse to a Value first so each event keeps its verbatim fragment.
        let raw: serde_json::Value = serde_json::from_slice(body)?;
        let payload: WebhookPayload = serde_json::from_value(raw.clone())?;

        let mut batch = NormalizedBatch::default();

        for (i, entry) in payload.entry.iter().enumerate() {
            for (j, change) in entry.changes.iter().enumerate() {
                if change.field != "messages" {
                    debug!(field = %change.field, "ignoring non-message webhook change");
                    continue;
                }
                let value = &change.value;

                if let Some(ref metadata) = value.metadata
                    && metadata.phone_number_id != config.phone_number_id
                {
                    warn!(
                        account_id = %channel.account_id,
                        expected = %config.phone_number_id,
                        received = %metadata.phone_number_id,
                        "phone number ID mismatch, skipping change"
                    );
                    continue;
                }

                let names: HashMap<&str, &str> = value
                    .contacts
                    .iter()
                    .filter_map(|c| {
                        c.profile.as_ref().map(|p| (c.wa_id.as_str(), p.name.as_str()))
                    })
                    .collect();

                let change_raw = &raw["entry"][i]["changes"][j]["value"];

                for (k, msg) in value.messages.iter().enumerate() {
                    let fragment = change_raw["messages"][k].clone();
                    batch.events.push(InboundEvent {
                        provider_message_id: msg.id.clone(),
                        sender: msg.from.clone(),
                        recipient: config.phone_number_id.clone(),
                        sender_name: names.get(msg.from.as_str()).map(|n| (*n).to_string()),
                        kind: msg.kind(),
                        body: msg.content(&fragment),
                        timestamp: msg.timestamp_secs().unwrap_or_else(now_secs),
                        raw: fragment,
                    });
                }

                for (k, status) in value.statuses.iter().enumerate() {
                    let Some(delivery_status) = status.delivery_status() else {
                        warn!(status = %status.status, "unknown status value, skipping");
                        continue;
                    };
                    batch.statuses.push(StatusEvent {
                        provider_message_id: status.id.clone(),
                        status: delivery_status,
                        recipient: status.recipient_id.clone(),
                        timestamp: status.timestamp_secs().unwrap_or_else(now_secs),
                        raw: change_raw["statuses"][k].clone(),
                    });
                }
            }
        }

        Ok(batch)
    }

    async fn send(
        &self,
        channel: &StoredChannel,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<ProviderSendAck> {
        let config = WhatsAppChannelConfig::from_channel(channel)?;

        let mut request = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
        });
        let body = request
            .as_object_mut()
            .ok_or_else(|| Error::invalid_input("request body is not an object"))?;
        match payload {
            OutboundPayload::Text { body: text } => {
                body.insert("type".into(), "text".into());
                body.insert("text".into(), serde_json::json!({ "body": text }));
            },
            OutboundPayload::Image { url, .. } => {
                let mut image = serde_json::json!({ "link": url });
                // Empty captions must be omitted, not sent as "".
                if let Some(caption) = payload.caption()
                    && let Some(obj) = image.as_object_mut()
                {
                    obj.insert("caption".into(), caption.into());
                }
                body.insert("type".into(), "image".into());
                body.insert("image".into(), image);
            },
        }

        let url = format!(
            "{}/{}/messages",
            self.api_base(&config).trim_end_matches('/'),
            config.phone_number_id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(config.access_token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::external("whatsapp send", e))?;

        let status = response.status();
        let raw: serde_json::Value = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);
        if !status.is_success() {
            return Err(Error::provider(format!(
                "whatsapp send failed ({status}): {raw}"
            )));
        }

        let provider_message_id = raw["messages"][0]["id"]
            .as_str()
            .ok_or_else(|| Error::provider("whatsapp send response missing message id"))?
            .to_string();

        Ok(ProviderSendAck {
            provider_message_id,
            raw,
        })
    }
}
