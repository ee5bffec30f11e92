//! WhatsApp Cloud webhook payload shapes.

use serde::Deserialize;

use herald_channels::model::{DeliveryStatus, MessageKind};

/// Top-level webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: String,
    pub value: ChangeValue,
}

/// The interesting part of a `messages` change: message entries and status
/// entries arrive side by side and are processed independently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<ContactEntry>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub statuses: Vec<StatusEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactEntry {
    pub wa_id: String,
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactProfile {
    pub name: String,
}

/// One inbound message entry. Only the envelope fields are typed; the
/// kind-specific payload stays in the raw fragment.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: Option<TextContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub body: String,
}

impl InboundMessage {
    /// Map the provider's type string onto the canonical kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self.message_type.as_str() {
            "text" => MessageKind::Text,
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            "audio" | "voice" => MessageKind::Audio,
            "document" => MessageKind::Document,
            "sticker" => MessageKind::Sticker,
            "location" => MessageKind::Location,
            "contacts" => MessageKind::ContactCard,
            "interactive" | "button" => MessageKind::Callback,
            _ => MessageKind::Unknown,
        }
    }

    /// Extract the canonical content: plain text for text messages, the
    /// kind-specific provider object (tagged with the canonical kind) as a
    /// self-describing JSON document otherwise.
    #[must_use]
    pub fn content(&self, raw_fragment: &serde_json::Value) -> String {
        if let Some(ref text) = self.text {
            return text.body.clone();
        }
        let mut doc = serde_json::Map::new();
        doc.insert("kind".into(), serde_json::Value::String(self.kind().as_str().into()));
        if let Some(payload) = raw_fragment.get(&self.message_type).cloned() {
            doc.insert(self.message_type.clone(), payload);
        }
        serde_json::Value::Object(doc).to_string()
    }

    /// Provider-reported unix seconds, when parseable.
    #[must_use]
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.timestamp.as_deref().and_then(|t| t.parse().ok())
    }
}

/// One delivery-status entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEntry {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl StatusEntry {
    #[must_use]
    pub fn delivery_status(&self) -> Option<DeliveryStatus> {
        match self.status.as_str() {
            "sent" => Some(DeliveryStatus::Sent),
            "delivered" => Some(DeliveryStatus::Delivered),
            "read" => Some(DeliveryStatus::Read),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.timestamp.as_deref().and_then(|t| t.parse().ok())
    }
}
