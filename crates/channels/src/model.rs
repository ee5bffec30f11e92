//! Canonical message model.
//!
//! Inbound webhooks from every provider normalize into these types; outbound
//! sends are built from them. Provider-specific payload shapes never cross
//! the adapter boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Channel kind ────────────────────────────────────────────────────────────

/// Provider discriminant for a channel account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Whatsapp,
    Telegram,
}

impl ChannelKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "whatsapp" => Some(Self::Whatsapp),
            "telegram" => Some(Self::Telegram),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Message kind ────────────────────────────────────────────────────────────

/// Detected content type of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    ContactCard,
    Poll,
    Callback,
    Unknown,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Location => "location",
            Self::ContactCard => "contact_card",
            Self::Poll => "poll",
            Self::Callback => "callback",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "document" => Self::Document,
            "sticker" => Self::Sticker,
            "location" => Self::Location,
            "contact_card" => Self::ContactCard,
            "poll" => Self::Poll,
            "callback" => Self::Callback,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Delivery status ─────────────────────────────────────────────────────────

/// Lifecycle status of a stored message.
///
/// Transitions are last-write-wins; [`DeliveryStatus::rank`] exists so the
/// reconciler can notice a regression and log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Received,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "received" => Some(Self::Received),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Position in the normal delivery progression. `Failed` is terminal and
    /// ranks above everything so it never reads as a regression.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Normalized webhook output ───────────────────────────────────────────────

/// One inbound message extracted from a provider webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Provider-assigned message id — the idempotency key.
    pub provider_message_id: String,
    /// Sender identifier in provider format (phone number, user id).
    pub sender: String,
    /// The channel-side address the message was sent to.
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub kind: MessageKind,
    /// Plain text, or a structured payload serialized as JSON for non-text
    /// kinds.
    pub body: String,
    /// Provider-reported unix seconds, falling back to receipt time.
    pub timestamp: i64,
    /// Original payload fragment, preserved verbatim.
    pub raw: serde_json::Value,
}

/// One delivery-status callback extracted from a provider webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub provider_message_id: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub timestamp: i64,
    pub raw: serde_json::Value,
}

/// Everything one webhook data call normalizes into. Messages and statuses
/// arrive in the same call and are processed independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedBatch {
    pub events: Vec<InboundEvent>,
    pub statuses: Vec<StatusEvent>,
}

impl NormalizedBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.statuses.is_empty()
    }
}

// ── Outbound payload ────────────────────────────────────────────────────────

/// Content of one outbound send, by declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text {
        body: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl OutboundPayload {
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Image { .. } => MessageKind::Image,
        }
    }

    /// Caption with empty strings collapsed to `None`. Provider requests must
    /// omit the caption field entirely rather than send an empty string.
    #[must_use]
    pub fn caption(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image { caption, .. } => caption.as_deref().filter(|c| !c.is_empty()),
        }
    }

    /// Stored message body for this payload: the plain text for text sends,
    /// the serialized payload document otherwise.
    #[must_use]
    pub fn stored_body(&self) -> String {
        match self {
            Self::Text { body } => body.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

// ── Handover ────────────────────────────────────────────────────────────────

/// Context carried when an automated conversation is handed to a human
/// agent: why the bot gave up and what it suggests doing next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverContext {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

// ── Stored message ──────────────────────────────────────────────────────────

/// A persisted message row, either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub account_id: String,
    pub provider_message_id: String,
    pub sender: String,
    pub recipient: String,
    pub kind: MessageKind,
    pub body: String,
    pub status: DeliveryStatus,
    /// Event timestamp (unix seconds).
    pub sent_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    pub created_at: i64,
}

impl MessageRecord {
    /// Direction is implied, not stored: a message whose sender is the
    /// channel's own address is outbound.
    #[must_use]
    pub fn is_outbound(&self, own_address: &str) -> bool {
        self.sender == own_address
    }
}

/// Result of the idempotent persist path.
#[derive(Debug, Clone)]
pub enum PersistOutcome {
    Created(MessageRecord),
    Duplicate(MessageRecord),
}

impl PersistOutcome {
    #[must_use]
    pub fn record(&self) -> &MessageRecord {
        match self {
            Self::Created(record) | Self::Duplicate(record) => record,
        }
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}
