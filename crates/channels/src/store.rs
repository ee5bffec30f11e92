//! Persistence traits consumed by the pipeline. Concrete SQLite
//! implementations live in `herald-store`.

use {anyhow::Result, async_trait::async_trait, serde::Serialize};

use crate::model::{
    ChannelKind, DeliveryStatus, InboundEvent, MessageKind, MessageRecord, PersistOutcome,
};

// ── Channels ────────────────────────────────────────────────────────────────

/// Whether a channel account participates in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Active,
    Disabled,
}

impl ChannelState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// A persisted channel (provider account) configuration.
///
/// `config` holds the provider-specific credential and routing document;
/// adapters deserialize it into their typed config on use. Secrets therefore
/// never live in long-lived fields here.
#[derive(Debug, Clone, Serialize)]
pub struct StoredChannel {
    pub account_id: String,
    pub kind: ChannelKind,
    pub config: serde_json::Value,
    pub status: ChannelState,
    pub is_default: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StoredChannel {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ChannelState::Active
    }
}

/// Persistent storage for channel configurations.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn list(&self) -> Result<Vec<StoredChannel>>;
    async fn get(&self, account_id: &str) -> Result<Option<StoredChannel>>;
    async fn upsert(&self, channel: StoredChannel) -> Result<()>;
    async fn delete(&self, account_id: &str) -> Result<()>;
}

// ── Messages ────────────────────────────────────────────────────────────────

/// Fields of an outbound message accepted by the provider.
#[derive(Debug, Clone)]
pub struct NewOutboundMessage {
    pub account_id: String,
    pub provider_message_id: String,
    /// The channel's own address — what marks the row as outbound.
    pub sender: String,
    pub recipient: String,
    pub kind: MessageKind,
    pub body: String,
    pub raw_response: Option<serde_json::Value>,
    pub sent_at: i64,
}

/// Message persistence with the provider-id idempotency guarantee.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Idempotent insert keyed by the provider message id. A concurrent or
    /// repeated delivery of the same id yields `Duplicate` with the existing
    /// row, never an error.
    async fn persist_inbound(&self, account_id: &str, event: &InboundEvent)
    -> Result<PersistOutcome>;

    /// Record an accepted outbound send with status `sent`.
    async fn record_outbound(&self, outbound: NewOutboundMessage) -> Result<MessageRecord>;

    async fn find_by_provider_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<MessageRecord>>;

    /// Overwrite the status of the message with this provider id. Returns
    /// false when no such message exists.
    async fn apply_status(
        &self,
        provider_message_id: &str,
        status: DeliveryStatus,
        raw: &serde_json::Value,
    ) -> Result<bool>;

    /// Latest messages exchanged between the channel and one peer, newest
    /// first.
    async fn recent_conversation(
        &self,
        account_id: &str,
        peer: &str,
        limit: u32,
    ) -> Result<Vec<MessageRecord>>;

    /// Timestamp of the last message either direction with this peer on this
    /// channel. Feeds the session-window reachability filter.
    async fn last_exchange_at(&self, account_id: &str, peer: &str) -> Result<Option<i64>>;
}

// ── Contacts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Active,
    Inactive,
    Blocked,
}

impl ContactStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Blocked => "blocked",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// A durable record of the external party in a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ContactRecord {
    pub id: i64,
    /// Stable external identifier (phone number, platform user id).
    pub identifier: String,
    pub display_name: String,
    pub status: ContactStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Contact persistence. Creation is lazy, on first inbound message from an
/// unseen identifier.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn get(&self, identifier: &str) -> Result<Option<ContactRecord>>;
    async fn create(&self, identifier: &str, display_name: &str) -> Result<ContactRecord>;
    async fn update_display_name(&self, identifier: &str, display_name: &str) -> Result<()>;
}

// ── Entity metadata ─────────────────────────────────────────────────────────

/// One entry of an entity's key/value collection.
#[derive(Debug, Clone, Serialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
    pub created_at: i64,
}

/// Generic key/value metadata attached to an entity (contact linkage, message
/// extension attributes). Keys are unique per entity; `set` is
/// last-write-wins; `entries` preserves insertion order.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn get(&self, entity_kind: &str, entity_id: &str, key: &str) -> Result<Option<String>>;
    async fn set(&self, entity_kind: &str, entity_id: &str, key: &str, value: &str) -> Result<()>;
    async fn entries(&self, entity_kind: &str, entity_id: &str) -> Result<Vec<MetaEntry>>;
}
