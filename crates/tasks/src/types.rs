//! Task specifications and the retry policy.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use herald_channels::model::{HandoverContext, InboundEvent, OutboundPayload, StatusEvent};

/// Unique id of one submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub uuid::Uuid);

impl TaskId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One schedulable unit of pipeline work.
///
/// Routing maps to these by kind; the single executor in the gateway matches
/// on the variant. Adding a routing rule never touches dispatch logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSpec {
    /// Persist one normalized inbound event and resolve its contact.
    IngestMessage {
        account_id: String,
        event: InboundEvent,
    },
    /// Apply provider delivery-status callbacks to stored messages.
    ApplyStatuses {
        account_id: String,
        statuses: Vec<StatusEvent>,
    },
    /// Forward an inbound message to the conversational endpoint.
    ForwardToBot {
        account_id: String,
        event: InboundEvent,
    },
    /// Poll the conversational endpoint for the answer to a forward.
    PollBotReply {
        account_id: String,
        event: InboundEvent,
        handle: String,
    },
    /// Forward an inbound message (or a handover summary) to human agents.
    ForwardToHuman {
        account_id: String,
        event: InboundEvent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handover: Option<HandoverContext>,
    },
    /// Execute one provider send.
    SendOutbound {
        account_id: String,
        to: String,
        payload: OutboundPayload,
    },
}

impl TaskSpec {
    /// Stable kind name for logs and metrics labels.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::IngestMessage { .. } => "ingest_message",
            Self::ApplyStatuses { .. } => "apply_statuses",
            Self::ForwardToBot { .. } => "forward_to_bot",
            Self::PollBotReply { .. } => "poll_bot_reply",
            Self::ForwardToHuman { .. } => "forward_to_human",
            Self::SendOutbound { .. } => "send_outbound",
        }
    }

    /// The channel account this task operates on.
    #[must_use]
    pub fn account_id(&self) -> &str {
        match self {
            Self::IngestMessage { account_id, .. }
            | Self::ApplyStatuses { account_id, .. }
            | Self::ForwardToBot { account_id, .. }
            | Self::PollBotReply { account_id, .. }
            | Self::ForwardToHuman { account_id, .. }
            | Self::SendOutbound { account_id, .. } => account_id,
        }
    }
}

/// Per-unit retry behavior: bounded attempts with a fixed backoff, each
/// attempt cut off at the execution timeout.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}
