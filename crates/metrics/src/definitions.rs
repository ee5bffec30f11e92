//! Metric name and label definitions.
//!
//! This module defines all metric names and common label keys used throughout
//! herald. Centralizing these definitions ensures consistency and makes it
//! easier to document what metrics are available.

/// Webhook surface metrics
pub mod webhook {
    /// Total webhook data calls accepted
    pub const CALLS_TOTAL: &str = "herald_webhook_calls_total";
    /// Webhook calls rejected at the boundary (bad signature/token)
    pub const REJECTED_TOTAL: &str = "herald_webhook_rejected_total";
    /// Handshake verification attempts
    pub const HANDSHAKES_TOTAL: &str = "herald_webhook_handshakes_total";
}

/// Ingest pipeline metrics
pub mod ingest {
    /// Messages persisted for the first time
    pub const MESSAGES_TOTAL: &str = "herald_ingest_messages_total";
    /// Redelivered messages dropped by the idempotency check
    pub const DUPLICATES_TOTAL: &str = "herald_ingest_duplicates_total";
    /// Status callbacks applied to stored messages
    pub const STATUSES_APPLIED_TOTAL: &str = "herald_ingest_statuses_applied_total";
    /// Status callbacks skipped (unknown message id)
    pub const STATUSES_SKIPPED_TOTAL: &str = "herald_ingest_statuses_skipped_total";
}

/// Chatbot bridge metrics
pub mod bot {
    /// Messages forwarded to the conversational endpoint
    pub const FORWARDS_TOTAL: &str = "herald_bot_forwards_total";
    /// Answers received and decomposed
    pub const REPLIES_TOTAL: &str = "herald_bot_replies_total";
    /// Poll cycles that exhausted the time budget
    pub const POLL_TIMEOUTS_TOTAL: &str = "herald_bot_poll_timeouts_total";
    /// Poll cycles ended by a terminal endpoint status
    pub const TERMINAL_FAILURES_TOTAL: &str = "herald_bot_terminal_failures_total";
    /// Answer parts skipped because their type is unrecognized
    pub const PARTS_SKIPPED_TOTAL: &str = "herald_bot_parts_skipped_total";
}

/// Human-agent forwarding metrics
pub mod handover {
    /// Forwards dispatched to at least one agent
    pub const FORWARDS_TOTAL: &str = "herald_handover_forwards_total";
    /// Forwards with no reachable agent
    pub const NO_AGENT_TOTAL: &str = "herald_handover_no_agent_total";
    /// Agents filtered out by the session window
    pub const AGENTS_FILTERED_TOTAL: &str = "herald_handover_agents_filtered_total";
}

/// Outbound dispatch metrics
pub mod outbound {
    /// Sends accepted by the provider
    pub const SENT_TOTAL: &str = "herald_outbound_sent_total";
    /// Sends rejected or failed
    pub const FAILURES_TOTAL: &str = "herald_outbound_failures_total";
    /// Provider send duration in seconds
    pub const SEND_DURATION_SECONDS: &str = "herald_outbound_send_duration_seconds";
}

/// Task runner metrics
pub mod tasks {
    /// Task executions by kind
    pub const EXECUTIONS_TOTAL: &str = "herald_tasks_executions_total";
    /// Attempts that failed and were requeued
    pub const RETRIES_TOTAL: &str = "herald_tasks_retries_total";
    /// Tasks that exhausted all attempts
    pub const FAILED_TOTAL: &str = "herald_tasks_failed_total";
    /// Task execution duration in seconds
    pub const DURATION_SECONDS: &str = "herald_tasks_duration_seconds";
}

/// Channel registry metrics
pub mod channels {
    /// Provider adapters registered
    pub const ADAPTERS_REGISTERED: &str = "herald_channel_adapters_registered";
    /// Active channel accounts
    pub const ACTIVE: &str = "herald_channels_active";
}

/// Common label keys used across metrics
pub mod labels {
    pub const PROVIDER: &str = "provider";
    pub const ACCOUNT_ID: &str = "account_id";
    pub const KIND: &str = "kind";
    pub const STATUS: &str = "status";
}
