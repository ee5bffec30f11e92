//! Human-agent forwarding.
//!
//! Expands the channel's configured teams and users into candidate agents,
//! filters them through the provider session window, and enqueues one
//! independent outbound send per reachable agent — the original content
//! wrapped with a forwarded-from prefix, or a handover summary when the bot
//! gave the conversation up.

pub mod forwarder;
pub mod summary;

pub use forwarder::{AgentForwarder, HandoverTargets};
