//! Bridge to the external conversational agent.
//!
//! Two-phase protocol: forward the inbound message and receive an opaque
//! handle, then poll for the asynchronous answer under a bounded time
//! budget. The answer decomposes into an ordered plan of outbound sends,
//! optionally short-circuited by a handover part.

pub mod answer;
pub mod bridge;

pub use {
    answer::{ReplyPlan, decompose},
    bridge::{BotBridge, ForwardAck, PollOutcome},
};
