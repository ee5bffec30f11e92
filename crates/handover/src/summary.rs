//! Handover summary rendering.

use chrono::DateTime;

use herald_channels::model::{HandoverContext, InboundEvent, MessageRecord};

/// Everything the summary template needs.
pub struct SummaryInput<'a> {
    pub context: &'a HandoverContext,
    pub contact_name: &'a str,
    pub account_id: &'a str,
    pub event: &'a InboundEvent,
    /// Recent turns, oldest first.
    pub turns: &'a [MessageRecord],
}

/// Render the handover as a single text block: trigger reason, suggested
/// next action, contact, diagnostic identifiers, and the last conversation
/// turns.
#[must_use]
pub fn render(input: &SummaryInput<'_>) -> String {
    let mut out = String::from("⚠ Conversation handover\n");
    out.push_str(&format!("Reason: {}\n", input.context.reason));
    if let Some(ref action) = input.context.suggested_action {
        out.push_str(&format!("Suggested action: {action}\n"));
    }
    out.push_str(&format!(
        "Contact: {} ({})\n",
        input.contact_name, input.event.sender
    ));
    out.push_str(&format!(
        "Channel: {} · message {}\n",
        input.account_id, input.event.provider_message_id
    ));

    if !input.turns.is_empty() {
        out.push_str("\nRecent conversation:\n");
        for turn in input.turns {
            let direction = if turn.sender == input.event.sender {
                "customer"
            } else {
                "us"
            };
            let when = DateTime::from_timestamp(turn.sent_at, 0)
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default();
            out.push_str(&format!("[{when} {direction}] {}\n", turn.body));
        }
    }

    out
}
