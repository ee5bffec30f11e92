//! Candidate resolution, session-window filtering, and dispatch.

use std::{collections::HashSet, sync::Arc};

use {
    anyhow::Result,
    serde::Deserialize,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, handover as ho_metrics};

use {
    herald_channels::{
        model::{HandoverContext, InboundEvent, MessageKind, OutboundPayload},
        store::{ContactStore, MessageStore, StoredChannel},
    },
    herald_config::schema::HandoverConfig,
    herald_tasks::{TaskQueue, TaskSpec},
};

use crate::summary::{SummaryInput, render};

/// Handover routing lists embedded in a channel's config document. Both
/// lists default to empty so channels without human support parse cleanly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandoverTargets {
    #[serde(default)]
    pub handover_teams: Vec<String>,
    #[serde(default)]
    pub handover_users: Vec<String>,
}

impl HandoverTargets {
    #[must_use]
    pub fn from_channel(channel: &StoredChannel) -> Self {
        serde_json::from_value(channel.config.clone()).unwrap_or_default()
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Forwards inbound content (or a handover summary) to reachable human
/// agents.
pub struct AgentForwarder {
    messages: Arc<dyn MessageStore>,
    contacts: Arc<dyn ContactStore>,
    queue: Arc<dyn TaskQueue>,
    config: HandoverConfig,
}

impl AgentForwarder {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        contacts: Arc<dyn ContactStore>,
        queue: Arc<dyn TaskQueue>,
        config: HandoverConfig,
    ) -> Self {
        Self {
            messages,
            contacts,
            queue,
            config,
        }
    }

    /// Forward `event` on `channel` to every reachable agent. Returns the
    /// number of sends enqueued; zero reachable agents is a logged no-op,
    /// not an error.
    pub async fn forward(
        &self,
        channel: &StoredChannel,
        event: &InboundEvent,
        handover: Option<&HandoverContext>,
    ) -> Result<usize> {
        let candidates = self.expand_candidates(channel);
        if candidates.is_empty() {
            debug!(account_id = %channel.account_id, "no agents configured for channel");
            return Ok(0);
        }

        let (reachable, inactive) = self.filter_session_window(channel, &candidates).await?;
        if !inactive.is_empty() {
            info!(
                account_id = %channel.account_id,
                inactive = ?inactive,
                "agents outside the session window, excluded from this delivery"
            );
            #[cfg(feature = "metrics")]
            counter!(ho_metrics::AGENTS_FILTERED_TOTAL).increment(inactive.len() as u64);
        }
        if reachable.is_empty() {
            info!(account_id = %channel.account_id, "no reachable agent, skipping forward");
            #[cfg(feature = "metrics")]
            counter!(ho_metrics::NO_AGENT_TOTAL).increment(1);
            return Ok(0);
        }

        let payload = match handover {
            Some(context) => self.summary_payload(channel, event, context).await?,
            None => forwarded_payload(event),
        };

        // One independent task per agent; a failed submit must not block
        // the remaining agents.
        let mut enqueued = 0;
        for agent in &reachable {
            let spec = TaskSpec::SendOutbound {
                account_id: channel.account_id.clone(),
                to: agent.clone(),
                payload: payload.clone(),
            };
            match self.queue.submit(spec).await {
                Ok(_) => enqueued += 1,
                Err(e) => warn!(agent, error = %e, "failed to enqueue agent forward"),
            }
        }

        #[cfg(feature = "metrics")]
        counter!(ho_metrics::FORWARDS_TOTAL).increment(1);

        Ok(enqueued)
    }

    /// Teams expanded to members, then direct users, de-duplicated with the
    /// first occurrence keeping its position.
    fn expand_candidates(&self, channel: &StoredChannel) -> Vec<String> {
        let targets = HandoverTargets::from_channel(channel);
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for team in &targets.handover_teams {
            match self.config.teams.get(team) {
                Some(members) => {
                    for member in members {
                        if seen.insert(member.clone()) {
                            candidates.push(member.clone());
                        }
                    }
                },
                None => warn!(team, "unknown handover team in channel config"),
            }
        }
        for user in &targets.handover_users {
            if seen.insert(user.clone()) {
                candidates.push(user.clone());
            }
        }

        candidates
    }

    async fn filter_session_window(
        &self,
        channel: &StoredChannel,
        candidates: &[String],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let cutoff = now_secs() - self.config.session_window_secs;
        let mut reachable = Vec::new();
        let mut inactive = Vec::new();

        for agent in candidates {
            let last = self
                .messages
                .last_exchange_at(&channel.account_id, agent)
                .await?;
            match last {
                Some(ts) if ts >= cutoff => reachable.push(agent.clone()),
                _ => inactive.push(agent.clone()),
            }
        }

        Ok((reachable, inactive))
    }

    async fn summary_payload(
        &self,
        channel: &StoredChannel,
        event: &InboundEvent,
        context: &HandoverContext,
    ) -> Result<OutboundPayload> {
        let contact_name = self
            .contacts
            .get(&event.sender)
            .await?
            .map(|c| c.display_name)
            .unwrap_or_else(|| event.sender.clone());

        let mut turns = self
            .messages
            .recent_conversation(&channel.account_id, &event.sender, self.config.history_turns)
            .await?;
        turns.reverse(); // oldest first for reading order

        Ok(OutboundPayload::text(render(&SummaryInput {
            context,
            contact_name: &contact_name,
            account_id: &channel.account_id,
            event,
            turns: &turns,
        })))
    }
}

/// Wrap the original content with a forwarded-from prefix, preserving the
/// media type: an image stays an image with a prefixed caption, everything
/// else flattens to text.
fn forwarded_payload(event: &InboundEvent) -> OutboundPayload {
    let from = event.sender_name.as_deref().unwrap_or(&event.sender);

    if event.kind == MessageKind::Image
        && let Ok(doc) = serde_json::from_str::<serde_json::Value>(&event.body)
        && let Some(url) = doc["url"].as_str().or_else(|| doc["link"].as_str())
    {
        let caption = doc["caption"].as_str().unwrap_or_default();
        let caption = if caption.is_empty() {
            format!("Forwarded from {from}")
        } else {
            format!("Forwarded from {from}: {caption}")
        };
        return OutboundPayload::Image {
            url: url.to_string(),
            caption: Some(caption),
        };
    }

    OutboundPayload::text(format!("Forwarded from {from}:\n{}", event.body))
}
