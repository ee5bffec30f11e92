//! Forward and poll phases of the bot round-trip.

use std::time::Duration;

use {
    anyhow::{Context, Result, bail},
    serde::Deserialize,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{bot as bot_metrics, counter};

use {herald_channels::model::InboundEvent, herald_config::schema::BotConfig};

/// Synchronous acknowledgment of a forwarded message.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardAck {
    /// Opaque handle keying the answer poll.
    pub handle: String,
}

/// How a poll cycle ended.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The endpoint produced an answer; parts are in reply order.
    Answer(Vec<serde_json::Value>),
    /// Explicit terminal failure (client-error status or ready-with-failure).
    /// Never retried; the conversation is left without a reply.
    TerminalFailure(String),
    /// The time budget ran out without a terminal outcome. A fresh inbound
    /// message restarts the cycle; there is no automatic retry.
    TimedOut,
}

#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    status: String,
    #[serde(default)]
    parts: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the conversational endpoint.
pub struct BotBridge {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    poll_budget: Duration,
    part_delay: Duration,
    image_part_delay: Duration,
}

impl BotBridge {
    #[must_use]
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            poll_budget: Duration::from_secs(config.poll_budget_secs),
            part_delay: Duration::from_millis(config.part_delay_ms),
            image_part_delay: Duration::from_millis(config.image_part_delay_ms),
        }
    }

    /// Pause to insert after sending one answer part; longer when the part
    /// carried an image, to respect provider rate expectations.
    #[must_use]
    pub fn pacing_delay(&self, sent_image: bool) -> Duration {
        if sent_image {
            self.image_part_delay
        } else {
            self.part_delay
        }
    }

    /// Phase 1: submit the canonical message plus raw payload. The ack must
    /// contain a handle; anything else is a hard failure surfaced to the
    /// owning task.
    pub async fn forward(&self, account_id: &str, event: &InboundEvent) -> Result<ForwardAck> {
        let url = format!("{}/messages", self.base_url);
        let body = serde_json::json!({
            "account_id": account_id,
            "message": event,
            "raw": event.raw,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("bot forward request")?;
        let status = response.status();
        if !status.is_success() {
            bail!("bot forward rejected ({status})");
        }

        let ack: ForwardAck = response
            .json()
            .await
            .context("bot forward ack missing handle")?;
        if ack.handle.is_empty() {
            bail!("bot forward ack contained an empty handle");
        }

        #[cfg(feature = "metrics")]
        counter!(bot_metrics::FORWARDS_TOTAL).increment(1);

        debug!(account_id, handle = %ack.handle, "forwarded message to bot");
        Ok(ack)
    }

    /// Phase 2: poll for the answer keyed by `handle` at the configured
    /// cadence until ready, terminal, or out of budget. Transport-level
    /// failures (network, 5xx) return `Err` and follow the task retry
    /// policy; everything else resolves to a [`PollOutcome`].
    pub async fn poll(&self, handle: &str) -> Result<PollOutcome> {
        let url = format!("{}/replies/{handle}", self.base_url);
        let deadline = tokio::time::Instant::now() + self.poll_budget;

        loop {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .context("bot poll request")?;
            let status = response.status();

            // Client-error classes are terminal: the handle is bad or the
            // conversation is gone. Polling again cannot help.
            if matches!(status.as_u16(), 400 | 404 | 409) {
                #[cfg(feature = "metrics")]
                counter!(bot_metrics::TERMINAL_FAILURES_TOTAL).increment(1);
                return Ok(PollOutcome::TerminalFailure(format!(
                    "terminal poll status {status} for handle {handle}"
                )));
            }
            if !status.is_success() {
                bail!("bot poll failed ({status})");
            }

            let envelope: ReplyEnvelope =
                response.json().await.context("bot poll envelope")?;
            match envelope.status.as_str() {
                "pending" | "processing" => {},
                "failed" => {
                    #[cfg(feature = "metrics")]
                    counter!(bot_metrics::TERMINAL_FAILURES_TOTAL).increment(1);
                    return Ok(PollOutcome::TerminalFailure(
                        envelope
                            .error
                            .unwrap_or_else(|| "bot reported internal failure".into()),
                    ));
                },
                "ready" => {
                    #[cfg(feature = "metrics")]
                    counter!(bot_metrics::REPLIES_TOTAL).increment(1);
                    return Ok(PollOutcome::Answer(envelope.parts));
                },
                other => {
                    warn!(handle, status = other, "unknown bot reply status, still waiting");
                },
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                #[cfg(feature = "metrics")]
                counter!(bot_metrics::POLL_TIMEOUTS_TOTAL).increment(1);
                return Ok(PollOutcome::TimedOut);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
