//! The single task executor behind the worker pool.
//!
//! Every [`TaskSpec`] variant is matched here; stages enqueue follow-up
//! stages through the shared queue instead of calling each other directly,
//! so each stage carries its own retry budget.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, ingest as ingest_metrics};

use {
    herald_botlink::{BotBridge, PollOutcome, decompose},
    herald_channels::{
        events::{DeliveryEvent, DeliveryEventSink},
        model::{HandoverContext, InboundEvent, MessageKind, PersistOutcome, StatusEvent},
        store::{ChannelStore, MessageStore, MetaStore, StoredChannel},
    },
    herald_dispatch::OutboundDispatcher,
    herald_handover::AgentForwarder,
    herald_routing::{RouteTarget, RoutingTable},
    herald_store::ContactResolver,
    herald_tasks::{TaskExecutor, TaskQueue, TaskSpec},
};

/// All pipeline collaborators, wired once at startup.
pub struct Pipeline {
    pub channels: Arc<dyn ChannelStore>,
    pub messages: Arc<dyn MessageStore>,
    pub meta: Arc<dyn MetaStore>,
    pub resolver: Arc<ContactResolver>,
    pub routing: RoutingTable,
    pub queue: Arc<dyn TaskQueue>,
    pub bridge: Arc<BotBridge>,
    pub forwarder: Arc<AgentForwarder>,
    pub dispatcher: Arc<OutboundDispatcher>,
    pub events: Arc<dyn DeliveryEventSink>,
}

#[async_trait]
impl TaskExecutor for Pipeline {
    async fn execute(&self, spec: TaskSpec) -> Result<()> {
        match spec {
            TaskSpec::IngestMessage { account_id, event } => {
                self.ingest(&account_id, event).await
            },
            TaskSpec::ApplyStatuses {
                account_id,
                statuses,
            } => self.apply_statuses(&account_id, &statuses).await,
            TaskSpec::ForwardToBot { account_id, event } => {
                self.forward_to_bot(&account_id, event).await
            },
            TaskSpec::PollBotReply {
                account_id,
                event,
                handle,
            } => self.poll_bot_reply(&account_id, event, &handle).await,
            TaskSpec::ForwardToHuman {
                account_id,
                event,
                handover,
            } => self.forward_to_human(&account_id, &event, handover).await,
            TaskSpec::SendOutbound {
                account_id,
                to,
                payload,
            } => {
                self.dispatcher.send(&account_id, &to, &payload).await?;
                Ok(())
            },
        }
    }
}

impl Pipeline {
    /// Persist, resolve the contact, record extension attributes, and fan
    /// out to the routed targets. Duplicate deliveries stop here.
    async fn ingest(&self, account_id: &str, event: InboundEvent) -> Result<()> {
        let Some(channel) = self.active_channel(account_id).await? else {
            warn!(account_id, "channel gone or disabled, dropping inbound event");
            return Ok(());
        };

        let record = match self.messages.persist_inbound(account_id, &event).await? {
            PersistOutcome::Duplicate(existing) => {
                debug!(
                    account_id,
                    provider_message_id = %existing.provider_message_id,
                    "duplicate delivery, already ingested"
                );
                #[cfg(feature = "metrics")]
                counter!(ingest_metrics::DUPLICATES_TOTAL).increment(1);
                return Ok(());
            },
            PersistOutcome::Created(record) => record,
        };
        #[cfg(feature = "metrics")]
        counter!(ingest_metrics::MESSAGES_TOTAL).increment(1);

        self.resolver
            .resolve(&event.sender, event.sender_name.as_deref(), &channel)
            .await?;

        // Extension attributes live in the entity-metadata collection, not
        // as message columns.
        let message_id = record.id.to_string();
        if let Some(ref name) = event.sender_name {
            self.meta
                .set("message", &message_id, "sender_name", name)
                .await?;
        }
        if event.kind != MessageKind::Text {
            self.meta
                .set("message", &message_id, "media", &event.body)
                .await?;
        }

        self.events
            .emit(DeliveryEvent::MessageReceived {
                account_id: account_id.to_string(),
                provider_message_id: event.provider_message_id.clone(),
                sender: event.sender.clone(),
                body: event.body.clone(),
                timestamp: event.timestamp,
            })
            .await;

        info!(
            account_id,
            provider_message_id = %event.provider_message_id,
            sender = %event.sender,
            kind = %event.kind,
            "inbound message ingested"
        );

        for target in self.routing.route(&event.recipient) {
            let spec = match target {
                RouteTarget::Bot => TaskSpec::ForwardToBot {
                    account_id: account_id.to_string(),
                    event: event.clone(),
                },
                RouteTarget::Human => TaskSpec::ForwardToHuman {
                    account_id: account_id.to_string(),
                    event: event.clone(),
                    handover: None,
                },
            };
            self.queue.submit(spec).await?;
        }
        Ok(())
    }

    /// Overwrite stored statuses. Unknown ids are skipped, never errors.
    async fn apply_statuses(&self, account_id: &str, statuses: &[StatusEvent]) -> Result<()> {
        for status in statuses {
            let applied = self
                .messages
                .apply_status(&status.provider_message_id, status.status, &status.raw)
                .await?;
            if applied {
                #[cfg(feature = "metrics")]
                counter!(ingest_metrics::STATUSES_APPLIED_TOTAL).increment(1);
                self.events
                    .emit(DeliveryEvent::StatusChanged {
                        account_id: account_id.to_string(),
                        provider_message_id: status.provider_message_id.clone(),
                        status: status.status,
                    })
                    .await;
            } else {
                debug!(
                    account_id,
                    provider_message_id = %status.provider_message_id,
                    "status for unknown message, skipping"
                );
                #[cfg(feature = "metrics")]
                counter!(ingest_metrics::STATUSES_SKIPPED_TOTAL).increment(1);
            }
        }
        Ok(())
    }

    async fn forward_to_bot(&self, account_id: &str, event: InboundEvent) -> Result<()> {
        let ack = self.bridge.forward(account_id, &event).await?;
        self.queue
            .submit(TaskSpec::PollBotReply {
                account_id: account_id.to_string(),
                event,
                handle: ack.handle,
            })
            .await?;
        Ok(())
    }

    /// Poll for the answer and dispatch its parts strictly in order.
    /// Timeouts and terminal failures end the cycle without a reply; a fresh
    /// inbound message starts a new one.
    async fn poll_bot_reply(
        &self,
        account_id: &str,
        event: InboundEvent,
        handle: &str,
    ) -> Result<()> {
        let parts = match self.bridge.poll(handle).await? {
            PollOutcome::Answer(parts) => parts,
            PollOutcome::TerminalFailure(reason) => {
                warn!(account_id, handle, reason, "bot answer failed terminally, no reply");
                return Ok(());
            },
            PollOutcome::TimedOut => {
                warn!(account_id, handle, "bot answer poll budget exhausted, no reply");
                return Ok(());
            },
        };

        let plan = decompose(&parts);
        let total = plan.sends.len();
        for (i, payload) in plan.sends.iter().enumerate() {
            let sent_image = matches!(
                payload,
                herald_channels::model::OutboundPayload::Image { .. }
            );
            self.dispatcher.send(account_id, &event.sender, payload).await?;
            if i + 1 < total {
                tokio::time::sleep(self.bridge.pacing_delay(sent_image)).await;
            }
        }

        if let Some(handover) = plan.handover {
            info!(account_id, reason = %handover.reason, "bot requested handover");
            self.queue
                .submit(TaskSpec::ForwardToHuman {
                    account_id: account_id.to_string(),
                    event,
                    handover: Some(handover),
                })
                .await?;
        }
        Ok(())
    }

    async fn forward_to_human(
        &self,
        account_id: &str,
        event: &InboundEvent,
        handover: Option<HandoverContext>,
    ) -> Result<()> {
        let Some(channel) = self.active_channel(account_id).await? else {
            warn!(account_id, "channel gone or disabled, dropping human forward");
            return Ok(());
        };
        self.forwarder
            .forward(&channel, event, handover.as_ref())
            .await?;
        Ok(())
    }

    async fn active_channel(&self, account_id: &str) -> Result<Option<StoredChannel>> {
        Ok(self
            .channels
            .get(account_id)
            .await?
            .filter(StoredChannel::is_active))
    }
}
