//! Task queue seam and the in-process implementation.

use std::time::Duration;

use {
    anyhow::Result,
    async_trait::async_trait,
    tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    tracing::debug,
};

use crate::types::{TaskId, TaskSpec};

/// A task plus its delivery bookkeeping. `attempt` starts at 1.
#[derive(Debug, Clone)]
pub struct TaskEnvelope {
    pub id: TaskId,
    pub attempt: u32,
    pub spec: TaskSpec,
}

/// Submission seam used by every pipeline component that enqueues work.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task for immediate execution.
    async fn submit(&self, spec: TaskSpec) -> Result<TaskId>;

    /// Enqueue a task after a delay. Used for retry backoff.
    async fn submit_after(&self, spec: TaskSpec, delay: Duration) -> Result<TaskId>;
}

/// In-process queue over an unbounded mpsc channel. The receiving half is
/// handed to the [`TaskRunner`](crate::runner::TaskRunner) at startup.
pub struct InMemoryQueue {
    tx: UnboundedSender<TaskEnvelope>,
}

impl InMemoryQueue {
    #[must_use]
    pub fn new() -> (Self, UnboundedReceiver<TaskEnvelope>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn push(&self, envelope: TaskEnvelope, delay: Option<Duration>) -> Result<()> {
        match delay {
            None => self
                .tx
                .send(envelope)
                .map_err(|_| anyhow::anyhow!("task queue closed")),
            Some(delay) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // Receiver gone means the runner is shutting down.
                    let _ = tx.send(envelope);
                });
                Ok(())
            },
        }
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn submit(&self, spec: TaskSpec) -> Result<TaskId> {
        let id = TaskId::new();
        debug!(task_id = %id, kind = spec.kind_str(), "submitting task");
        self.push(
            TaskEnvelope {
                id,
                attempt: 1,
                spec,
            },
            None,
        )?;
        Ok(id)
    }

    async fn submit_after(&self, spec: TaskSpec, delay: Duration) -> Result<TaskId> {
        let id = TaskId::new();
        debug!(task_id = %id, kind = spec.kind_str(), ?delay, "submitting delayed task");
        self.push(
            TaskEnvelope {
                id,
                attempt: 1,
                spec,
            },
            Some(delay),
        )?;
        Ok(id)
    }
}
