//! Worker pool executing queued tasks under the retry policy.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    tokio::{
        sync::{Mutex, mpsc::UnboundedReceiver},
        task::JoinHandle,
    },
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{counter, histogram, labels, tasks as task_metrics};

use crate::{
    queue::{InMemoryQueue, TaskEnvelope},
    types::{RetryPolicy, TaskSpec},
};

/// Executes one task kind dispatch. The gateway's pipeline is the single
/// implementation; tests substitute doubles.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, spec: TaskSpec) -> Result<()>;
}

/// Pool of tokio workers pulling [`TaskEnvelope`]s off the queue.
///
/// An attempt that errors or exceeds the execution timeout is resubmitted
/// after the backoff until the attempt budget is spent; permanent failures
/// are logged with the full spec, never silently dropped.
pub struct TaskRunner {
    executor: Arc<dyn TaskExecutor>,
    queue: Arc<InMemoryQueue>,
    policy: RetryPolicy,
    workers: usize,
}

impl TaskRunner {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        queue: Arc<InMemoryQueue>,
        policy: RetryPolicy,
        workers: usize,
    ) -> Self {
        Self {
            executor,
            queue,
            policy,
            workers: workers.max(1),
        }
    }

    /// Spawn the worker pool over the queue's receiving half.
    pub fn start(&self, rx: UnboundedReceiver<TaskEnvelope>) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(rx));
        (0..self.workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let executor = Arc::clone(&self.executor);
                let queue = Arc::clone(&self.queue);
                let policy = self.policy;
                tokio::spawn(async move {
                    loop {
                        let envelope = { rx.lock().await.recv().await };
                        let Some(envelope) = envelope else {
                            debug!(worker, "task queue closed, worker exiting");
                            break;
                        };
                        run_one(&*executor, &queue, policy, envelope).await;
                    }
                })
            })
            .collect()
    }
}

async fn run_one(
    executor: &dyn TaskExecutor,
    queue: &InMemoryQueue,
    policy: RetryPolicy,
    envelope: TaskEnvelope,
) {
    let kind = envelope.spec.kind_str();
    debug!(task_id = %envelope.id, kind, attempt = envelope.attempt, "executing task");

    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let outcome =
        tokio::time::timeout(policy.attempt_timeout, executor.execute(envelope.spec.clone()))
            .await;

    #[cfg(feature = "metrics")]
    {
        counter!(task_metrics::EXECUTIONS_TOTAL, labels::KIND => kind).increment(1);
        histogram!(task_metrics::DURATION_SECONDS, labels::KIND => kind)
            .record(started.elapsed().as_secs_f64());
    }

    let error = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:#}"),
        Err(_) => format!("attempt timed out after {:?}", policy.attempt_timeout),
    };

    if envelope.attempt < policy.max_attempts {
        warn!(
            task_id = %envelope.id,
            kind,
            attempt = envelope.attempt,
            max_attempts = policy.max_attempts,
            error,
            "task attempt failed, retrying"
        );
        #[cfg(feature = "metrics")]
        counter!(task_metrics::RETRIES_TOTAL, labels::KIND => kind).increment(1);
        let retry = TaskEnvelope {
            id: envelope.id,
            attempt: envelope.attempt + 1,
            spec: envelope.spec,
        };
        if queue.push(retry, Some(policy.backoff)).is_err() {
            warn!(task_id = %envelope.id, kind, "queue closed, dropping retry");
        }
    } else {
        let spec_json = serde_json::to_string(&envelope.spec).unwrap_or_else(|_| kind.to_string());
        error!(
            task_id = %envelope.id,
            kind,
            account_id = envelope.spec.account_id(),
            attempts = envelope.attempt,
            error,
            spec = %spec_json,
            "task failed permanently"
        );
        #[cfg(feature = "metrics")]
        counter!(task_metrics::FAILED_TOTAL, labels::KIND => kind).increment(1);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use herald_channels::model::OutboundPayload;

    use {super::*, crate::queue::TaskQueue};

    struct FlakyExecutor {
        calls: AtomicU32,
        fail_first: u32,
        hang: bool,
    }

    #[async_trait]
    impl TaskExecutor for FlakyExecutor {
        async fn execute(&self, _spec: TaskSpec) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if call <= self.fail_first {
                anyhow::bail!("boom on call {call}");
            }
            Ok(())
        }
    }

    fn spec() -> TaskSpec {
        TaskSpec::SendOutbound {
            account_id: "wa-main".into(),
            to: "919990001111".into(),
            payload: OutboundPayload::text("hi"),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    async fn wait_for(calls: &AtomicU32, expected: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expected call count not reached");
    }

    #[tokio::test]
    async fn failed_attempt_is_retried_until_success() {
        let executor = Arc::new(FlakyExecutor {
            calls: AtomicU32::new(0),
            fail_first: 2,
            hang: false,
        });
        let (queue, rx) = InMemoryQueue::new();
        let queue = Arc::new(queue);
        let runner = TaskRunner::new(
            Arc::clone(&executor) as Arc<dyn TaskExecutor>,
            Arc::clone(&queue),
            policy(),
            2,
        );
        let _handles = runner.start(rx);

        queue.submit(spec()).await.unwrap();
        wait_for(&executor.calls, 3).await;
    }

    #[tokio::test]
    async fn attempts_stop_at_the_budget() {
        let executor = Arc::new(FlakyExecutor {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            hang: false,
        });
        let (queue, rx) = InMemoryQueue::new();
        let queue = Arc::new(queue);
        let runner = TaskRunner::new(
            Arc::clone(&executor) as Arc<dyn TaskExecutor>,
            Arc::clone(&queue),
            policy(),
            1,
        );
        let _handles = runner.start(rx);

        queue.submit(spec()).await.unwrap();
        wait_for(&executor.calls, 3).await;

        // Give a would-be fourth attempt time to appear.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hung_attempt_counts_as_failed() {
        let executor = Arc::new(FlakyExecutor {
            calls: AtomicU32::new(0),
            fail_first: 0,
            hang: true,
        });
        let (queue, rx) = InMemoryQueue::new();
        let queue = Arc::new(queue);
        let runner = TaskRunner::new(
            Arc::clone(&executor) as Arc<dyn TaskExecutor>,
            Arc::clone(&queue),
            policy(),
            1,
        );
        let _handles = runner.start(rx);

        queue.submit(spec()).await.unwrap();
        // Timeout fires per attempt; all three attempts get started.
        wait_for(&executor.calls, 3).await;
    }
}
