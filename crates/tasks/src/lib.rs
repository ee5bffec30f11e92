//! Task scheduling for the messaging pipeline.
//!
//! Each pipeline stage is an independently schedulable unit of work: the
//! webhook surface enqueues a [`TaskSpec`], workers pull it off a queue and
//! hand it to the [`TaskExecutor`], and a failed attempt is resubmitted
//! under the [`RetryPolicy`]. Units may enqueue further units.

pub mod queue;
pub mod runner;
pub mod types;

pub use {
    queue::{InMemoryQueue, TaskEnvelope, TaskQueue},
    runner::{TaskExecutor, TaskRunner},
    types::{RetryPolicy, TaskId, TaskSpec},
};
