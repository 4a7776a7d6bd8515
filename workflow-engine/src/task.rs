//! Job and handler contracts shared by the queue and the worker pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use thiserror::Error;
use uuid::Uuid;

use crate::error::Result;

pub type JobId = Uuid;

/// A unit of work that can be queued, retried and dead-lettered.
pub trait Job: Clone + Debug + Send + Sync + 'static {
    /// Short step name used in logs and operator listings.
    fn kind(&self) -> &'static str;

    /// Two pending jobs with the same key are the same piece of work.
    fn dedupe_key(&self) -> String;
}

/// Outcome of a failed job execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// Transient failure; the queue reschedules according to its retry policy.
    #[error("retryable failure: {0}")]
    Retryable(String),

    /// The job can never succeed as submitted; it goes straight to the
    /// dead-letter list.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl StepError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Retryable(_))
    }
}

#[async_trait]
pub trait JobHandler<J: Job>: Send + Sync {
    async fn handle(&self, job: &J) -> std::result::Result<(), StepError>;

    /// Called once when a job is dead-lettered, either after a permanent
    /// failure or after its last retry.
    async fn on_exhausted(&self, _job: &J, _error: &StepError) {}
}

/// Producer side of a job queue.
#[async_trait]
pub trait JobSink<J: Job>: Send + Sync {
    async fn enqueue(&self, job: J) -> Result<JobId>;

    async fn enqueue_at(&self, job: J, run_at: DateTime<Utc>) -> Result<JobId>;
}
