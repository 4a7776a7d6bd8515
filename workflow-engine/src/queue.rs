//! In-process delayed job queue with retry scheduling and a dead-letter list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Result, WorkflowError};
use crate::retry::RetryPolicy;
use crate::task::{Job, JobHandler, JobId, JobSink, StepError};

#[derive(Debug, Clone)]
pub struct JobEnvelope<J> {
    pub id: JobId,
    pub job: J,
    /// Executions so far.
    pub attempts: u32,
    pub run_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// A job that will not be attempted again without operator action.
#[derive(Debug, Clone)]
pub struct FailedJob<J> {
    pub id: JobId,
    pub job: J,
    pub attempts: u32,
    pub error: StepError,
    pub failed_at: DateTime<Utc>,
}

pub struct TaskQueue<J: Job> {
    pending: Mutex<Vec<JobEnvelope<J>>>,
    dead_letters: Mutex<Vec<FailedJob<J>>>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    wake: Notify,
    closed: AtomicBool,
}

impl<J: Job> TaskQueue<J> {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            policy,
            clock,
            wake: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Stop accepting new jobs. Jobs already pending stay visible.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    fn push(&self, job: J, run_at: DateTime<Utc>) -> Result<JobId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WorkflowError::QueueClosed);
        }

        let key = job.dedupe_key();
        let kind = job.kind();
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.iter().find(|e| e.job.dedupe_key() == key) {
            debug!(job_id = %existing.id, kind, key = %key, "Identical job already pending");
            return Ok(existing.id);
        }

        let id = Uuid::new_v4();
        pending.push(JobEnvelope {
            id,
            job,
            attempts: 0,
            run_at,
            enqueued_at: self.clock.now(),
            last_error: None,
        });
        drop(pending);

        debug!(job_id = %id, kind, run_at = %run_at, "Job enqueued");
        self.wake.notify_one();
        Ok(id)
    }

    /// Remove the earliest job whose run time has come.
    pub(crate) fn take_ready(&self) -> Option<JobEnvelope<J>> {
        let now = self.clock.now();
        let mut pending = self.pending.lock();
        let index = pending
            .iter()
            .enumerate()
            .filter(|(_, envelope)| envelope.run_at <= now)
            .min_by_key(|(_, envelope)| envelope.run_at)
            .map(|(index, _)| index)?;
        Some(pending.remove(index))
    }

    pub(crate) async fn wait_for_work(&self, poll_interval: Duration) {
        tokio::select! {
            _ = self.wake.notified() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    /// Run one job and route its failure to a retry or the dead-letter list.
    pub async fn execute(&self, mut envelope: JobEnvelope<J>, handler: &dyn JobHandler<J>) {
        envelope.attempts += 1;
        let kind = envelope.job.kind();

        let error = match handler.handle(&envelope.job).await {
            Ok(()) => {
                debug!(job_id = %envelope.id, kind, attempts = envelope.attempts, "Job completed");
                return;
            }
            Err(error) => error,
        };

        let delay = if error.is_retryable() {
            self.policy.next_delay(envelope.attempts)
        } else {
            None
        };

        if let Some(delay) = delay {
            let backoff = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            envelope.run_at = self.clock.now() + backoff;
            envelope.last_error = Some(error.to_string());
            warn!(
                job_id = %envelope.id,
                kind,
                attempts = envelope.attempts,
                retry_at = %envelope.run_at,
                error = %error,
                "Job failed; retry scheduled"
            );
            self.pending.lock().push(envelope);
            return;
        }

        error!(
            job_id = %envelope.id,
            kind,
            attempts = envelope.attempts,
            error = %error,
            operator_action_required = true,
            "Job moved to dead-letter list"
        );
        handler.on_exhausted(&envelope.job, &error).await;
        self.dead_letters.lock().push(FailedJob {
            id: envelope.id,
            job: envelope.job,
            attempts: envelope.attempts,
            error,
            failed_at: self.clock.now(),
        });
    }

    /// Drain every job that is ready right now, including jobs enqueued by the
    /// handlers themselves. Returns how many executions ran.
    pub async fn run_ready(&self, handler: &dyn JobHandler<J>) -> usize {
        let mut executed = 0;
        while let Some(envelope) = self.take_ready() {
            self.execute(envelope, handler).await;
            executed += 1;
        }
        executed
    }

    pub fn pending(&self) -> Vec<JobEnvelope<J>> {
        self.pending.lock().clone()
    }

    pub fn pending_jobs(&self) -> Vec<J> {
        self.pending.lock().iter().map(|e| e.job.clone()).collect()
    }

    pub fn dead_letters(&self) -> Vec<FailedJob<J>> {
        self.dead_letters.lock().clone()
    }

    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        self.pending.lock().iter().map(|e| e.run_at).min()
    }
}

#[async_trait]
impl<J: Job> JobSink<J> for TaskQueue<J> {
    async fn enqueue(&self, job: J) -> Result<JobId> {
        let now = self.clock.now();
        self.push(job, now)
    }

    async fn enqueue_at(&self, job: J, run_at: DateTime<Utc>) -> Result<JobId> {
        self.push(job, run_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(&'static str);

    impl Job for Ping {
        fn kind(&self) -> &'static str {
            "ping"
        }

        fn dedupe_key(&self) -> String {
            self.0.to_string()
        }
    }

    /// Replays a scripted sequence of outcomes, succeeding once it runs out.
    #[derive(Default)]
    struct Scripted {
        outcomes: Mutex<VecDeque<StepError>>,
        handled: Mutex<Vec<Ping>>,
        exhausted: Mutex<Vec<Ping>>,
    }

    impl Scripted {
        fn failing_with(errors: Vec<StepError>) -> Self {
            Self {
                outcomes: Mutex::new(errors.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl JobHandler<Ping> for Scripted {
        async fn handle(&self, job: &Ping) -> std::result::Result<(), StepError> {
            self.handled.lock().push(job.clone());
            match self.outcomes.lock().pop_front() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        async fn on_exhausted(&self, job: &Ping, _error: &StepError) {
            self.exhausted.lock().push(job.clone());
        }
    }

    fn fixture() -> (Arc<ManualClock>, TaskQueue<Ping>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let queue = TaskQueue::new(RetryPolicy::default(), clock.clone());
        (clock, queue)
    }

    #[tokio::test]
    async fn retryable_failure_waits_for_its_backoff_tier() {
        let (clock, queue) = fixture();
        let handler = Scripted::failing_with(vec![StepError::Retryable("timeout".into())]);

        queue.enqueue(Ping("a")).await.unwrap();
        assert_eq!(queue.run_ready(&handler).await, 1);
        assert_eq!(queue.pending().len(), 1);
        assert_eq!(queue.pending()[0].attempts, 1);

        clock.advance(chrono::Duration::seconds(59));
        assert_eq!(queue.run_ready(&handler).await, 0);

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(queue.run_ready(&handler).await, 1);
        assert!(queue.pending().is_empty());
        assert!(queue.dead_letters().is_empty());
        assert_eq!(handler.handled.lock().len(), 2);
    }

    #[tokio::test]
    async fn job_is_dead_lettered_after_max_attempts() {
        let (clock, queue) = fixture();
        let handler = Scripted::failing_with(vec![StepError::Retryable("down".into()); 10]);

        queue.enqueue(Ping("a")).await.unwrap();
        for _ in 0..5 {
            queue.run_ready(&handler).await;
            clock.advance(chrono::Duration::hours(1));
        }

        let failed = queue.dead_letters();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 5);
        assert!(queue.pending().is_empty());
        assert_eq!(handler.exhausted.lock().as_slice(), &[Ping("a")]);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let (_clock, queue) = fixture();
        let handler = Scripted::failing_with(vec![StepError::Permanent("bad data".into())]);

        queue.enqueue(Ping("a")).await.unwrap();
        queue.run_ready(&handler).await;

        let failed = queue.dead_letters();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 1);
        assert!(!failed[0].error.is_retryable());
    }

    #[tokio::test]
    async fn identical_pending_jobs_collapse() {
        let (_clock, queue) = fixture();
        let first = queue.enqueue(Ping("a")).await.unwrap();
        let second = queue.enqueue(Ping("a")).await.unwrap();
        queue.enqueue(Ping("b")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(queue.pending_jobs(), vec![Ping("a"), Ping("b")]);
    }

    #[tokio::test]
    async fn delayed_jobs_wait_for_run_at() {
        let (clock, queue) = fixture();
        let handler = Scripted::default();

        queue
            .enqueue_at(Ping("later"), clock.now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(queue.run_ready(&handler).await, 0);

        clock.advance(chrono::Duration::days(1));
        assert_eq!(queue.run_ready(&handler).await, 1);
    }

    #[tokio::test]
    async fn closed_queue_rejects_jobs() {
        let (_clock, queue) = fixture();
        queue.close();
        assert!(matches!(
            queue.enqueue(Ping("a")).await,
            Err(WorkflowError::QueueClosed)
        ));
    }
}
