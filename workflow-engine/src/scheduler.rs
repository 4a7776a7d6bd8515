//! Cron-driven periodic tasks.

use std::future::Future;
use std::sync::Arc;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, info};

use crate::error::{Result, WorkflowError};

pub struct PeriodicScheduler {
    inner: JobScheduler,
}

impl PeriodicScheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .map_err(|e| WorkflowError::SchedulingError(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Register `task` to run on a six-field cron expression
    /// (`sec min hour day month weekday`).
    pub async fn add_cron<F, Fut>(&self, name: &'static str, expression: &str, task: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = Arc::new(task);
        let job = CronJob::new_async(expression, move |_id, _scheduler| {
            let task = task.clone();
            Box::pin(async move {
                debug!(task = name, "Periodic task firing");
                task().await;
            })
        })
        .map_err(|e| WorkflowError::InvalidSchedule {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;

        self.inner
            .add(job)
            .await
            .map_err(|e| WorkflowError::SchedulingError(e.to_string()))?;
        info!(task = name, schedule = expression, "Periodic task registered");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .map_err(|e| WorkflowError::SchedulingError(e.to_string()))
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| WorkflowError::SchedulingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_expression_is_rejected() {
        let scheduler = PeriodicScheduler::new().await.unwrap();
        let result = scheduler.add_cron("noop", "every tuesday", || async {}).await;
        assert!(matches!(result, Err(WorkflowError::InvalidSchedule { .. })));
    }

    #[tokio::test]
    async fn valid_expression_registers() {
        let scheduler = PeriodicScheduler::new().await.unwrap();
        scheduler
            .add_cron("noop", "0 0 * * * *", || async {})
            .await
            .unwrap();
    }
}
