//! Worker pool draining a [`TaskQueue`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::TaskQueue;
use crate::task::{Job, JobHandler};

pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks. Each takes one ready job at a time, so jobs run
    /// in parallel across workers and never twice concurrently.
    pub fn spawn<J: Job>(
        queue: Arc<TaskQueue<J>>,
        handler: Arc<dyn JobHandler<J>>,
        workers: usize,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown, stop) = watch::channel(false);
        let workers = (0..workers.max(1))
            .map(|worker| {
                let queue = queue.clone();
                let handler = handler.clone();
                let mut stop = stop.clone();
                tokio::spawn(async move {
                    debug!(worker, "Worker started");
                    loop {
                        while let Some(envelope) = queue.take_ready() {
                            queue.execute(envelope, handler.as_ref()).await;
                            if *stop.borrow() {
                                break;
                            }
                        }
                        if *stop.borrow() {
                            break;
                        }
                        tokio::select! {
                            changed = stop.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                            _ = queue.wait_for_work(poll_interval) => {}
                        }
                    }
                    debug!(worker, "Worker stopped");
                })
            })
            .collect::<Vec<_>>();

        info!(workers = workers.len(), poll_interval_ms = poll_interval.as_millis() as u64, "Worker pool started");
        Self { shutdown, workers }
    }

    /// Signal every worker and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}
