//! Step execution infrastructure for the lifecycle orchestrator.
//!
//! - [`Clock`] abstracts "now" so windows and job readiness are testable
//! - [`RetryPolicy`] holds the backoff tiers and the attempt ceiling
//! - [`TaskQueue`] is an in-process delayed queue with a dead-letter list
//! - [`WorkerPool`] drains the queue with a fixed number of tokio tasks
//! - [`PeriodicScheduler`] runs cron-driven tasks such as the renewal sweep
//!
//! Jobs are delivered at least once. Handlers are expected to be idempotent
//! and to classify their failures as retryable or permanent via [`StepError`].

pub mod clock;
pub mod error;
pub mod executor;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod task;

pub use clock::*;
pub use error::*;
pub use executor::*;
pub use queue::*;
pub use retry::*;
pub use scheduler::*;
pub use task::*;
