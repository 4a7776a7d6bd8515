use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("Invalid schedule '{expression}': {message}")]
    InvalidSchedule { expression: String, message: String },

    #[error("Workflow scheduling error: {0}")]
    SchedulingError(String),

    #[error("Job queue is closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
