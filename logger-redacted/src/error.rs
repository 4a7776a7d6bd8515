use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter '{directives}': {message}")]
    Filter { directives: String, message: String },

    #[error("Invalid redaction pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

pub type LoggerResult<T> = Result<T, LoggerError>;
