use prescription_lifecycle::LifecycleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Column {column} holds an unreadable value: {message}")]
    Decode { column: &'static str, message: String },

    #[error("Constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatabaseError {
    pub(crate) fn decode(column: &'static str, message: impl ToString) -> Self {
        Self::Decode {
            column,
            message: message.to_string(),
        }
    }

    /// Classify a failed write, surfacing unique-index violations as conflicts.
    pub(crate) fn from_write(error: sqlx::Error, what: &str) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(format!("{what}: {}", db.message()))
            }
            _ => Self::SqlxError(error),
        }
    }
}

impl From<DatabaseError> for LifecycleError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::Conflict(message) => LifecycleError::Conflict(message),
            other => LifecycleError::Storage(other.to_string()),
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
