use thiserror::Error;
use uuid::Uuid;
use workflow_engine::{StepError, WorkflowError};

use crate::models::{BillingProvider, PrescriptionStatus};

/// Failure talking to an external service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{gateway} request timed out")]
    Timeout { gateway: &'static str },

    #[error("{gateway} returned status {status}: {message}")]
    Status {
        gateway: &'static str,
        status: u16,
        message: String,
    },

    #[error("{gateway} transport error: {message}")]
    Transport {
        gateway: &'static str,
        message: String,
    },

    #[error("{gateway} response could not be decoded: {message}")]
    Decode {
        gateway: &'static str,
        message: String,
    },
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Prescription {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },

    #[error("Subscription {subscription_id} is already linked to prescription {linked_to}")]
    AlreadyLinked {
        subscription_id: Uuid,
        linked_to: Uuid,
    },

    #[error("Replacement rejected: {0}")]
    ReplacementConflict(String),

    #[error("Invalid dose schedule: {0}")]
    InvalidDoseSchedule(String),

    #[error("External service did not confirm {operation}")]
    ExternalRejected { operation: &'static str },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("No billing gateway configured for {0}")]
    MissingGateway(BillingProvider),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Step queue error: {0}")]
    Queue(#[from] WorkflowError),
}

impl LifecycleError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Whether repeating the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LifecycleError::Gateway(_)
            | LifecycleError::ExternalRejected { .. }
            | LifecycleError::Storage(_)
            | LifecycleError::Conflict(_)
            | LifecycleError::Queue(_) => true,
            LifecycleError::NotFound { .. }
            | LifecycleError::DataIntegrity(_)
            | LifecycleError::InvalidTransition { .. }
            | LifecycleError::AlreadyLinked { .. }
            | LifecycleError::ReplacementConflict(_)
            | LifecycleError::InvalidDoseSchedule(_)
            | LifecycleError::MissingGateway(_) => false,
        }
    }
}

impl From<LifecycleError> for StepError {
    fn from(error: LifecycleError) -> Self {
        if error.is_retryable() {
            StepError::Retryable(error.to_string())
        } else {
            StepError::Permanent(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
