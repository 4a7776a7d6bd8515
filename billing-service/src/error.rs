use prescription_lifecycle::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl BillingError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }

    /// Express the failure in gateway terms, naming the adapter it came from.
    pub fn into_gateway(self, gateway: &'static str) -> GatewayError {
        match self {
            BillingError::Timeout => GatewayError::Timeout { gateway },
            BillingError::Status { status, body } => GatewayError::Status {
                gateway,
                status,
                message: body,
            },
            BillingError::Decode(message) => GatewayError::Decode { gateway, message },
            BillingError::Config(message) | BillingError::Transport(message) => {
                GatewayError::Transport { gateway, message }
            }
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
