use prescription_lifecycle::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Email API returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Send timed out")]
    Timeout,
}

impl EmailError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::SendFailed(error.to_string())
        }
    }
}

impl From<handlebars::TemplateError> for EmailError {
    fn from(error: handlebars::TemplateError) -> Self {
        Self::Template(error.to_string())
    }
}

impl From<handlebars::RenderError> for EmailError {
    fn from(error: handlebars::RenderError) -> Self {
        Self::Template(error.to_string())
    }
}

impl From<EmailError> for GatewayError {
    fn from(error: EmailError) -> Self {
        let gateway = "letters";
        match error {
            EmailError::Timeout => GatewayError::Timeout { gateway },
            EmailError::Rejected { status, body } => GatewayError::Status {
                gateway,
                status,
                message: body,
            },
            EmailError::Template(message) => GatewayError::Decode { gateway, message },
            EmailError::Config(message) | EmailError::SendFailed(message) => {
                GatewayError::Transport { gateway, message }
            }
        }
    }
}

pub type EmailResult<T> = Result<T, EmailError>;
