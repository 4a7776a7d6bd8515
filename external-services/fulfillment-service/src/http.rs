use prescription_lifecycle::GatewayError;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Base URL and credential of a fulfilment-side API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Error, Debug)]
pub enum FulfillmentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl FulfillmentError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(error.to_string())
        }
    }

    pub fn into_gateway(self, gateway: &'static str) -> GatewayError {
        match self {
            FulfillmentError::Timeout => GatewayError::Timeout { gateway },
            FulfillmentError::Status { status, body } => GatewayError::Status {
                gateway,
                status,
                message: body,
            },
            FulfillmentError::Decode(message) => GatewayError::Decode { gateway, message },
            FulfillmentError::Config(message) | FulfillmentError::Transport(message) => {
                GatewayError::Transport { gateway, message }
            }
        }
    }
}

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

/// What a call's HTTP status means to the caller.
pub(crate) enum Outcome {
    Success(Response),
    /// The service understood the request and declined it.
    Declined(StatusCode),
}

#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl ApiClient {
    pub(crate) fn new(endpoint: &ApiEndpoint) -> FulfillmentResult<Self> {
        let base_url = Url::parse(&endpoint.base_url)
            .map_err(|e| FulfillmentError::Config(format!("invalid base url '{}': {e}", endpoint.base_url)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| FulfillmentError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key: endpoint.api_key.clone(),
        })
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.http.request(method, url).bearer_auth(&self.api_key)
    }

    /// 404, 409 and 422 are declines; other failures are errors.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> FulfillmentResult<Outcome> {
        let response = request.send().await.map_err(FulfillmentError::from_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return Ok(Outcome::Success(response));
        }
        if matches!(
            status,
            StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            return Ok(Outcome::Declined(status));
        }
        let body = response.text().await.unwrap_or_default();
        Err(FulfillmentError::Status {
            status: status.as_u16(),
            body,
        })
    }

    pub(crate) async fn json<T: serde::de::DeserializeOwned>(response: Response) -> FulfillmentResult<T> {
        response
            .json()
            .await
            .map_err(|e| FulfillmentError::Decode(e.to_string()))
    }
}
