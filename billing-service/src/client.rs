use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{BillingError, BillingResult};

/// Where a billing provider lives and how to authenticate with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEndpoint {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Auth {
    Bearer,
    /// API key as the basic-auth user with an empty password.
    BasicKey,
}

/// Thin JSON-over-HTTP client shared by the billing adapters.
#[derive(Debug, Clone)]
pub(crate) struct BillingHttpClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    auth: Auth,
}

impl BillingHttpClient {
    pub(crate) fn new(endpoint: &BillingEndpoint, auth: Auth) -> BillingResult<Self> {
        let base_url = Url::parse(endpoint.base_url.trim_end_matches('/'))
            .map_err(|e| BillingError::Config(format!("invalid base url '{}': {e}", endpoint.base_url)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| BillingError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key: endpoint.api_key.clone(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.auth {
            Auth::Bearer => builder.bearer_auth(&self.api_key),
            Auth::BasicKey => builder.basic_auth(&self.api_key, Some("")),
        }
    }

    /// Send and decode a JSON body. A 404 is `None`; other non-success
    /// statuses are errors carrying the provider's response text.
    pub(crate) async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> BillingResult<Option<T>> {
        let response = request.send().await.map_err(BillingError::from_reqwest)?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Billing provider responded");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map(Some).map_err(|e| BillingError::Decode(e.to_string()))
    }

    /// Like [`send`](Self::send) for calls where a missing resource is an error.
    pub(crate) async fn send_required<T: DeserializeOwned>(&self, request: RequestBuilder) -> BillingResult<T> {
        self.send(request).await?.ok_or(BillingError::Status {
            status: StatusCode::NOT_FOUND.as_u16(),
            body: "resource not found".to_string(),
        })
    }
}
