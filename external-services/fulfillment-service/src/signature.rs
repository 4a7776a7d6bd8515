use async_trait::async_trait;
use base64::Engine as _;
use prescription_lifecycle::gateways::{SignatureGateway, SignerInfo};
use prescription_lifecycle::GatewayResult;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::http::{ApiClient, ApiEndpoint, FulfillmentError, FulfillmentResult, Outcome};

const GATEWAY: &str = "signature";

#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    signature_request: CreatedRequest,
}

#[derive(Debug, Deserialize)]
struct CreatedRequest {
    signature_request_id: String,
}

/// E-signature provider client.
#[derive(Debug, Clone)]
pub struct HttpSignatureGateway {
    client: ApiClient,
    test_mode: bool,
}

impl HttpSignatureGateway {
    pub fn new(endpoint: &ApiEndpoint, test_mode: bool) -> FulfillmentResult<Self> {
        Ok(Self {
            client: ApiClient::new(endpoint)?,
            test_mode,
        })
    }
}

#[async_trait]
impl SignatureGateway for HttpSignatureGateway {
    async fn create_request(&self, document: &[u8], signer: &SignerInfo) -> GatewayResult<Option<String>> {
        let body = json!({
            "title": "Prescription",
            "signers": [{
                "name": signer.name,
                "email_address": signer.email,
                "role": signer.role,
            }],
            "files_base64": [base64::engine::general_purpose::STANDARD.encode(document)],
            "test_mode": self.test_mode,
        });
        let request = self
            .client
            .request(Method::POST, "v3/signature_request/send")
            .json(&body);

        match self
            .client
            .execute(request)
            .await
            .map_err(|e| e.into_gateway(GATEWAY))?
        {
            Outcome::Success(response) => {
                let created: RequestEnvelope = ApiClient::json(response)
                    .await
                    .map_err(|e| e.into_gateway(GATEWAY))?;
                debug!(request_id = %created.signature_request.signature_request_id, "Signature request sent");
                Ok(Some(created.signature_request.signature_request_id))
            }
            Outcome::Declined(status) => {
                warn!(status = status.as_u16(), "Signature request declined");
                Ok(None)
            }
        }
    }

    async fn fetch_signed_document(&self, request_id: &str, document_id: &str) -> GatewayResult<Option<Vec<u8>>> {
        let request = self
            .client
            .request(Method::GET, &format!("v3/signature_request/files/{request_id}"))
            .query(&[("file_type", "pdf"), ("document_id", document_id)]);

        match self
            .client
            .execute(request)
            .await
            .map_err(|e| e.into_gateway(GATEWAY))?
        {
            Outcome::Success(response) => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| FulfillmentError::Decode(e.to_string()).into_gateway(GATEWAY))?;
                Ok(Some(bytes.to_vec()))
            }
            Outcome::Declined(status) => {
                warn!(request_id, status = status.as_u16(), "Signed document not available");
                Ok(None)
            }
        }
    }
}
