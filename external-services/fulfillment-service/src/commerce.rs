use async_trait::async_trait;
use base64::Engine as _;
use prescription_lifecycle::gateways::{CommerceGateway, CustomerRef, OrderLineItem};
use prescription_lifecycle::GatewayResult;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::http::{ApiClient, ApiEndpoint, FulfillmentResult, Outcome};

const GATEWAY: &str = "commerce";

#[derive(Debug, Serialize)]
struct NoteAttribute {
    name: String,
    value: String,
}

/// Flatten order metadata into the name/value pairs the store keeps on an order.
fn note_attributes(metadata: &Value) -> Vec<NoteAttribute> {
    match metadata {
        Value::Object(fields) => fields
            .iter()
            .map(|(name, value)| NoteAttribute {
                name: name.clone(),
                value: match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: CreatedOrder,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: Value,
}

/// Order placement and order attachments on the commerce platform.
#[derive(Debug, Clone)]
pub struct HttpCommerceGateway {
    client: ApiClient,
}

impl HttpCommerceGateway {
    pub fn new(endpoint: &ApiEndpoint) -> FulfillmentResult<Self> {
        Ok(Self {
            client: ApiClient::new(endpoint)?,
        })
    }

    async fn confirm(&self, method: Method, path: &str, body: &Value, what: &'static str) -> GatewayResult<bool> {
        let request = self.client.request(method, path).json(body);
        match self
            .client
            .execute(request)
            .await
            .map_err(|e| e.into_gateway(GATEWAY))?
        {
            Outcome::Success(_) => Ok(true),
            Outcome::Declined(status) => {
                warn!(path, status = status.as_u16(), what, "Commerce platform declined the request");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl CommerceGateway for HttpCommerceGateway {
    async fn create_order(
        &self,
        line_item: &OrderLineItem,
        customer: &CustomerRef,
        metadata: &Value,
    ) -> GatewayResult<Option<String>> {
        let body = json!({
            "order": {
                "line_items": [{
                    "variant_id": line_item.product_variant_id,
                    "quantity": line_item.quantity,
                    "title": line_item.title,
                }],
                "customer": { "id": customer.external_customer_id },
                "note_attributes": note_attributes(metadata),
                "tags": "prescription",
                "financial_status": "paid",
            }
        });
        let request = self.client.request(Method::POST, "admin/api/orders.json").json(&body);
        let outcome = self
            .client
            .execute(request)
            .await
            .map_err(|e| e.into_gateway(GATEWAY))?;

        let response = match outcome {
            Outcome::Success(response) => response,
            Outcome::Declined(status) => {
                warn!(status = status.as_u16(), variant = %line_item.product_variant_id, "Order rejected");
                return Ok(None);
            }
        };
        let created: OrderEnvelope = ApiClient::json(response)
            .await
            .map_err(|e| e.into_gateway(GATEWAY))?;
        let order_id = match created.order.id {
            Value::String(id) => id,
            other => other.to_string(),
        };
        info!(order_id = %order_id, patient_id = %customer.patient_id, "Order created");
        Ok(Some(order_id))
    }

    async fn attach_metadata(&self, order_id: &str, payload: &Value) -> GatewayResult<bool> {
        let body = json!({
            "metafield": {
                "namespace": "prescription",
                "key": "label",
                "type": "json",
                "value": payload.to_string(),
            }
        });
        self.confirm(
            Method::POST,
            &format!("admin/api/orders/{order_id}/metafields.json"),
            &body,
            "label",
        )
        .await
    }

    async fn attach_document(&self, order_id: &str, file: &[u8], label: &str) -> GatewayResult<bool> {
        let body = json!({
            "attachment": {
                "filename": label,
                "content_type": "application/pdf",
                "data": base64::engine::general_purpose::STANDARD.encode(file),
            }
        });
        self.confirm(
            Method::POST,
            &format!("admin/api/orders/{order_id}/attachments.json"),
            &body,
            "document",
        )
        .await
    }
}
