use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use prescription_lifecycle::{DocumentSigned, PaymentOutcome, RecurringPaymentConfirmed, SignatureOutcome};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::server::LifecycleServer;

/// Signature provider callback for a completed signature
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignatureWebhook {
    #[schema(example = "fa5c8a0b0f")]
    pub signature_request_id: String,
    pub document_id: Option<String>,
    pub signed_document_ref: Option<String>,
    /// Defaults to the time the callback is received.
    pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignatureWebhookResponse {
    /// `activated` or `duplicate`
    #[schema(example = "activated")]
    pub outcome: String,
    pub prescription_id: Uuid,
    /// Set when the signature activated a prescription.
    pub replacement: Option<bool>,
}

impl From<SignatureOutcome> for SignatureWebhookResponse {
    fn from(outcome: SignatureOutcome) -> Self {
        match outcome {
            SignatureOutcome::Activated {
                prescription_id,
                replacement,
            } => Self {
                outcome: "activated".to_string(),
                prescription_id,
                replacement: Some(replacement),
            },
            SignatureOutcome::Duplicate { prescription_id } => Self {
                outcome: "duplicate".to_string(),
                prescription_id,
                replacement: None,
            },
        }
    }
}

/// Billing provider callback for a successful recurring charge
#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentWebhook {
    #[schema(example = "sub_1NvX2k")]
    pub external_subscription_id: String,
    /// Payment or invoice id, used to recognise redeliveries
    #[schema(example = "in_1NvX9q")]
    pub external_payment_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentWebhookResponse {
    /// `queued`, `duplicate` or `ignored`
    #[schema(example = "queued")]
    pub outcome: String,
    pub subscription_id: Option<Uuid>,
}

impl From<PaymentOutcome> for PaymentWebhookResponse {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Queued { subscription_id } => Self {
                outcome: "queued".to_string(),
                subscription_id: Some(subscription_id),
            },
            PaymentOutcome::Duplicate => Self {
                outcome: "duplicate".to_string(),
                subscription_id: None,
            },
            PaymentOutcome::Ignored { subscription_id } => Self {
                outcome: "ignored".to_string(),
                subscription_id: Some(subscription_id),
            },
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/signature",
    tag = "webhooks",
    request_body = SignatureWebhook,
    responses(
        (status = 200, description = "Signature recorded or already processed", body = SignatureWebhookResponse),
        (status = 400, description = "Malformed callback", body = ApiErrorResponse),
        (status = 404, description = "No prescription has this signature request", body = ApiErrorResponse),
        (status = 409, description = "Prescription cannot be activated", body = ApiErrorResponse)
    )
)]
pub async fn signature_completed(
    State(server): State<LifecycleServer>,
    Json(webhook): Json<SignatureWebhook>,
) -> ApiResult<Json<ApiResponse<SignatureWebhookResponse>>> {
    if webhook.signature_request_id.trim().is_empty() {
        return Err(ApiError::validation("signature_request_id is required"));
    }

    let event = DocumentSigned {
        signature_request_id: webhook.signature_request_id,
        document_id: webhook.document_id,
        signed_document_ref: webhook.signed_document_ref,
        signed_at: webhook.signed_at.unwrap_or_else(|| server.now()),
    };
    let outcome = server.orchestrator.handle_document_signed(event).await?;
    info!(outcome = ?outcome, "Signature webhook handled");
    Ok(Json(api_success(outcome.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payments",
    tag = "webhooks",
    request_body = PaymentWebhook,
    responses(
        (status = 202, description = "Renewal queued", body = PaymentWebhookResponse),
        (status = 200, description = "Already processed or subscription inactive", body = PaymentWebhookResponse),
        (status = 404, description = "Unknown subscription", body = ApiErrorResponse)
    )
)]
pub async fn payment_confirmed(
    State(server): State<LifecycleServer>,
    Json(webhook): Json<PaymentWebhook>,
) -> ApiResult<(StatusCode, Json<ApiResponse<PaymentWebhookResponse>>)> {
    if webhook.external_subscription_id.trim().is_empty() || webhook.external_payment_id.trim().is_empty() {
        return Err(ApiError::validation(
            "external_subscription_id and external_payment_id are required",
        ));
    }

    let outcome = server
        .orchestrator
        .handle_recurring_payment(RecurringPaymentConfirmed {
            external_subscription_id: webhook.external_subscription_id,
            external_payment_id: webhook.external_payment_id,
        })
        .await?;

    let status = match outcome {
        PaymentOutcome::Queued { .. } => StatusCode::ACCEPTED,
        PaymentOutcome::Duplicate | PaymentOutcome::Ignored { .. } => StatusCode::OK,
    };
    Ok((status, Json(api_success(outcome.into()))))
}
