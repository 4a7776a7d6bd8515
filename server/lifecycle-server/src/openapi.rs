use utoipa::OpenApi;

/// OpenAPI document for the lifecycle server
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::webhooks::signature_completed,
        crate::handlers::webhooks::payment_confirmed,
        crate::handlers::sweeps::trigger_sweep,
        crate::handlers::prescriptions::dose_progress,
        crate::handlers::steps::failed_steps,
    ),
    components(
        schemas(
            crate::error::ApiErrorResponse,
            crate::handlers::health::HealthResponse,
            crate::handlers::webhooks::SignatureWebhook,
            crate::handlers::webhooks::SignatureWebhookResponse,
            crate::handlers::webhooks::PaymentWebhook,
            crate::handlers::webhooks::PaymentWebhookResponse,
            crate::handlers::sweeps::SweepRequest,
            crate::handlers::sweeps::SweepSource,
            crate::handlers::sweeps::SweepSummary,
            crate::handlers::sweeps::SweepFailureView,
            crate::handlers::prescriptions::DoseResponse,
            crate::handlers::prescriptions::DoseStepView,
            crate::handlers::steps::FailedStepView,
        )
    ),
    tags(
        (name = "health", description = "Liveness and storage health"),
        (name = "webhooks", description = "Signature and billing provider callbacks"),
        (name = "operations", description = "Renewal sweeps, dose lookup and failed lifecycle steps"),
    ),
    info(
        title = "Prescription Lifecycle API",
        version = "1.0.0",
        description = "Keeps recurring medication subscriptions consistent with the prescriptions that back them.",
    )
)]
pub struct ApiDoc;
