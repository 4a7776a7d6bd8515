pub mod paths;

use axum::{
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

use crate::handlers::{health, prescriptions, steps, sweeps, webhooks};
use crate::openapi::ApiDoc;
use crate::server::LifecycleServer;

/// Provider callbacks
pub fn webhook_routes() -> Router<LifecycleServer> {
    Router::new()
        .route(paths::v1::SIGNATURE_WEBHOOK, post(webhooks::signature_completed))
        .route(paths::v1::PAYMENT_WEBHOOK, post(webhooks::payment_confirmed))
}

/// Operator endpoints
pub fn operations_routes() -> Router<LifecycleServer> {
    Router::new()
        .route(paths::v1::SWEEPS, post(sweeps::trigger_sweep))
        .route(paths::v1::PRESCRIPTION_DOSE, get(prescriptions::dose_progress))
        .route(paths::v1::FAILED_STEPS, get(steps::failed_steps))
}

pub fn create_routes() -> Router<LifecycleServer> {
    Router::new()
        .route(paths::HEALTH, get(health::health_check))
        .route(paths::OPENAPI_JSON, get(|| async { Json(ApiDoc::openapi()) }))
        .nest(
            paths::API_V1,
            Router::new().merge(webhook_routes()).merge(operations_routes()),
        )
}
