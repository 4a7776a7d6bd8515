use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::server::LifecycleServer;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    /// Seconds since the server started
    pub uptime: i64,
    pub checks: BTreeMap<String, String>,
    /// Lifecycle steps waiting to run or retry
    pub pending_steps: usize,
    pub failed_steps: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Storage is unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(State(server): State<LifecycleServer>) -> (StatusCode, Json<HealthResponse>) {
    let now = server.now();
    let mut checks = BTreeMap::new();
    let mut healthy = true;

    match &server.database {
        Some(database) => {
            if database.is_healthy().await {
                checks.insert("database".to_string(), "ok".to_string());
            } else {
                healthy = false;
                checks.insert("database".to_string(), "unreachable".to_string());
            }
        }
        None => {
            checks.insert("database".to_string(), "in_memory".to_string());
        }
    }

    let failed_steps = server.steps.dead_letters().len();
    checks.insert(
        "steps".to_string(),
        if failed_steps == 0 { "ok" } else { "failures_pending_review" }.to_string(),
    );

    let (status, label) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: label.to_string(),
        timestamp: now,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: (now - server.started_at).num_seconds(),
        checks,
        pending_steps: server.steps.pending().len(),
        failed_steps,
    };
    (status, Json(response))
}
