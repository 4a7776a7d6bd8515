use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use workflow_engine::Job;

use crate::error::{api_success, ApiResponse, ApiResult};
use crate::server::LifecycleServer;

/// A lifecycle step that exhausted its retries or failed permanently.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FailedStepView {
    pub id: Uuid,
    #[schema(example = "update_billing_plan")]
    pub kind: String,
    pub attempts: u32,
    pub error: String,
    /// False when the step failed permanently rather than running out of retries
    pub retryable: bool,
    pub failed_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub step: serde_json::Value,
}

#[utoipa::path(
    get,
    path = "/api/v1/steps/failed",
    tag = "operations",
    responses(
        (status = 200, description = "Dead-lettered steps, oldest first", body = [FailedStepView])
    )
)]
pub async fn failed_steps(
    State(server): State<LifecycleServer>,
) -> ApiResult<Json<ApiResponse<Vec<FailedStepView>>>> {
    let mut failed = server
        .steps
        .dead_letters()
        .into_iter()
        .map(|failed| FailedStepView {
            id: failed.id,
            kind: failed.job.kind().to_string(),
            attempts: failed.attempts,
            error: failed.error.to_string(),
            retryable: failed.error.is_retryable(),
            failed_at: failed.failed_at,
            step: serde_json::to_value(&failed.job).unwrap_or(serde_json::Value::Null),
        })
        .collect::<Vec<_>>();
    failed.sort_by_key(|step| step.failed_at);

    Ok(Json(api_success(failed)))
}
