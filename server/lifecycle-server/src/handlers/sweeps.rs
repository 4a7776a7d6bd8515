use axum::{extract::State, Json};
use prescription_lifecycle::{RenewalSource, SweepReport};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::server::LifecycleServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SweepSource {
    LocalRecords,
    Gateway,
}

impl From<SweepSource> for RenewalSource {
    fn from(source: SweepSource) -> Self {
        match source {
            SweepSource::LocalRecords => RenewalSource::LocalRecords,
            SweepSource::Gateway => RenewalSource::Gateway,
        }
    }
}

/// Manual sweep trigger. Omitted fields fall back to the configured defaults.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SweepRequest {
    #[schema(example = 7, minimum = 1)]
    pub window_days: Option<u32>,
    pub source: Option<SweepSource>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SweepFailureView {
    pub subscription_id: Option<Uuid>,
    pub external_id: String,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SweepSummary {
    pub window_days: u32,
    pub source: SweepSource,
    pub examined: usize,
    pub validated: usize,
    pub deferred: usize,
    pub cancelled: usize,
    pub alerted: usize,
    pub errors: usize,
    /// Provider renewals with no local subscription record
    pub unmatched: usize,
    pub failures: Vec<SweepFailureView>,
}

impl SweepSummary {
    fn new(window_days: u32, source: SweepSource, report: SweepReport) -> Self {
        Self {
            window_days,
            source,
            examined: report.examined,
            validated: report.validated,
            deferred: report.deferred,
            cancelled: report.cancelled,
            alerted: report.alerted,
            errors: report.errors,
            unmatched: report.unmatched,
            failures: report
                .failures
                .into_iter()
                .map(|failure| SweepFailureView {
                    subscription_id: failure.subscription_id,
                    external_id: failure.external_id,
                    error: failure.error,
                })
                .collect(),
        }
    }
}

fn source_view(source: RenewalSource) -> SweepSource {
    match source {
        RenewalSource::LocalRecords => SweepSource::LocalRecords,
        RenewalSource::Gateway => SweepSource::Gateway,
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/sweeps",
    tag = "operations",
    request_body(content = SweepRequest, description = "Optional overrides"),
    responses(
        (status = 200, description = "Sweep completed", body = SweepSummary),
        (status = 400, description = "Invalid window", body = ApiErrorResponse),
        (status = 503, description = "Storage unavailable", body = ApiErrorResponse)
    )
)]
pub async fn trigger_sweep(
    State(server): State<LifecycleServer>,
    request: Option<Json<SweepRequest>>,
) -> ApiResult<Json<ApiResponse<SweepSummary>>> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let window_days = request.window_days.unwrap_or(server.sweep_defaults.window_days);
    if window_days == 0 {
        return Err(ApiError::validation("window_days must be at least 1"));
    }
    let source = request
        .source
        .unwrap_or_else(|| source_view(server.sweep_defaults.source));

    let report = server.sweep.run(window_days, source.into()).await?;
    info!(
        window_days,
        examined = report.examined,
        cancelled = report.cancelled,
        alerted = report.alerted,
        errors = report.errors,
        "Manual renewal sweep finished"
    );
    Ok(Json(api_success(SweepSummary::new(window_days, source, report))))
}
