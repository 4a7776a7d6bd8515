use axum::{
    extract::{Path, State},
    Json,
};
use prescription_lifecycle::DoseStep;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{api_success, ApiErrorResponse, ApiResponse, ApiResult};
use crate::server::LifecycleServer;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DoseStepView {
    /// Position in the titration schedule
    pub index: usize,
    pub refill_number: u32,
    #[schema(example = "2.5mg")]
    pub dose: String,
    pub billing_price_id: String,
    pub product_variant_id: String,
}

impl DoseStepView {
    fn new(index: usize, step: DoseStep) -> Self {
        Self {
            index,
            refill_number: step.refill_number,
            dose: step.dose,
            billing_price_id: step.billing_price_id,
            product_variant_id: step.product_variant_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DoseResponse {
    pub prescription_id: Uuid,
    pub refills_remaining: i32,
    pub current: Option<DoseStepView>,
    pub next: Option<DoseStepView>,
}

#[utoipa::path(
    get,
    path = "/api/v1/prescriptions/{id}/dose",
    tag = "operations",
    params(("id" = Uuid, Path, description = "Prescription id")),
    responses(
        (status = 200, description = "Current and next dose", body = DoseResponse),
        (status = 404, description = "Unknown prescription", body = ApiErrorResponse)
    )
)]
pub async fn dose_progress(
    State(server): State<LifecycleServer>,
    Path(prescription_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<DoseResponse>>> {
    let progress = server.orchestrator.dose_progress(prescription_id).await?;
    let current = progress
        .current_index
        .zip(progress.current)
        .map(|(index, step)| DoseStepView::new(index, step));
    let next = progress
        .next_index
        .zip(progress.next)
        .map(|(index, step)| DoseStepView::new(index, step));

    Ok(Json(api_success(DoseResponse {
        prescription_id,
        refills_remaining: progress.refills_remaining,
        current,
        next,
    })))
}
