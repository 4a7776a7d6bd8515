//! Route path constants.
//!
//! utoipa `#[path(...)]` attributes need string literals, so the paths in
//! handler attributes must be kept equal to these by hand.

/// API base path
pub const API_V1: &str = "/api/v1";

pub const HEALTH: &str = "/health";
pub const OPENAPI_JSON: &str = "/api-docs/openapi.json";

/// Relative to [`API_V1`].
pub mod v1 {
    pub const SIGNATURE_WEBHOOK: &str = "/webhooks/signature";
    pub const PAYMENT_WEBHOOK: &str = "/webhooks/payments";
    pub const SWEEPS: &str = "/sweeps";
    pub const PRESCRIPTION_DOSE: &str = "/prescriptions/:id/dose";
    pub const FAILED_STEPS: &str = "/steps/failed";
}
