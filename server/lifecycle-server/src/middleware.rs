use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Logs method, path, status and latency for every request.
pub async fn request_timing_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if path == crate::routes::paths::HEALTH {
        tracing::debug!(method = %method, path = %path, status, duration_ms, "Request processed");
    } else {
        tracing::info!(method = %method, path = %path, status, duration_ms, "Request processed");
    }
    response
}
