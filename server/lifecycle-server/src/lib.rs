//! Prescription lifecycle server
//!
//! HTTP surface and process runtime around the `prescription-lifecycle`
//! orchestrator: provider webhooks for signature completion and recurring
//! payments, manual renewal sweeps, dose lookup and the dead-lettered step
//! listing. [`bootstrap::build_runtime`] wires the configured gateways,
//! store and step queue together.

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;

pub use error::*;
pub use server::{LifecycleServer, SweepDefaults};

use axum::{middleware::from_fn, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the application router with all routes and middleware
pub fn create_app(server: LifecycleServer) -> Router {
    routes::create_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(middleware::request_timing_middleware)),
        )
        .with_state(server)
}
