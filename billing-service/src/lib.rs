//! Billing gateway adapters.
//!
//! Two providers sit behind [`prescription_lifecycle::gateways::BillingGateway`]:
//! - [`PlanBillingGateway`]: one plan per subscription, bearer-token API
//! - [`ItemPriceBillingGateway`]: subscriptions made of item prices, API key
//!   as basic-auth user
//!
//! Provider failures surface as [`prescription_lifecycle::GatewayError`] so
//! the lifecycle can decide whether to retry.

mod client;
pub mod error;
pub mod item_price;
pub mod models;
pub mod plan;

pub use client::BillingEndpoint;
pub use error::{BillingError, BillingResult};
pub use item_price::ItemPriceBillingGateway;
pub use plan::PlanBillingGateway;
