//! Contracts for the external services the orchestrator drives.
//!
//! Adapters live in their own crates; the orchestrator and the sweep only see
//! these traits. A `bool` result means the remote side answered and either
//! confirmed (`true`) or declined (`false`) the operation; transport problems
//! surface as [`GatewayError`](crate::error::GatewayError).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::error::{GatewayResult, LifecycleError, Result};
use crate::models::{BillingProvider, Prescription, SubscriptionStatus};

/// A subscription as reported by a billing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSubscription {
    pub external_id: String,
    pub customer_id: String,
    pub price_id: String,
    pub status: SubscriptionStatus,
    pub next_charge_at: Option<DateTime<Utc>>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BillingGateway: Send + Sync {
    fn provider(&self) -> BillingProvider;

    async fn cancel(&self, external_id: &str, reason: &str) -> GatewayResult<bool>;

    async fn update_plan(&self, external_id: &str, price_id: &str) -> GatewayResult<bool>;

    async fn upcoming_renewals(&self, days_ahead: u32) -> GatewayResult<Vec<ExternalSubscription>>;

    async fn subscription(&self, external_id: &str) -> GatewayResult<Option<ExternalSubscription>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_variant_id: String,
    pub quantity: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub patient_id: Uuid,
    pub external_customer_id: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommerceGateway: Send + Sync {
    /// Returns the new order id, or `None` when the store refused the order.
    async fn create_order(
        &self,
        line_item: &OrderLineItem,
        customer: &CustomerRef,
        metadata: &serde_json::Value,
    ) -> GatewayResult<Option<String>>;

    async fn attach_metadata(&self, order_id: &str, payload: &serde_json::Value) -> GatewayResult<bool>;

    async fn attach_document(&self, order_id: &str, file: &[u8], label: &str) -> GatewayResult<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub name: String,
    pub email: String,
    pub role: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SignatureGateway: Send + Sync {
    /// Returns the signature request id, or `None` when the request was refused.
    async fn create_request(&self, document: &[u8], signer: &SignerInfo) -> GatewayResult<Option<String>>;

    async fn fetch_signed_document(&self, request_id: &str, document_id: &str) -> GatewayResult<Option<Vec<u8>>>;
}

/// Who a notification is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Recipient {
    Patient(Uuid),
    CareTeam,
    Clinician(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    PrescriptionActivated,
    SubscriptionCancelled,
    RefillRequired,
    ClinicianLetter,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::PrescriptionActivated => "prescription_activated",
            NotificationEvent::SubscriptionCancelled => "subscription_cancelled",
            NotificationEvent::RefillRequired => "refill_required",
            NotificationEvent::ClinicianLetter => "clinician_letter",
        }
    }
}

/// Fire-and-forget delivery. Implementations log their own failures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, recipient: &Recipient, event: NotificationEvent, payload: serde_json::Value);
}

/// Produces the letter sent to the prescriber once a prescription activates.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LetterRenderer: Send + Sync {
    async fn render_clinician_letter(&self, prescription: &Prescription) -> GatewayResult<Vec<u8>>;
}

/// Billing adapters keyed by the provider that owns each subscription.
#[derive(Clone, Default)]
pub struct BillingRouter {
    gateways: HashMap<BillingProvider, Arc<dyn BillingGateway>>,
}

impl BillingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn BillingGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn gateway(&self, provider: BillingProvider) -> Result<&Arc<dyn BillingGateway>> {
        self.gateways
            .get(&provider)
            .ok_or(LifecycleError::MissingGateway(provider))
    }

    pub fn gateways(&self) -> impl Iterator<Item = &Arc<dyn BillingGateway>> {
        self.gateways.values()
    }
}

impl std::fmt::Debug for BillingRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingRouter")
            .field("providers", &self.gateways.keys().collect::<Vec<_>>())
            .finish()
    }
}

