//! Persistence contract for lifecycle entities.

mod memory;

pub use memory::InMemoryLifecycleStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ClinicalPlan, Prescription, ProcessedPayment, Subscription};

/// A set of upserts applied atomically.
///
/// Every multi-entity state change (linking, cancellation cascade, renewal
/// bookkeeping, replacement links) is expressed as one change set so that
/// readers never observe half of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub prescriptions: Vec<Prescription>,
    pub subscriptions: Vec<Subscription>,
    pub clinical_plans: Vec<ClinicalPlan>,
    /// Inserted, never updated. An existing key is a conflict.
    pub processed_payments: Vec<ProcessedPayment>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prescription(mut self, prescription: Prescription) -> Self {
        self.prescriptions.push(prescription);
        self
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn with_clinical_plan(mut self, plan: ClinicalPlan) -> Self {
        self.clinical_plans.push(plan);
        self
    }

    pub fn with_processed_payment(mut self, payment: ProcessedPayment) -> Self {
        self.processed_payments.push(payment);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.prescriptions.is_empty()
            && self.subscriptions.is_empty()
            && self.clinical_plans.is_empty()
            && self.processed_payments.is_empty()
    }
}

/// Storage for prescriptions, subscriptions, clinical plans and payment
/// idempotency records.
///
/// Implementations must reject a change set that would link two
/// subscriptions to the same prescription, and must apply each change set
/// all-or-nothing.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn prescription(&self, id: Uuid) -> Result<Option<Prescription>>;

    async fn prescription_by_signature_request(&self, request_id: &str) -> Result<Option<Prescription>>;

    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>>;

    async fn subscription_by_external_id(&self, external_id: &str) -> Result<Option<Subscription>>;

    async fn subscription_for_prescription(&self, prescription_id: Uuid) -> Result<Option<Subscription>>;

    async fn subscription_for_questionnaire(&self, submission_id: Uuid) -> Result<Option<Subscription>>;

    async fn clinical_plan(&self, id: Uuid) -> Result<Option<ClinicalPlan>>;

    /// Active subscriptions whose next charge falls in `[from, to]`, earliest first.
    async fn subscriptions_renewing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Subscription>>;

    async fn processed_payment(&self, external_payment_id: &str) -> Result<Option<ProcessedPayment>>;

    async fn apply(&self, changes: ChangeSet) -> Result<()>;
}
