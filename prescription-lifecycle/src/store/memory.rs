use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::{ChangeSet, LifecycleStore};
use crate::error::{LifecycleError, Result};
use crate::models::{ClinicalPlan, Prescription, ProcessedPayment, Subscription, SubscriptionStatus};

#[derive(Debug, Default, Clone)]
struct Tables {
    prescriptions: HashMap<Uuid, Prescription>,
    subscriptions: HashMap<Uuid, Subscription>,
    clinical_plans: HashMap<Uuid, ClinicalPlan>,
    processed_payments: HashMap<String, ProcessedPayment>,
}

impl Tables {
    fn check_links(&self) -> Result<()> {
        let mut linked: HashMap<Uuid, Uuid> = HashMap::new();
        for subscription in self.subscriptions.values() {
            if let Some(prescription_id) = subscription.prescription_id {
                if let Some(other) = linked.insert(prescription_id, subscription.id) {
                    return Err(LifecycleError::Conflict(format!(
                        "prescription {prescription_id} would be linked to subscriptions {other} and {}",
                        subscription.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// In-memory store for tests and development.
///
/// One lock covers every table so a change set is applied atomically.
#[derive(Debug, Default)]
pub struct InMemoryLifecycleStore {
    tables: RwLock<Tables>,
}

impl InMemoryLifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prescriptions(&self) -> Vec<Prescription> {
        self.tables.read().prescriptions.values().cloned().collect()
    }

    pub fn processed_payments(&self) -> Vec<ProcessedPayment> {
        self.tables.read().processed_payments.values().cloned().collect()
    }
}

#[async_trait]
impl LifecycleStore for InMemoryLifecycleStore {
    async fn prescription(&self, id: Uuid) -> Result<Option<Prescription>> {
        Ok(self.tables.read().prescriptions.get(&id).cloned())
    }

    async fn prescription_by_signature_request(&self, request_id: &str) -> Result<Option<Prescription>> {
        Ok(self
            .tables
            .read()
            .prescriptions
            .values()
            .find(|p| p.signature_request_id.as_deref() == Some(request_id))
            .cloned())
    }

    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self.tables.read().subscriptions.get(&id).cloned())
    }

    async fn subscription_by_external_id(&self, external_id: &str) -> Result<Option<Subscription>> {
        Ok(self
            .tables
            .read()
            .subscriptions
            .values()
            .find(|s| s.external_id == external_id)
            .cloned())
    }

    async fn subscription_for_prescription(&self, prescription_id: Uuid) -> Result<Option<Subscription>> {
        Ok(self
            .tables
            .read()
            .subscriptions
            .values()
            .find(|s| s.prescription_id == Some(prescription_id))
            .cloned())
    }

    async fn subscription_for_questionnaire(&self, submission_id: Uuid) -> Result<Option<Subscription>> {
        Ok(self
            .tables
            .read()
            .subscriptions
            .values()
            .find(|s| s.questionnaire_submission_id == Some(submission_id))
            .cloned())
    }

    async fn clinical_plan(&self, id: Uuid) -> Result<Option<ClinicalPlan>> {
        Ok(self.tables.read().clinical_plans.get(&id).cloned())
    }

    async fn subscriptions_renewing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        let mut renewing: Vec<Subscription> = self
            .tables
            .read()
            .subscriptions
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .filter(|s| s.next_charge_scheduled_at.is_some_and(|at| at >= from && at <= to))
            .cloned()
            .collect();
        renewing.sort_by_key(|s| (s.next_charge_scheduled_at, s.id));
        Ok(renewing)
    }

    async fn processed_payment(&self, external_payment_id: &str) -> Result<Option<ProcessedPayment>> {
        Ok(self
            .tables
            .read()
            .processed_payments
            .get(external_payment_id)
            .cloned())
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write();
        let mut staged = tables.clone();

        for payment in changes.processed_payments {
            if staged.processed_payments.contains_key(&payment.external_payment_id) {
                return Err(LifecycleError::Conflict(format!(
                    "payment {} already processed",
                    payment.external_payment_id
                )));
            }
            staged
                .processed_payments
                .insert(payment.external_payment_id.clone(), payment);
        }
        for prescription in changes.prescriptions {
            staged.prescriptions.insert(prescription.id, prescription);
        }
        for subscription in changes.subscriptions {
            staged.subscriptions.insert(subscription.id, subscription);
        }
        for plan in changes.clinical_plans {
            staged.clinical_plans.insert(plan.id, plan);
        }
        staged.check_links()?;

        *tables = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingProvider, DoseStep, PrescriptionStatus};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap()
    }

    fn prescription() -> Prescription {
        Prescription::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "tirzepatide",
            vec![DoseStep {
                refill_number: 0,
                dose: "2.5mg".into(),
                billing_price_id: "price-a".into(),
                product_variant_id: "variant-a".into(),
            }],
            2,
            now(),
            now(),
        )
    }

    fn subscription(external_id: &str, next_charge: Option<DateTime<Utc>>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            external_customer_id: "cus_1".into(),
            billing_price_id: "price-a".into(),
            provider: BillingProvider::ItemPriceBased,
            prescription_id: None,
            patient_id: Uuid::new_v4(),
            questionnaire_submission_id: None,
            status: SubscriptionStatus::Active,
            next_charge_scheduled_at: next_charge,
            initial_order_id: None,
            cancelled_at: None,
            cancellation_reason: None,
            refill_alert_sent_for: None,
        }
    }

    #[tokio::test]
    async fn second_subscription_for_same_prescription_is_rejected() {
        let store = InMemoryLifecycleStore::new();
        let p = prescription();
        let mut first = subscription("sub_1", None);
        first.prescription_id = Some(p.id);
        store
            .apply(ChangeSet::new().with_prescription(p.clone()).with_subscription(first))
            .await
            .unwrap();

        let mut second = subscription("sub_2", None);
        second.prescription_id = Some(p.id);
        let result = store.apply(ChangeSet::new().with_subscription(second.clone())).await;
        assert!(matches!(result, Err(LifecycleError::Conflict(_))));
        assert!(store.subscription(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_change_set_leaves_no_partial_writes() {
        let store = InMemoryLifecycleStore::new();
        let p = prescription();
        let payment = ProcessedPayment {
            external_payment_id: "inv_1".into(),
            subscription_id: Uuid::new_v4(),
            prescription_id: p.id,
            order_id: "order_1".into(),
            refill_decremented: true,
            processed_at: now(),
        };
        store
            .apply(ChangeSet::new().with_processed_payment(payment.clone()))
            .await
            .unwrap();

        let mut updated = p.clone();
        updated.status = PrescriptionStatus::Active;
        let result = store
            .apply(ChangeSet::new().with_prescription(updated).with_processed_payment(payment))
            .await;
        assert!(result.is_err());
        assert!(store.prescription(p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn renewing_window_is_inclusive_and_skips_inactive() {
        let store = InMemoryLifecycleStore::new();
        let edge = subscription("edge", Some(now() + Duration::days(3)));
        let inside = subscription("inside", Some(now() + Duration::days(1)));
        let outside = subscription("outside", Some(now() + Duration::days(3) + Duration::seconds(1)));
        let undated = subscription("undated", None);
        let mut paused = subscription("paused", Some(now() + Duration::days(1)));
        paused.status = SubscriptionStatus::Paused;

        let mut changes = ChangeSet::new();
        for s in [edge, inside, outside, undated, paused] {
            changes = changes.with_subscription(s);
        }
        store.apply(changes).await.unwrap();

        let renewing = store
            .subscriptions_renewing_between(now(), now() + Duration::days(3))
            .await
            .unwrap();
        let ids: Vec<_> = renewing.iter().map(|s| s.external_id.as_str()).collect();
        assert_eq!(ids, vec!["inside", "edge"]);
    }

    #[tokio::test]
    async fn lookups_by_secondary_keys() {
        let store = InMemoryLifecycleStore::new();
        let mut p = prescription();
        p.signature_request_id = Some("sig_9".into());
        let mut s = subscription("sub_9", None);
        let submission = Uuid::new_v4();
        s.questionnaire_submission_id = Some(submission);
        s.prescription_id = Some(p.id);
        store
            .apply(ChangeSet::new().with_prescription(p.clone()).with_subscription(s.clone()))
            .await
            .unwrap();

        assert_eq!(store.prescription_by_signature_request("sig_9").await.unwrap(), Some(p.clone()));
        assert_eq!(store.subscription_by_external_id("sub_9").await.unwrap(), Some(s.clone()));
        assert_eq!(store.subscription_for_prescription(p.id).await.unwrap(), Some(s.clone()));
        assert_eq!(store.subscription_for_questionnaire(submission).await.unwrap(), Some(s));
    }
}
