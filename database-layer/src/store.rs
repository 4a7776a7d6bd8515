use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prescription_lifecycle::error::Result;
use prescription_lifecycle::{
    ChangeSet, ClinicalPlan, LifecycleStore, Prescription, ProcessedPayment, Subscription, SubscriptionStatus,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::error::{DatabaseError, DatabaseResult};
use crate::models::{
    optional_timestamp, timestamp, ClinicalPlanRow, PrescriptionRow, ProcessedPaymentRow, SubscriptionRow,
};

const PRESCRIPTION_COLUMNS: &str = "id, patient_id, prescriber_id, clinical_plan_id, medication_name, \
     dose_schedule, refills_remaining, status, activation, start_date, end_date, signature_request_id, \
     signature_document_id, signed_at, signed_document_ref, replaces_prescription_id, \
     replaced_by_prescription_id, renewals_processed, created_at, updated_at";

const SUBSCRIPTION_COLUMNS: &str = "id, external_id, external_customer_id, billing_price_id, provider, \
     prescription_id, patient_id, questionnaire_submission_id, status, next_charge_scheduled_at, \
     initial_order_id, cancelled_at, cancellation_reason, refill_alert_sent_for";

/// [`LifecycleStore`] backed by SQLite. Each change set is one transaction.
#[derive(Clone, Debug)]
pub struct SqliteLifecycleStore {
    pool: DatabasePool,
}

impl SqliteLifecycleStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn db(&self) -> &SqlitePool {
        self.pool.pool()
    }

    async fn fetch_prescription(&self, filter: &str, value: String) -> DatabaseResult<Option<Prescription>> {
        let sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE {filter} = ? LIMIT 1");
        sqlx::query_as::<_, PrescriptionRow>(&sql)
            .bind(value)
            .fetch_optional(self.db())
            .await?
            .map(Prescription::try_from)
            .transpose()
    }

    async fn fetch_subscription(&self, filter: &str, value: String) -> DatabaseResult<Option<Subscription>> {
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE {filter} = ? LIMIT 1");
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(value)
            .fetch_optional(self.db())
            .await?
            .map(Subscription::try_from)
            .transpose()
    }

    async fn fetch_renewing(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DatabaseResult<Vec<Subscription>> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE status = ? AND next_charge_scheduled_at BETWEEN ? AND ? \
             ORDER BY next_charge_scheduled_at, id"
        );
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(SubscriptionStatus::Active.as_str())
            .bind(timestamp(from))
            .bind(timestamp(to))
            .fetch_all(self.db())
            .await?
            .into_iter()
            .map(Subscription::try_from)
            .collect()
    }

    async fn fetch_clinical_plan(&self, id: Uuid) -> DatabaseResult<Option<ClinicalPlan>> {
        sqlx::query_as::<_, ClinicalPlanRow>(
            "SELECT id, patient_id, questionnaire_submission_id, status FROM clinical_plans WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.db())
        .await?
        .map(ClinicalPlan::try_from)
        .transpose()
    }

    async fn fetch_processed_payment(&self, external_payment_id: &str) -> DatabaseResult<Option<ProcessedPayment>> {
        sqlx::query_as::<_, ProcessedPaymentRow>(
            "SELECT external_payment_id, subscription_id, prescription_id, order_id, refill_decremented, \
             processed_at FROM processed_payments WHERE external_payment_id = ?",
        )
        .bind(external_payment_id)
        .fetch_optional(self.db())
        .await?
        .map(ProcessedPayment::try_from)
        .transpose()
    }

    async fn write(&self, changes: ChangeSet) -> DatabaseResult<()> {
        let mut tx = self.db().begin().await?;

        for payment in &changes.processed_payments {
            insert_processed_payment(&mut tx, payment).await?;
        }
        for prescription in &changes.prescriptions {
            upsert_prescription(&mut tx, prescription).await?;
        }
        for subscription in &changes.subscriptions {
            upsert_subscription(&mut tx, subscription).await?;
        }
        for plan in &changes.clinical_plans {
            upsert_clinical_plan(&mut tx, plan).await?;
        }

        tx.commit().await?;
        debug!(
            prescriptions = changes.prescriptions.len(),
            subscriptions = changes.subscriptions.len(),
            clinical_plans = changes.clinical_plans.len(),
            processed_payments = changes.processed_payments.len(),
            "Change set committed"
        );
        Ok(())
    }
}

async fn insert_processed_payment(conn: &mut SqliteConnection, payment: &ProcessedPayment) -> DatabaseResult<()> {
    sqlx::query(
        "INSERT INTO processed_payments \
         (external_payment_id, subscription_id, prescription_id, order_id, refill_decremented, processed_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&payment.external_payment_id)
    .bind(payment.subscription_id.to_string())
    .bind(payment.prescription_id.to_string())
    .bind(&payment.order_id)
    .bind(payment.refill_decremented)
    .bind(timestamp(payment.processed_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| DatabaseError::from_write(e, &format!("payment {}", payment.external_payment_id)))?;
    Ok(())
}

async fn upsert_prescription(conn: &mut SqliteConnection, p: &Prescription) -> DatabaseResult<()> {
    let dose_schedule = serde_json::to_string(&p.dose_schedule)?;
    sqlx::query(
        r#"
        INSERT INTO prescriptions (
            id, patient_id, prescriber_id, clinical_plan_id, medication_name, dose_schedule,
            refills_remaining, status, activation, start_date, end_date, signature_request_id,
            signature_document_id, signed_at, signed_document_ref, replaces_prescription_id,
            replaced_by_prescription_id, renewals_processed, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            clinical_plan_id = excluded.clinical_plan_id,
            medication_name = excluded.medication_name,
            dose_schedule = excluded.dose_schedule,
            refills_remaining = excluded.refills_remaining,
            status = excluded.status,
            activation = excluded.activation,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            signature_request_id = excluded.signature_request_id,
            signature_document_id = excluded.signature_document_id,
            signed_at = excluded.signed_at,
            signed_document_ref = excluded.signed_document_ref,
            replaces_prescription_id = excluded.replaces_prescription_id,
            replaced_by_prescription_id = excluded.replaced_by_prescription_id,
            renewals_processed = excluded.renewals_processed,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(p.id.to_string())
    .bind(p.patient_id.to_string())
    .bind(p.prescriber_id.to_string())
    .bind(p.clinical_plan_id.map(|id| id.to_string()))
    .bind(&p.medication_name)
    .bind(dose_schedule)
    .bind(i64::from(p.refills_remaining))
    .bind(p.status.as_str())
    .bind(p.activation.as_str())
    .bind(timestamp(p.start_date))
    .bind(optional_timestamp(p.end_date))
    .bind(&p.signature_request_id)
    .bind(&p.signature_document_id)
    .bind(optional_timestamp(p.signed_at))
    .bind(&p.signed_document_ref)
    .bind(p.replaces_prescription_id.map(|id| id.to_string()))
    .bind(p.replaced_by_prescription_id.map(|id| id.to_string()))
    .bind(i64::from(p.renewals_processed))
    .bind(timestamp(p.created_at))
    .bind(timestamp(p.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| DatabaseError::from_write(e, &format!("prescription {}", p.id)))?;
    Ok(())
}

async fn upsert_subscription(conn: &mut SqliteConnection, s: &Subscription) -> DatabaseResult<()> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            id, external_id, external_customer_id, billing_price_id, provider, prescription_id,
            patient_id, questionnaire_submission_id, status, next_charge_scheduled_at,
            initial_order_id, cancelled_at, cancellation_reason, refill_alert_sent_for
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            external_id = excluded.external_id,
            external_customer_id = excluded.external_customer_id,
            billing_price_id = excluded.billing_price_id,
            provider = excluded.provider,
            prescription_id = excluded.prescription_id,
            questionnaire_submission_id = excluded.questionnaire_submission_id,
            status = excluded.status,
            next_charge_scheduled_at = excluded.next_charge_scheduled_at,
            initial_order_id = excluded.initial_order_id,
            cancelled_at = excluded.cancelled_at,
            cancellation_reason = excluded.cancellation_reason,
            refill_alert_sent_for = excluded.refill_alert_sent_for
        "#,
    )
    .bind(s.id.to_string())
    .bind(&s.external_id)
    .bind(&s.external_customer_id)
    .bind(&s.billing_price_id)
    .bind(s.provider.as_str())
    .bind(s.prescription_id.map(|id| id.to_string()))
    .bind(s.patient_id.to_string())
    .bind(s.questionnaire_submission_id.map(|id| id.to_string()))
    .bind(s.status.as_str())
    .bind(optional_timestamp(s.next_charge_scheduled_at))
    .bind(&s.initial_order_id)
    .bind(optional_timestamp(s.cancelled_at))
    .bind(&s.cancellation_reason)
    .bind(optional_timestamp(s.refill_alert_sent_for))
    .execute(&mut *conn)
    .await
    .map_err(|e| DatabaseError::from_write(e, &format!("subscription {}", s.id)))?;
    Ok(())
}

async fn upsert_clinical_plan(conn: &mut SqliteConnection, plan: &ClinicalPlan) -> DatabaseResult<()> {
    sqlx::query(
        "INSERT INTO clinical_plans (id, patient_id, questionnaire_submission_id, status) \
         VALUES (?, ?, ?, ?) \
         ON CONFLICT (id) DO UPDATE SET status = excluded.status",
    )
    .bind(plan.id.to_string())
    .bind(plan.patient_id.to_string())
    .bind(plan.questionnaire_submission_id.to_string())
    .bind(plan.status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| DatabaseError::from_write(e, &format!("clinical plan {}", plan.id)))?;
    Ok(())
}

#[async_trait]
impl LifecycleStore for SqliteLifecycleStore {
    async fn prescription(&self, id: Uuid) -> Result<Option<Prescription>> {
        Ok(self.fetch_prescription("id", id.to_string()).await?)
    }

    async fn prescription_by_signature_request(&self, request_id: &str) -> Result<Option<Prescription>> {
        Ok(self
            .fetch_prescription("signature_request_id", request_id.to_string())
            .await?)
    }

    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self.fetch_subscription("id", id.to_string()).await?)
    }

    async fn subscription_by_external_id(&self, external_id: &str) -> Result<Option<Subscription>> {
        Ok(self
            .fetch_subscription("external_id", external_id.to_string())
            .await?)
    }

    async fn subscription_for_prescription(&self, prescription_id: Uuid) -> Result<Option<Subscription>> {
        Ok(self
            .fetch_subscription("prescription_id", prescription_id.to_string())
            .await?)
    }

    async fn subscription_for_questionnaire(&self, submission_id: Uuid) -> Result<Option<Subscription>> {
        Ok(self
            .fetch_subscription("questionnaire_submission_id", submission_id.to_string())
            .await?)
    }

    async fn clinical_plan(&self, id: Uuid) -> Result<Option<ClinicalPlan>> {
        Ok(self.fetch_clinical_plan(id).await?)
    }

    async fn subscriptions_renewing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        Ok(self.fetch_renewing(from, to).await?)
    }

    async fn processed_payment(&self, external_payment_id: &str) -> Result<Option<ProcessedPayment>> {
        Ok(self.fetch_processed_payment(external_payment_id).await?)
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        Ok(self.write(changes).await?)
    }
}
