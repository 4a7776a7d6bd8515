use crate::error::{DatabaseError, DatabaseResult};
use sqlx::SqlitePool;
use tracing::debug;

/// Schema statements, applied in order. Each is idempotent.
const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS clinical_plans (
        id TEXT PRIMARY KEY,
        patient_id TEXT NOT NULL,
        questionnaire_submission_id TEXT NOT NULL,
        status TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS prescriptions (
        id TEXT PRIMARY KEY,
        patient_id TEXT NOT NULL,
        prescriber_id TEXT NOT NULL,
        clinical_plan_id TEXT,
        medication_name TEXT NOT NULL,
        dose_schedule TEXT NOT NULL,
        refills_remaining INTEGER NOT NULL,
        status TEXT NOT NULL,
        activation TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT,
        signature_request_id TEXT,
        signature_document_id TEXT,
        signed_at TEXT,
        signed_document_ref TEXT,
        replaces_prescription_id TEXT,
        replaced_by_prescription_id TEXT,
        renewals_processed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS prescriptions_signature_request ON prescriptions (signature_request_id)",
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        id TEXT PRIMARY KEY,
        external_id TEXT NOT NULL UNIQUE,
        external_customer_id TEXT NOT NULL,
        billing_price_id TEXT NOT NULL,
        provider TEXT NOT NULL,
        prescription_id TEXT,
        patient_id TEXT NOT NULL,
        questionnaire_submission_id TEXT,
        status TEXT NOT NULL,
        next_charge_scheduled_at TEXT,
        initial_order_id TEXT,
        cancelled_at TEXT,
        cancellation_reason TEXT,
        refill_alert_sent_for TEXT
    )
    "#,
    // A prescription backs at most one subscription.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS subscriptions_prescription_link
        ON subscriptions (prescription_id) WHERE prescription_id IS NOT NULL
    "#,
    "CREATE INDEX IF NOT EXISTS subscriptions_next_charge ON subscriptions (status, next_charge_scheduled_at)",
    "CREATE INDEX IF NOT EXISTS subscriptions_questionnaire ON subscriptions (questionnaire_submission_id)",
    r#"
    CREATE TABLE IF NOT EXISTS processed_payments (
        external_payment_id TEXT PRIMARY KEY,
        subscription_id TEXT NOT NULL,
        prescription_id TEXT NOT NULL,
        order_id TEXT NOT NULL,
        refill_decremented INTEGER NOT NULL,
        processed_at TEXT NOT NULL
    )
    "#,
];

pub async fn migrate(pool: &SqlitePool) -> DatabaseResult<()> {
    for (index, statement) in STATEMENTS.iter().enumerate() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("statement {index}: {e}")))?;
    }
    debug!(statements = STATEMENTS.len(), "Schema up to date");
    Ok(())
}
