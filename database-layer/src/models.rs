//! Row shapes and their conversion to lifecycle records.
//!
//! Identifiers are stored as hyphenated text and timestamps as RFC 3339 text
//! with microsecond precision in UTC, which keeps lexical order equal to
//! chronological order for the renewal-window query.

use chrono::{DateTime, SecondsFormat, Utc};
use prescription_lifecycle::{ClinicalPlan, DoseStep, Prescription, ProcessedPayment, Subscription};
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseResult};

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn optional_timestamp(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(timestamp)
}

fn parse_timestamp(column: &'static str, raw: &str) -> DatabaseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DatabaseError::decode(column, e))
}

fn parse_optional_timestamp(column: &'static str, raw: Option<String>) -> DatabaseResult<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_timestamp(column, &raw)).transpose()
}

fn parse_uuid(column: &'static str, raw: &str) -> DatabaseResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::decode(column, e))
}

fn parse_optional_uuid(column: &'static str, raw: Option<String>) -> DatabaseResult<Option<Uuid>> {
    raw.map(|raw| parse_uuid(column, &raw)).transpose()
}

fn parse_enum<T>(column: &'static str, raw: &str) -> DatabaseResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e| DatabaseError::decode(column, e))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PrescriptionRow {
    pub id: String,
    pub patient_id: String,
    pub prescriber_id: String,
    pub clinical_plan_id: Option<String>,
    pub medication_name: String,
    pub dose_schedule: String,
    pub refills_remaining: i64,
    pub status: String,
    pub activation: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub signature_request_id: Option<String>,
    pub signature_document_id: Option<String>,
    pub signed_at: Option<String>,
    pub signed_document_ref: Option<String>,
    pub replaces_prescription_id: Option<String>,
    pub replaced_by_prescription_id: Option<String>,
    pub renewals_processed: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DatabaseError;

    fn try_from(row: PrescriptionRow) -> DatabaseResult<Self> {
        let dose_schedule: Vec<DoseStep> =
            serde_json::from_str(&row.dose_schedule).map_err(|e| DatabaseError::decode("dose_schedule", e))?;
        Ok(Prescription {
            id: parse_uuid("id", &row.id)?,
            patient_id: parse_uuid("patient_id", &row.patient_id)?,
            prescriber_id: parse_uuid("prescriber_id", &row.prescriber_id)?,
            clinical_plan_id: parse_optional_uuid("clinical_plan_id", row.clinical_plan_id)?,
            medication_name: row.medication_name,
            dose_schedule,
            refills_remaining: i32::try_from(row.refills_remaining)
                .map_err(|e| DatabaseError::decode("refills_remaining", e))?,
            status: parse_enum("status", &row.status)?,
            activation: parse_enum("activation", &row.activation)?,
            start_date: parse_timestamp("start_date", &row.start_date)?,
            end_date: parse_optional_timestamp("end_date", row.end_date)?,
            signature_request_id: row.signature_request_id,
            signature_document_id: row.signature_document_id,
            signed_at: parse_optional_timestamp("signed_at", row.signed_at)?,
            signed_document_ref: row.signed_document_ref,
            replaces_prescription_id: parse_optional_uuid("replaces_prescription_id", row.replaces_prescription_id)?,
            replaced_by_prescription_id: parse_optional_uuid(
                "replaced_by_prescription_id",
                row.replaced_by_prescription_id,
            )?,
            renewals_processed: u32::try_from(row.renewals_processed)
                .map_err(|e| DatabaseError::decode("renewals_processed", e))?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub id: String,
    pub external_id: String,
    pub external_customer_id: String,
    pub billing_price_id: String,
    pub provider: String,
    pub prescription_id: Option<String>,
    pub patient_id: String,
    pub questionnaire_submission_id: Option<String>,
    pub status: String,
    pub next_charge_scheduled_at: Option<String>,
    pub initial_order_id: Option<String>,
    pub cancelled_at: Option<String>,
    pub cancellation_reason: Option<String>,
    pub refill_alert_sent_for: Option<String>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DatabaseError;

    fn try_from(row: SubscriptionRow) -> DatabaseResult<Self> {
        Ok(Subscription {
            id: parse_uuid("id", &row.id)?,
            external_id: row.external_id,
            external_customer_id: row.external_customer_id,
            billing_price_id: row.billing_price_id,
            provider: parse_enum("provider", &row.provider)?,
            prescription_id: parse_optional_uuid("prescription_id", row.prescription_id)?,
            patient_id: parse_uuid("patient_id", &row.patient_id)?,
            questionnaire_submission_id: parse_optional_uuid(
                "questionnaire_submission_id",
                row.questionnaire_submission_id,
            )?,
            status: parse_enum("status", &row.status)?,
            next_charge_scheduled_at: parse_optional_timestamp(
                "next_charge_scheduled_at",
                row.next_charge_scheduled_at,
            )?,
            initial_order_id: row.initial_order_id,
            cancelled_at: parse_optional_timestamp("cancelled_at", row.cancelled_at)?,
            cancellation_reason: row.cancellation_reason,
            refill_alert_sent_for: parse_optional_timestamp("refill_alert_sent_for", row.refill_alert_sent_for)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ClinicalPlanRow {
    pub id: String,
    pub patient_id: String,
    pub questionnaire_submission_id: String,
    pub status: String,
}

impl TryFrom<ClinicalPlanRow> for ClinicalPlan {
    type Error = DatabaseError;

    fn try_from(row: ClinicalPlanRow) -> DatabaseResult<Self> {
        Ok(ClinicalPlan {
            id: parse_uuid("id", &row.id)?,
            patient_id: parse_uuid("patient_id", &row.patient_id)?,
            questionnaire_submission_id: parse_uuid(
                "questionnaire_submission_id",
                &row.questionnaire_submission_id,
            )?,
            status: parse_enum("status", &row.status)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProcessedPaymentRow {
    pub external_payment_id: String,
    pub subscription_id: String,
    pub prescription_id: String,
    pub order_id: String,
    pub refill_decremented: bool,
    pub processed_at: String,
}

impl TryFrom<ProcessedPaymentRow> for ProcessedPayment {
    type Error = DatabaseError;

    fn try_from(row: ProcessedPaymentRow) -> DatabaseResult<Self> {
        Ok(ProcessedPayment {
            external_payment_id: row.external_payment_id,
            subscription_id: parse_uuid("subscription_id", &row.subscription_id)?,
            prescription_id: parse_uuid("prescription_id", &row.prescription_id)?,
            order_id: row.order_id,
            refill_decremented: row.refill_decremented,
            processed_at: parse_timestamp("processed_at", &row.processed_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2024, 9, 1, 9, 0, 0).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);
        assert!(timestamp(earlier) < timestamp(later));
        assert_eq!(timestamp(earlier), "2024-09-01T09:00:00.000000Z");
        assert_eq!(parse_timestamp("t", &timestamp(later)).unwrap(), later);
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let row = ClinicalPlanRow {
            id: Uuid::new_v4().to_string(),
            patient_id: Uuid::new_v4().to_string(),
            questionnaire_submission_id: Uuid::new_v4().to_string(),
            status: "archived".into(),
        };
        let err = ClinicalPlan::try_from(row).unwrap_err();
        assert!(matches!(err, DatabaseError::Decode { column: "status", .. }));
    }
}
