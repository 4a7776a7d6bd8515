//! Persisted entities of the prescription lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LifecycleError;

/// Implements `as_str`, `Display` and `FromStr` over the snake_case wire names.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LifecycleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(LifecycleError::DataIntegrity(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    PendingSignature,
    Active,
    Completed,
    Cancelled,
    Replaced,
}

string_enum!(PrescriptionStatus {
    PendingSignature => "pending_signature",
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
    Replaced => "replaced",
});

impl PrescriptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PrescriptionStatus::Completed | PrescriptionStatus::Cancelled | PrescriptionStatus::Replaced
        )
    }
}

/// Progress of the signature-completion workflow for one prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    AwaitingSignature,
    SignedProcessing,
    Activated,
    Failed,
}

string_enum!(ActivationState {
    AwaitingSignature => "awaiting_signature",
    SignedProcessing => "signed_processing",
    Activated => "activated",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

string_enum!(SubscriptionStatus {
    Active => "active",
    Paused => "paused",
    Cancelled => "cancelled",
});

/// Which billing adapter owns a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingProvider {
    /// Subscriptions priced by a plan identifier.
    PlanBased,
    /// Subscriptions priced by an item price attached to the subscription.
    ItemPriceBased,
}

string_enum!(BillingProvider {
    PlanBased => "plan_based",
    ItemPriceBased => "item_price_based",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalPlanStatus {
    Active,
    Completed,
}

string_enum!(ClinicalPlanStatus {
    Active => "active",
    Completed => "completed",
});

/// One step of a titration schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseStep {
    /// Number of refills consumed when this step becomes current.
    pub refill_number: u32,
    pub dose: String,
    pub billing_price_id: String,
    pub product_variant_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub prescriber_id: Uuid,
    pub clinical_plan_id: Option<Uuid>,
    pub medication_name: String,
    /// Ordered by `refill_number` ascending; index 0 is the initial dose.
    pub dose_schedule: Vec<DoseStep>,
    pub refills_remaining: i32,
    pub status: PrescriptionStatus,
    pub activation: ActivationState,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub signature_request_id: Option<String>,
    pub signature_document_id: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signed_document_ref: Option<String>,
    pub replaces_prescription_id: Option<Uuid>,
    pub replaced_by_prescription_id: Option<Uuid>,
    /// Recurring payments processed against this prescription.
    pub renewals_processed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prescription {
    /// A freshly written prescription awaiting the prescriber's signature.
    pub fn pending(
        patient_id: Uuid,
        prescriber_id: Uuid,
        medication_name: impl Into<String>,
        dose_schedule: Vec<DoseStep>,
        refills_remaining: i32,
        start_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            prescriber_id,
            clinical_plan_id: None,
            medication_name: medication_name.into(),
            dose_schedule,
            refills_remaining,
            status: PrescriptionStatus::PendingSignature,
            activation: ActivationState::AwaitingSignature,
            start_date,
            end_date: None,
            signature_request_id: None,
            signature_document_id: None,
            signed_at: None,
            signed_document_ref: None,
            replaces_prescription_id: None,
            replaced_by_prescription_id: None,
            renewals_processed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_replacement(&self) -> bool {
        self.replaces_prescription_id.is_some()
    }

    pub fn is_signed(&self) -> bool {
        self.signed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    /// Identifier in the billing provider.
    pub external_id: String,
    pub external_customer_id: String,
    pub billing_price_id: String,
    pub provider: BillingProvider,
    pub prescription_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub questionnaire_submission_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub next_charge_scheduled_at: Option<DateTime<Utc>>,
    pub initial_order_id: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    /// Charge date the care team was last alerted about, when alert
    /// deduplication is enabled.
    pub refill_alert_sent_for: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalPlan {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub questionnaire_submission_id: Uuid,
    pub status: ClinicalPlanStatus,
}

/// Idempotency record for a recurring payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedPayment {
    pub external_payment_id: String,
    pub subscription_id: Uuid,
    pub prescription_id: Uuid,
    pub order_id: String,
    pub refill_decremented: bool,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_round_trip_through_strings() {
        for status in [
            PrescriptionStatus::PendingSignature,
            PrescriptionStatus::Active,
            PrescriptionStatus::Completed,
            PrescriptionStatus::Cancelled,
            PrescriptionStatus::Replaced,
        ] {
            assert_eq!(status.as_str().parse::<PrescriptionStatus>().unwrap(), status);
        }
        assert!("archived".parse::<PrescriptionStatus>().is_err());
    }

    #[test]
    fn only_completed_cancelled_and_replaced_are_terminal() {
        assert!(!PrescriptionStatus::PendingSignature.is_terminal());
        assert!(!PrescriptionStatus::Active.is_terminal());
        assert!(PrescriptionStatus::Replaced.is_terminal());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&BillingProvider::ItemPriceBased).unwrap();
        assert_eq!(json, "\"item_price_based\"");
    }
}
