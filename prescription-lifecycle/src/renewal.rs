//! Renewal classification.
//!
//! Decides, for a subscription and its linked prescription, whether the next
//! charge is clinically backed, whether an unbacked charge is close enough to
//! cancel now, and whether the care team should be asked for a refill.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Prescription, PrescriptionStatus, Subscription};

/// Validity axis of a renewal decision. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Validity {
    Valid,
    InvalidWait,
    InvalidCancelNow,
}

/// Why a renewal is not clinically backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "status")]
pub enum InvalidReason {
    NoLinkedPrescription,
    NotActive(PrescriptionStatus),
    Expired,
    OutOfRefills,
}

impl InvalidReason {
    pub fn describe(&self) -> String {
        match self {
            InvalidReason::NoLinkedPrescription => "no linked prescription".to_string(),
            InvalidReason::NotActive(status) => format!("prescription is {status}"),
            InvalidReason::Expired => "prescription has expired".to_string(),
            InvalidReason::OutOfRefills => "no refills remaining".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalDecision {
    pub validity: Validity,
    /// Active prescription out of refills with a charge inside the alert window.
    pub needs_refill_alert: bool,
    pub reasons: Vec<InvalidReason>,
}

impl RenewalDecision {
    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    /// Human-readable summary, used as the cancellation reason.
    pub fn reason_summary(&self) -> String {
        if self.reasons.is_empty() {
            return "renewal is valid".to_string();
        }
        self.reasons
            .iter()
            .map(InvalidReason::describe)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Window lengths used when classifying renewals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalWindows {
    /// An invalid renewal charging sooner than this is cancelled immediately.
    pub cancellation: Duration,
    /// Out-of-refill prescriptions charging within this window raise an alert.
    pub refill_alert: Duration,
}

impl Default for RenewalWindows {
    fn default() -> Self {
        Self {
            cancellation: Duration::hours(48),
            refill_alert: Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenewalValidator {
    windows: RenewalWindows,
}

impl RenewalValidator {
    pub fn new(windows: RenewalWindows) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> RenewalWindows {
        self.windows
    }

    /// Classify a renewal. Total over every input shape.
    pub fn classify(
        &self,
        prescription: Option<&Prescription>,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> RenewalDecision {
        let next_charge = subscription.next_charge_scheduled_at;

        let Some(prescription) = prescription else {
            return RenewalDecision {
                validity: Validity::InvalidCancelNow,
                needs_refill_alert: false,
                reasons: vec![InvalidReason::NoLinkedPrescription],
            };
        };

        let mut reasons = Vec::new();
        if prescription.status != PrescriptionStatus::Active {
            reasons.push(InvalidReason::NotActive(prescription.status));
        }
        if prescription.end_date.is_some_and(|end| end < now) {
            reasons.push(InvalidReason::Expired);
        }
        if prescription.refills_remaining <= 0 {
            reasons.push(InvalidReason::OutOfRefills);
        }

        // a missing charge date is never imminent
        let imminent = next_charge.is_some_and(|at| at < now + self.windows.cancellation);

        let validity = match (reasons.is_empty(), imminent) {
            (true, _) => Validity::Valid,
            (false, true) => Validity::InvalidCancelNow,
            (false, false) => Validity::InvalidWait,
        };

        let needs_refill_alert = prescription.status == PrescriptionStatus::Active
            && prescription.refills_remaining <= 0
            && next_charge.is_some_and(|at| at >= now && at <= now + self.windows.refill_alert);

        RenewalDecision {
            validity,
            needs_refill_alert,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivationState, BillingProvider, DoseStep, SubscriptionStatus};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap()
    }

    fn prescription(status: PrescriptionStatus, refills: i32, end_date: Option<DateTime<Utc>>) -> Prescription {
        let mut p = Prescription::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "semaglutide",
            vec![DoseStep {
                refill_number: 0,
                dose: "0.25mg".into(),
                billing_price_id: "price-1".into(),
                product_variant_id: "variant-1".into(),
            }],
            refills,
            now() - Duration::days(30),
            now() - Duration::days(30),
        );
        p.status = status;
        p.activation = ActivationState::Activated;
        p.end_date = end_date;
        p
    }

    fn subscription(next_charge: Option<DateTime<Utc>>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            external_id: "sub_123".into(),
            external_customer_id: "cus_123".into(),
            billing_price_id: "price-1".into(),
            provider: BillingProvider::PlanBased,
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

    #[test]
    fn expired_prescription_with_imminent_charge_is_cancelled() {
        let validator = RenewalValidator::default();
        let p = prescription(PrescriptionStatus::Active, 2, Some(now() - Duration::days(1)));
        let s = subscription(Some(now() + Duration::hours(24)));

        let decision = validator.classify(Some(&p), &s, now());
        assert_eq!(decision.validity, Validity::InvalidCancelNow);
        assert_eq!(decision.reasons, vec![InvalidReason::Expired]);
        assert!(!decision.needs_refill_alert);
    }

    #[test]
    fn expired_prescription_charging_in_ten_days_waits() {
        let validator = RenewalValidator::default();
        let p = prescription(PrescriptionStatus::Active, 3, Some(now() - Duration::days(1)));
        let s = subscription(Some(now() + Duration::days(10)));

        let decision = validator.classify(Some(&p), &s, now());
        assert_eq!(decision.validity, Validity::InvalidWait);
        assert_eq!(decision.reasons, vec![InvalidReason::Expired]);
        assert!(!decision.needs_refill_alert);
    }

    #[test]
    fn out_of_refills_charge_in_five_days_waits_and_alerts() {
        let validator = RenewalValidator::default();
        let p = prescription(PrescriptionStatus::Active, 0, None);
        let s = subscription(Some(now() + Duration::days(5)));

        let decision = validator.classify(Some(&p), &s, now());
        assert_eq!(decision.validity, Validity::InvalidWait);
        assert!(decision.needs_refill_alert);
    }

    #[test]
    fn missing_prescription_is_cancelled_even_without_a_charge_date() {
        let validator = RenewalValidator::default();
        let decision = validator.classify(None, &subscription(None), now());
        assert_eq!(decision.validity, Validity::InvalidCancelNow);
        assert_eq!(decision.reasons, vec![InvalidReason::NoLinkedPrescription]);
    }

    #[test]
    fn invalid_without_charge_date_waits() {
        let validator = RenewalValidator::default();
        let p = prescription(PrescriptionStatus::Cancelled, 3, None);
        let decision = validator.classify(Some(&p), &subscription(None), now());
        assert_eq!(decision.validity, Validity::InvalidWait);
    }

    #[test]
    fn cancellation_window_is_exclusive_at_48_hours() {
        let validator = RenewalValidator::default();
        let p = prescription(PrescriptionStatus::Active, 0, None);

        let at_boundary = subscription(Some(now() + Duration::hours(48)));
        assert_eq!(
            validator.classify(Some(&p), &at_boundary, now()).validity,
            Validity::InvalidWait
        );

        let inside = subscription(Some(now() + Duration::hours(48) - Duration::seconds(1)));
        assert_eq!(
            validator.classify(Some(&p), &inside, now()).validity,
            Validity::InvalidCancelNow
        );
    }

    #[test]
    fn alert_window_includes_both_ends() {
        let validator = RenewalValidator::default();
        let p = prescription(PrescriptionStatus::Active, 0, None);

        for at in [now(), now() + Duration::days(7)] {
            assert!(validator.classify(Some(&p), &subscription(Some(at)), now()).needs_refill_alert);
        }
        let past = subscription(Some(now() - Duration::seconds(1)));
        assert!(!validator.classify(Some(&p), &past, now()).needs_refill_alert);
        let beyond = subscription(Some(now() + Duration::days(7) + Duration::seconds(1)));
        assert!(!validator.classify(Some(&p), &beyond, now()).needs_refill_alert);
    }

    #[test]
    fn active_unexpired_prescription_with_refills_is_valid() {
        let validator = RenewalValidator::default();
        let p = prescription(PrescriptionStatus::Active, 1, Some(now() + Duration::days(90)));
        let decision = validator.classify(Some(&p), &subscription(Some(now() + Duration::hours(1))), now());
        assert!(decision.is_valid());
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn end_date_equal_to_now_is_not_expired() {
        let validator = RenewalValidator::default();
        let p = prescription(PrescriptionStatus::Active, 1, Some(now()));
        assert!(validator.classify(Some(&p), &subscription(None), now()).is_valid());
    }

    fn any_status() -> impl Strategy<Value = PrescriptionStatus> {
        prop_oneof![
            Just(PrescriptionStatus::PendingSignature),
            Just(PrescriptionStatus::Active),
            Just(PrescriptionStatus::Completed),
            Just(PrescriptionStatus::Cancelled),
            Just(PrescriptionStatus::Replaced),
        ]
    }

    proptest! {
        #[test]
        fn classification_is_total_and_consistent(
            linked in any::<bool>(),
            status in any_status(),
            refills in -3i32..5,
            end_offset_hours in prop::option::of(-500i64..500),
            charge_offset_hours in prop::option::of(-100i64..400),
        ) {
            let validator = RenewalValidator::default();
            let p = prescription(status, refills, end_offset_hours.map(|h| now() + Duration::hours(h)));
            let s = subscription(charge_offset_hours.map(|h| now() + Duration::hours(h)));

            let decision = validator.classify(linked.then_some(&p), &s, now());

            let invalid = !linked
                || status != PrescriptionStatus::Active
                || end_offset_hours.is_some_and(|h| h < 0)
                || refills <= 0;
            prop_assert_eq!(decision.is_valid(), !invalid);
            prop_assert_eq!(decision.reasons.is_empty(), !invalid);

            if decision.needs_refill_alert {
                prop_assert!(linked && status == PrescriptionStatus::Active && refills <= 0);
                prop_assert!(decision.validity != Validity::Valid);
            }
            if !linked {
                prop_assert_eq!(decision.validity, Validity::InvalidCancelNow);
            }
            let imminent = charge_offset_hours.is_some_and(|h| h < 48);
            prop_assert_eq!(
                decision.validity == Validity::InvalidCancelNow,
                invalid && (!linked || imminent)
            );
            prop_assert_eq!(
                decision.validity == Validity::InvalidWait,
                invalid && linked && !imminent
            );
        }
    }
}
