mod common;

use chrono::Duration;
use common::{start, two_step_schedule, BillingCall, Harness};
use prescription_lifecycle::gateways::{ExternalSubscription, NotificationEvent, Recipient};
use prescription_lifecycle::{
    ChangeSet, ClinicalPlanStatus, GatewayError, LifecycleStore, PrescriptionStatus, RenewalSource,
    RenewalValidator, SubscriptionStatus, SweepSettings, Validity,
};

async fn charge_in(h: &Harness, seeded: &mut common::Seeded, offset: Duration) {
    seeded.subscription.next_charge_scheduled_at = Some(start() + offset);
    h.store
        .apply(ChangeSet::new().with_subscription(seeded.subscription.clone()))
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_prescription_renewing_tomorrow_is_cancelled() {
    let h = Harness::new();
    let mut seeded = h.seed_active(two_step_schedule(), 3).await;
    seeded.prescription.end_date = Some(start() - Duration::days(1));
    h.store
        .apply(ChangeSet::new().with_prescription(seeded.prescription.clone()))
        .await
        .unwrap();
    charge_in(&h, &mut seeded, Duration::hours(24)).await;

    let report = h.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.cancelled, 1);
    assert_eq!(report.errors, 0);

    let calls = h.billing.calls.lock().clone();
    assert!(matches!(
        calls.as_slice(),
        [BillingCall::Cancel { external_id, .. }] if *external_id == seeded.subscription.external_id
    ));

    let subscription = h.subscription(seeded.subscription.id).await;
    assert_eq!(subscription.status, SubscriptionStatus::Cancelled);
    assert_eq!(subscription.cancelled_at, Some(start()));
    assert!(subscription.cancellation_reason.is_some());
    assert_eq!(
        h.prescription(seeded.prescription.id).await.status,
        PrescriptionStatus::Cancelled
    );
    let plan = h.store.clinical_plan(seeded.plan.id).await.unwrap().unwrap();
    assert_eq!(plan.status, ClinicalPlanStatus::Completed);
    assert!(h.notifier.events().contains(&(
        Recipient::Patient(seeded.subscription.patient_id),
        NotificationEvent::SubscriptionCancelled
    )));
}

#[tokio::test]
async fn out_of_refills_renewing_later_waits_and_alerts() {
    let h = Harness::new();
    let mut seeded = h.seed_active(two_step_schedule(), 0).await;
    charge_in(&h, &mut seeded, Duration::days(5)).await;

    let report = h.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.alerted, 1);
    assert_eq!(report.cancelled, 0);

    assert!(h.billing.calls.lock().is_empty());
    assert_eq!(h.notifier.events(), vec![(Recipient::CareTeam, NotificationEvent::RefillRequired)]);
    assert_eq!(
        h.subscription(seeded.subscription.id).await.status,
        SubscriptionStatus::Active
    );
}

#[tokio::test]
async fn alerts_repeat_each_pass_unless_deduplicated() {
    let repeating = Harness::new();
    let mut seeded = repeating.seed_active(two_step_schedule(), 0).await;
    charge_in(&repeating, &mut seeded, Duration::days(5)).await;
    repeating.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    repeating.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!(repeating.notifier.events().len(), 2);

    let deduped = Harness::with_settings(SweepSettings {
        dedupe_refill_alerts: true,
        ..SweepSettings::default()
    });
    let mut seeded = deduped.seed_active(two_step_schedule(), 0).await;
    charge_in(&deduped, &mut seeded, Duration::days(5)).await;
    let first = deduped.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    let second = deduped.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!((first.alerted, second.alerted), (1, 0));
    assert_eq!(deduped.notifier.events().len(), 1);
    assert_eq!(
        deduped.subscription(seeded.subscription.id).await.refill_alert_sent_for,
        seeded.subscription.next_charge_scheduled_at
    );
}

#[tokio::test]
async fn valid_renewals_are_left_alone() {
    let h = Harness::new();
    let mut seeded = h.seed_active(two_step_schedule(), 2).await;
    charge_in(&h, &mut seeded, Duration::hours(12)).await;

    let report = h.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!(report.validated, 1);
    assert!(h.billing.calls.lock().is_empty());
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn renewals_outside_window_are_not_examined() {
    let h = Harness::new();
    let mut seeded = h.seed_active(two_step_schedule(), 0).await;
    charge_in(&h, &mut seeded, Duration::days(10)).await;

    let report = h.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!(report.examined, 0);
}

#[tokio::test]
async fn failed_cancellation_is_retried_next_pass() {
    let h = Harness::new();
    let mut seeded = h.seed_active(two_step_schedule(), 0).await;
    charge_in(&h, &mut seeded, Duration::hours(6)).await;
    h.billing
        .cancel_outcomes
        .lock()
        .push_back(Err(GatewayError::Timeout { gateway: "billing" }));

    let first = h.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!(first.errors, 1);
    assert_eq!(first.cancelled, 0);
    assert_eq!(
        h.subscription(seeded.subscription.id).await.status,
        SubscriptionStatus::Active
    );

    let second = h.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!(second.cancelled, 1);
    assert_eq!(
        h.subscription(seeded.subscription.id).await.status,
        SubscriptionStatus::Cancelled
    );
}

#[tokio::test]
async fn gateway_listing_uses_provider_charge_dates() {
    let h = Harness::new();
    let seeded = h.seed_active(two_step_schedule(), 0).await;
    h.billing.renewals.lock().extend([
        ExternalSubscription {
            external_id: seeded.subscription.external_id.clone(),
            customer_id: "cus_1".into(),
            price_id: "price-low".into(),
            status: SubscriptionStatus::Active,
            next_charge_at: Some(start() + Duration::hours(10)),
        },
        ExternalSubscription {
            external_id: "sub_elsewhere".into(),
            customer_id: "cus_2".into(),
            price_id: "price-low".into(),
            status: SubscriptionStatus::Active,
            next_charge_at: Some(start() + Duration::hours(10)),
        },
    ]);

    let report = h.sweep.run(3, RenewalSource::Gateway).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.cancelled, 1);
    assert_eq!(h.billing.calls.lock().len(), 1);
}

/// Seeds the same mix of renewals into `h`: expired tomorrow, expired in
/// three days, out of refills in five days and valid in twelve hours.
async fn seed_renewal_mix(h: &Harness) -> Vec<common::Seeded> {
    let cases = [
        (3, Some(-1), Duration::hours(24)),
        (3, Some(-1), Duration::days(3)),
        (0, None, Duration::days(5)),
        (2, None, Duration::hours(12)),
    ];
    let mut seeded_all = Vec::new();
    for (refills, end_offset_days, charge) in cases {
        let mut seeded = h.seed_active(two_step_schedule(), refills).await;
        seeded.prescription.end_date = end_offset_days.map(|d| start() + Duration::days(d));
        h.store
            .apply(ChangeSet::new().with_prescription(seeded.prescription.clone()))
            .await
            .unwrap();
        charge_in(h, &mut seeded, charge).await;
        seeded_all.push(seeded);
    }
    seeded_all
}

/// Billing calls with each external id replaced by its position in `seeded`.
fn calls_by_case(h: &Harness, seeded: &[common::Seeded]) -> Vec<(usize, String)> {
    let mut calls: Vec<_> = h
        .billing
        .calls
        .lock()
        .iter()
        .map(|call| match call {
            BillingCall::Cancel { external_id, reason } => (external_id.clone(), format!("cancel: {reason}")),
            BillingCall::UpdatePlan { external_id, price_id } => (external_id.clone(), format!("plan: {price_id}")),
        })
        .map(|(external_id, call)| {
            let case = seeded
                .iter()
                .position(|s| s.subscription.external_id == external_id)
                .unwrap();
            (case, call)
        })
        .collect();
    calls.sort();
    calls
}

fn event_kinds(h: &Harness) -> Vec<String> {
    let mut kinds: Vec<_> = h.notifier.events().iter().map(|(_, event)| format!("{event:?}")).collect();
    kinds.sort();
    kinds
}

#[tokio::test]
async fn local_and_gateway_sources_decide_alike() {
    let local = Harness::new();
    let local_seeded = seed_renewal_mix(&local).await;

    let gateway = Harness::new();
    let gateway_seeded = seed_renewal_mix(&gateway).await;
    gateway
        .billing
        .renewals
        .lock()
        .extend(gateway_seeded.iter().map(|seeded| ExternalSubscription {
            external_id: seeded.subscription.external_id.clone(),
            customer_id: seeded.subscription.external_customer_id.clone(),
            price_id: seeded.subscription.billing_price_id.clone(),
            status: seeded.subscription.status,
            next_charge_at: seeded.subscription.next_charge_scheduled_at,
        }));

    let from_records = local.sweep.run(7, RenewalSource::LocalRecords).await.unwrap();
    let from_provider = gateway.sweep.run(7, RenewalSource::Gateway).await.unwrap();

    assert_eq!(from_records.examined, 4);
    assert_eq!(
        (
            from_records.examined,
            from_records.validated,
            from_records.deferred,
            from_records.cancelled,
            from_records.alerted,
            from_records.errors,
        ),
        (
            from_provider.examined,
            from_provider.validated,
            from_provider.deferred,
            from_provider.cancelled,
            from_provider.alerted,
            from_provider.errors,
        )
    );
    assert_eq!(from_provider.unmatched, 0);
    assert_eq!(calls_by_case(&local, &local_seeded), calls_by_case(&gateway, &gateway_seeded));
    assert_eq!(event_kinds(&local), event_kinds(&gateway));
}

#[tokio::test]
async fn expired_prescription_renewing_in_ten_days_waits() {
    let h = Harness::new();
    let mut seeded = h.seed_active(two_step_schedule(), 3).await;
    seeded.prescription.end_date = Some(start() - Duration::days(1));
    h.store
        .apply(ChangeSet::new().with_prescription(seeded.prescription.clone()))
        .await
        .unwrap();
    charge_in(&h, &mut seeded, Duration::days(10)).await;

    let report = h.sweep.run(14, RenewalSource::LocalRecords).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.cancelled, 0);
    assert_eq!(report.alerted, 0);
    assert!(h.billing.calls.lock().is_empty());
    assert_eq!(
        h.subscription(seeded.subscription.id).await.status,
        SubscriptionStatus::Active
    );
}

#[tokio::test]
async fn unlinked_subscription_is_always_cancelled() {
    let h = Harness::new();
    let validator = RenewalValidator::default();
    let seeded = h.seed_pending(two_step_schedule(), 1).await;

    let mut subscription = seeded.subscription;
    for charge in [None, Some(start() + Duration::days(30)), Some(start() + Duration::hours(1))] {
        subscription.next_charge_scheduled_at = charge;
        let decision = validator.classify(None, &subscription, start());
        assert_eq!(decision.validity, Validity::InvalidCancelNow);
    }
}
