//! Periodic renewal sweep.
//!
//! Pulls subscriptions renewing within a window, classifies each with the
//! [`RenewalValidator`] and acts on the result: cancels unbacked renewals
//! that are about to charge and asks the care team for refills. One
//! sequential pass; a failure on one subscription is counted and the pass
//! continues.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::LifecycleContext;
use crate::error::{LifecycleError, Result};
use crate::gateways::{ExternalSubscription, NotificationEvent, Recipient};
use crate::models::{ClinicalPlanStatus, Prescription, PrescriptionStatus, Subscription, SubscriptionStatus};
use crate::renewal::{RenewalDecision, RenewalValidator, Validity};
use crate::store::ChangeSet;

/// Where sweep candidates come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalSource {
    /// The local subscription mirror.
    #[default]
    LocalRecords,
    /// Each configured billing provider's upcoming-renewals listing.
    Gateway,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub subscription_id: Option<Uuid>,
    pub external_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub validated: usize,
    pub deferred: usize,
    pub cancelled: usize,
    pub alerted: usize,
    pub errors: usize,
    pub unmatched: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn record_failure(&mut self, subscription_id: Option<Uuid>, external_id: &str, error: &LifecycleError) {
        self.errors += 1;
        self.failures.push(SweepFailure {
            subscription_id,
            external_id: external_id.to_string(),
            error: error.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepSettings {
    pub validator: RenewalValidator,
    /// Alert at most once per charge date instead of on every pass.
    pub dedupe_refill_alerts: bool,
}

pub struct RenewalSweep {
    ctx: LifecycleContext,
    settings: SweepSettings,
}

impl RenewalSweep {
    pub fn new(ctx: LifecycleContext, settings: SweepSettings) -> Self {
        Self { ctx, settings }
    }

    /// Run one pass over subscriptions charging within `window_days`.
    pub async fn run(&self, window_days: u32, source: RenewalSource) -> Result<SweepReport> {
        let now = self.ctx.clock.now();
        let horizon = now + Duration::days(i64::from(window_days));
        let mut report = SweepReport::default();

        let candidates = match source {
            RenewalSource::LocalRecords => {
                self.ctx
                    .store
                    .subscriptions_renewing_between(now, horizon)
                    .await?
            }
            RenewalSource::Gateway => {
                self.gateway_candidates(window_days, now, horizon, &mut report)
                    .await
            }
        };

        info!(
            window_days,
            source = ?source,
            candidates = candidates.len(),
            "Renewal sweep started"
        );

        for subscription in candidates {
            self.evaluate(subscription, now, &mut report).await;
        }

        info!(
            examined = report.examined,
            validated = report.validated,
            deferred = report.deferred,
            cancelled = report.cancelled,
            alerted = report.alerted,
            errors = report.errors,
            unmatched = report.unmatched,
            "Renewal sweep finished"
        );
        Ok(report)
    }

    /// External renewal listings matched onto local subscriptions. The
    /// provider's status and charge date win over the local mirror.
    async fn gateway_candidates(
        &self,
        window_days: u32,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Vec<Subscription> {
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();

        for gateway in self.ctx.billing.gateways() {
            let provider = gateway.provider();
            let listed = match gateway.upcoming_renewals(window_days).await {
                Ok(listed) => listed,
                Err(e) => {
                    error!(provider = %provider, error = %e, "Could not list upcoming renewals");
                    report.record_failure(None, provider.as_str(), &LifecycleError::from(e));
                    continue;
                }
            };

            for mut external in listed {
                if external.next_charge_at.is_none() {
                    match gateway.subscription(&external.external_id).await {
                        Ok(Some(fresh)) => external = fresh,
                        Ok(None) => {}
                        Err(e) => {
                            warn!(external_id = %external.external_id, error = %e, "Could not refresh subscription");
                            report.record_failure(None, &external.external_id, &LifecycleError::from(e));
                            continue;
                        }
                    }
                }
                if !in_window(&external, now, horizon) {
                    continue;
                }

                match self.ctx.store.subscription_by_external_id(&external.external_id).await {
                    Ok(Some(mut local)) => {
                        if !seen.insert(local.id) {
                            continue;
                        }
                        local.status = external.status;
                        local.next_charge_scheduled_at = external.next_charge_at;
                        candidates.push(local);
                    }
                    Ok(None) => {
                        warn!(
                            provider = %provider,
                            external_id = %external.external_id,
                            "Upcoming renewal has no local subscription; leaving it alone"
                        );
                        report.unmatched += 1;
                    }
                    Err(e) => report.record_failure(None, &external.external_id, &e),
                }
            }
        }

        candidates.sort_by_key(|s| (s.next_charge_scheduled_at, s.id));
        candidates
    }

    async fn evaluate(&self, subscription: Subscription, now: DateTime<Utc>, report: &mut SweepReport) {
        report.examined += 1;

        let prescription = match self.linked_prescription(&subscription).await {
            Ok(prescription) => prescription,
            Err(e) => {
                error!(subscription_id = %subscription.id, error = %e, "Could not load linked prescription");
                report.record_failure(Some(subscription.id), &subscription.external_id, &e);
                return;
            }
        };

        let decision = self
            .settings
            .validator
            .classify(prescription.as_ref(), &subscription, now);

        match decision.validity {
            Validity::Valid => report.validated += 1,
            Validity::InvalidWait => {
                debug!(
                    subscription_id = %subscription.id,
                    reasons = %decision.reason_summary(),
                    "Invalid renewal not yet imminent"
                );
                report.deferred += 1;
            }
            Validity::InvalidCancelNow => match self.cancel(&subscription, &decision, now).await {
                Ok(()) => report.cancelled += 1,
                Err(e) => {
                    error!(
                        subscription_id = %subscription.id,
                        external_id = %subscription.external_id,
                        error = %e,
                        "Cancellation failed; subscription left active"
                    );
                    report.record_failure(Some(subscription.id), &subscription.external_id, &e);
                }
            },
        }

        if decision.needs_refill_alert {
            match self.alert_care_team(&subscription, prescription.as_ref(), now).await {
                Ok(true) => report.alerted += 1,
                Ok(false) => {}
                Err(e) => report.record_failure(Some(subscription.id), &subscription.external_id, &e),
            }
        }
    }

    async fn linked_prescription(&self, subscription: &Subscription) -> Result<Option<Prescription>> {
        let Some(prescription_id) = subscription.prescription_id else {
            return Ok(None);
        };
        match self.ctx.store.prescription(prescription_id).await? {
            Some(prescription) => Ok(Some(prescription)),
            None => Err(LifecycleError::DataIntegrity(format!(
                "subscription {} links missing prescription {prescription_id}",
                subscription.id
            ))),
        }
    }

    /// Cancel with the provider first; only a confirmed cancellation is
    /// mirrored locally, together with the prescription and plan cascade.
    async fn cancel(&self, subscription: &Subscription, decision: &RenewalDecision, now: DateTime<Utc>) -> Result<()> {
        let reason = decision.reason_summary();
        let confirmed = self
            .ctx
            .billing
            .gateway(subscription.provider)?
            .cancel(&subscription.external_id, &reason)
            .await?;
        if !confirmed {
            return Err(LifecycleError::ExternalRejected {
                operation: "subscription cancellation",
            });
        }

        let guard = self.ctx.locks.lock(subscription.patient_id).await;
        let mut current = self
            .ctx
            .store
            .subscription(subscription.id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("subscription", subscription.id))?;
        current.status = SubscriptionStatus::Cancelled;
        current.cancelled_at = Some(now);
        current.cancellation_reason = Some(reason.clone());

        let mut changes = ChangeSet::new();
        if let Some(prescription_id) = current.prescription_id {
            if let Some(mut prescription) = self.ctx.store.prescription(prescription_id).await? {
                if let Some(plan_id) = prescription.clinical_plan_id {
                    if let Some(mut plan) = self.ctx.store.clinical_plan(plan_id).await? {
                        plan.status = ClinicalPlanStatus::Completed;
                        changes = changes.with_clinical_plan(plan);
                    }
                }
                if !prescription.status.is_terminal() {
                    prescription.status = PrescriptionStatus::Cancelled;
                    prescription.updated_at = now;
                    changes = changes.with_prescription(prescription);
                }
            }
        }
        self.ctx.store.apply(changes.with_subscription(current)).await?;
        drop(guard);

        info!(
            subscription_id = %subscription.id,
            external_id = %subscription.external_id,
            reason = %reason,
            "Subscription cancelled"
        );

        self.ctx
            .notifier
            .notify(
                &Recipient::Patient(subscription.patient_id),
                NotificationEvent::SubscriptionCancelled,
                json!({
                    "subscription_id": subscription.id,
                    "reason": reason,
                    "reasons": decision.reasons,
                }),
            )
            .await;
        Ok(())
    }

    /// Returns whether an alert went out.
    async fn alert_care_team(
        &self,
        subscription: &Subscription,
        prescription: Option<&Prescription>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let charge_at = subscription.next_charge_scheduled_at;
        if self.settings.dedupe_refill_alerts && charge_at.is_some() && subscription.refill_alert_sent_for == charge_at {
            debug!(subscription_id = %subscription.id, "Refill alert already sent for this charge");
            return Ok(false);
        }

        self.ctx
            .notifier
            .notify(
                &Recipient::CareTeam,
                NotificationEvent::RefillRequired,
                json!({
                    "subscription_id": subscription.id,
                    "patient_id": subscription.patient_id,
                    "prescription_id": prescription.map(|p| p.id),
                    "medication": prescription.map(|p| p.medication_name.as_str()),
                    "next_charge_at": charge_at,
                    "alerted_at": now,
                }),
            )
            .await;

        if self.settings.dedupe_refill_alerts {
            let _guard = self.ctx.locks.lock(subscription.patient_id).await;
            if let Some(mut current) = self.ctx.store.subscription(subscription.id).await? {
                current.refill_alert_sent_for = charge_at;
                self.ctx.store.apply(ChangeSet::new().with_subscription(current)).await?;
            }
        }
        Ok(true)
    }
}

fn in_window(external: &ExternalSubscription, now: DateTime<Utc>, horizon: DateTime<Utc>) -> bool {
    external.status == SubscriptionStatus::Active
        && external
            .next_charge_at
            .is_some_and(|at| at >= now && at <= horizon)
}
