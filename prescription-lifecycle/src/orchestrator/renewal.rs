use dashmap::DashSet;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{LifecycleOrchestrator, PaymentOutcome, RecurringPaymentConfirmed};
use crate::dose_schedule::dispensing_step;
use crate::error::{LifecycleError, Result};
use crate::models::{PrescriptionStatus, ProcessedPayment};
use crate::steps::LifecycleStep;
use crate::store::ChangeSet;

impl LifecycleOrchestrator {
    /// Queue the renewal bookkeeping for a confirmed recurring payment.
    ///
    /// Payments already processed are acknowledged as duplicates.
    pub async fn handle_recurring_payment(&self, event: RecurringPaymentConfirmed) -> Result<PaymentOutcome> {
        if self
            .ctx
            .store
            .processed_payment(&event.external_payment_id)
            .await?
            .is_some()
        {
            debug!(payment_id = %event.external_payment_id, "Payment already processed");
            return Ok(PaymentOutcome::Duplicate);
        }

        let subscription = self
            .ctx
            .store
            .subscription_by_external_id(&event.external_subscription_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("subscription", &event.external_subscription_id))?;

        if !subscription.is_active() {
            warn!(
                subscription_id = %subscription.id,
                status = %subscription.status,
                payment_id = %event.external_payment_id,
                "Payment received for inactive subscription; not fulfilling"
            );
            return Ok(PaymentOutcome::Ignored {
                subscription_id: subscription.id,
            });
        }

        self.enqueue(LifecycleStep::ProcessRenewal {
            subscription_id: subscription.id,
            external_payment_id: event.external_payment_id,
        })
        .await?;
        Ok(PaymentOutcome::Queued {
            subscription_id: subscription.id,
        })
    }

    /// Consume a refill, reorder and record the payment.
    ///
    /// The first payment after a replacement took over does not consume a
    /// refill; it pays for the replacement's opening dose.
    pub(super) async fn process_renewal(&self, subscription_id: Uuid, external_payment_id: &str) -> Result<()> {
        if self.ctx.store.processed_payment(external_payment_id).await?.is_some() {
            debug!(payment_id = external_payment_id, "Renewal already processed");
            return Ok(());
        }

        // Held until the processed payment is committed or the attempt fails.
        let _claim = PaymentClaim::acquire(&self.renewals_in_flight, external_payment_id).ok_or_else(|| {
            LifecycleError::Conflict(format!("renewal for payment {external_payment_id} is already in progress"))
        })?;
        if self.ctx.store.processed_payment(external_payment_id).await?.is_some() {
            debug!(payment_id = external_payment_id, "Renewal already processed");
            return Ok(());
        }

        let subscription = self.load_subscription(subscription_id).await?;
        let prescription_id = subscription.prescription_id.ok_or_else(|| {
            LifecycleError::DataIntegrity(format!(
                "subscription {subscription_id} renewed without a linked prescription"
            ))
        })?;
        let prescription = self.load_prescription(prescription_id).await?;

        let decrement = !(prescription.is_replacement() && prescription.renewals_processed == 0);
        let refills_after = if decrement {
            (prescription.refills_remaining - 1).max(0)
        } else {
            prescription.refills_remaining
        };

        let index = dispensing_step(&prescription.dose_schedule, refills_after).ok_or_else(|| {
            LifecycleError::DataIntegrity(format!("prescription {prescription_id} has an empty dose schedule"))
        })?;
        let step = self.dose_step(&prescription, index)?;
        let metadata = json!({
            "kind": "renewal",
            "prescription_id": prescription.id,
            "subscription_id": subscription.external_id,
            "payment_id": external_payment_id,
        });
        let order_id = self
            .place_order(&prescription, &subscription, step, metadata, "renewal order creation")
            .await?;

        let guard = self.ctx.locks.lock(subscription.patient_id).await;
        if self.ctx.store.processed_payment(external_payment_id).await?.is_some() {
            warn!(
                payment_id = external_payment_id,
                order_id = %order_id,
                "Renewal was recorded by another process; extra order needs review"
            );
            return Ok(());
        }

        let now = self.now();
        let mut prescription = self.load_prescription(prescription_id).await?;
        let decrement = !(prescription.is_replacement() && prescription.renewals_processed == 0);
        if decrement {
            prescription.refills_remaining = (prescription.refills_remaining - 1).max(0);
        }
        prescription.renewals_processed += 1;
        if prescription.refills_remaining == 0
            && prescription.status == PrescriptionStatus::Active
            && prescription.end_date.is_some_and(|end| end < now)
        {
            prescription.status = PrescriptionStatus::Completed;
        }
        prescription.updated_at = now;

        let payment = ProcessedPayment {
            external_payment_id: external_payment_id.to_string(),
            subscription_id,
            prescription_id,
            order_id: order_id.clone(),
            refill_decremented: decrement,
            processed_at: now,
        };
        self.ctx
            .store
            .apply(
                ChangeSet::new()
                    .with_prescription(prescription.clone())
                    .with_processed_payment(payment),
            )
            .await?;
        drop(guard);

        info!(
            prescription_id = %prescription_id,
            payment_id = external_payment_id,
            order_id = %order_id,
            refills_remaining = prescription.refills_remaining,
            refill_decremented = decrement,
            "Renewal processed"
        );

        let subscription = self.load_subscription(subscription_id).await?;
        self.schedule_next_dose(&prescription, &subscription).await
    }
}

/// Exclusive right to process one external payment in this process.
struct PaymentClaim<'a> {
    claims: &'a DashSet<String>,
    payment_id: String,
}

impl<'a> PaymentClaim<'a> {
    fn acquire(claims: &'a DashSet<String>, payment_id: &str) -> Option<Self> {
        claims.insert(payment_id.to_string()).then(|| Self {
            claims,
            payment_id: payment_id.to_string(),
        })
    }
}

impl Drop for PaymentClaim<'_> {
    fn drop(&mut self) {
        self.claims.remove(&self.payment_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_can_be_claimed_once_until_released() {
        let claims = DashSet::new();
        let first = PaymentClaim::acquire(&claims, "inv_1");
        assert!(first.is_some());
        assert!(PaymentClaim::acquire(&claims, "inv_1").is_none());
        assert!(PaymentClaim::acquire(&claims, "inv_2").is_some());

        drop(first);
        assert!(PaymentClaim::acquire(&claims, "inv_1").is_some());
        assert!(claims.is_empty());
    }
}
