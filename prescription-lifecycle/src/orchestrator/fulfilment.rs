use base64::Engine as _;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::LifecycleOrchestrator;
use crate::dose_schedule::{dispensing_step, next_step, requires_billing_update};
use crate::error::{LifecycleError, Result};
use crate::gateways::{CustomerRef, NotificationEvent, OrderLineItem, Recipient};
use crate::models::{ActivationState, DoseStep, Prescription, Subscription, SubscriptionStatus};
use crate::steps::LifecycleStep;
use crate::store::ChangeSet;

fn line_item(prescription: &Prescription, step: &DoseStep) -> OrderLineItem {
    OrderLineItem {
        product_variant_id: step.product_variant_id.clone(),
        quantity: 1,
        title: format!("{} {}", prescription.medication_name, step.dose),
    }
}

fn customer(subscription: &Subscription) -> CustomerRef {
    CustomerRef {
        patient_id: subscription.patient_id,
        external_customer_id: subscription.external_customer_id.clone(),
    }
}

/// Label payload attached to an order for the dispensing pharmacy.
fn label_payload(prescription: &Prescription) -> serde_json::Value {
    let dose = dispensing_step(&prescription.dose_schedule, prescription.refills_remaining)
        .and_then(|index| prescription.dose_schedule.get(index))
        .map(|step| step.dose.clone());
    json!({
        "prescription_id": prescription.id,
        "patient_id": prescription.patient_id,
        "prescriber_id": prescription.prescriber_id,
        "medication": prescription.medication_name,
        "dose": dose,
        "refills_remaining": prescription.refills_remaining.max(0),
        "signed_at": prescription.signed_at,
        "expires_at": prescription.end_date,
    })
}

impl LifecycleOrchestrator {
    pub(super) fn dose_step<'a>(
        &self,
        prescription: &'a Prescription,
        index: usize,
    ) -> Result<&'a DoseStep> {
        prescription.dose_schedule.get(index).ok_or_else(|| {
            LifecycleError::DataIntegrity(format!(
                "prescription {} has no dose step {index}",
                prescription.id
            ))
        })
    }

    pub(super) async fn place_order(
        &self,
        prescription: &Prescription,
        subscription: &Subscription,
        step: &DoseStep,
        metadata: serde_json::Value,
        operation: &'static str,
    ) -> Result<String> {
        self.ctx
            .commerce
            .create_order(&line_item(prescription, step), &customer(subscription), &metadata)
            .await?
            .ok_or(LifecycleError::ExternalRejected { operation })
    }

    /// Enqueue a billing update for the step after the current one when its
    /// price differs from what the subscription is charged.
    pub(super) async fn schedule_next_dose(
        &self,
        prescription: &Prescription,
        subscription: &Subscription,
    ) -> Result<()> {
        let Some(index) = next_step(&prescription.dose_schedule, prescription.refills_remaining) else {
            debug!(prescription_id = %prescription.id, "No further dose step");
            return Ok(());
        };
        let step = self.dose_step(prescription, index)?;
        if !requires_billing_update(step, &subscription.billing_price_id) {
            debug!(prescription_id = %prescription.id, step_index = index, "Next dose priced the same");
            return Ok(());
        }
        self.enqueue(LifecycleStep::UpdateBillingPlan {
            subscription_id: subscription.id,
            step_index: index,
        })
        .await
    }

    pub(super) async fn create_initial_order(&self, prescription_id: Uuid) -> Result<()> {
        let prescription = self.load_prescription(prescription_id).await?;
        let subscription = self
            .ctx
            .store
            .subscription_for_prescription(prescription_id)
            .await?
            .ok_or_else(|| {
                LifecycleError::DataIntegrity(format!(
                    "prescription {prescription_id} has no linked subscription"
                ))
            })?;

        let order_id = match subscription.initial_order_id.clone() {
            Some(order_id) => {
                debug!(prescription_id = %prescription_id, order_id = %order_id, "Initial order already recorded");
                order_id
            }
            None => {
                let step = self.dose_step(&prescription, 0)?;
                let metadata = json!({
                    "kind": "initial",
                    "prescription_id": prescription.id,
                    "subscription_id": subscription.external_id,
                });
                let order_id = self
                    .place_order(&prescription, &subscription, step, metadata, "initial order creation")
                    .await?;
                self.record_initial_order(&prescription, subscription.id, &order_id)
                    .await?
            }
        };

        self.enqueue(LifecycleStep::AttachOrderLabel {
            prescription_id,
            order_id: order_id.clone(),
        })
        .await?;
        self.enqueue(LifecycleStep::AttachSignedDocument {
            prescription_id,
            order_id,
        })
        .await?;

        let prescription = self.load_prescription(prescription_id).await?;
        let subscription = self.load_subscription(subscription.id).await?;
        self.schedule_next_dose(&prescription, &subscription).await
    }

    /// Persist the initial order id and mark the activation complete. Returns
    /// the order id that ended up recorded.
    async fn record_initial_order(
        &self,
        prescription: &Prescription,
        subscription_id: Uuid,
        order_id: &str,
    ) -> Result<String> {
        let _guard = self.ctx.locks.lock(prescription.patient_id).await;
        let mut subscription = self.load_subscription(subscription_id).await?;
        if let Some(recorded) = subscription.initial_order_id {
            error!(
                prescription_id = %prescription.id,
                recorded_order = %recorded,
                duplicate_order = %order_id,
                "Initial order was created twice; keeping the recorded one"
            );
            return Ok(recorded);
        }

        let mut prescription = self.load_prescription(prescription.id).await?;
        subscription.initial_order_id = Some(order_id.to_string());
        if prescription.activation == ActivationState::SignedProcessing {
            prescription.activation = ActivationState::Activated;
        }
        prescription.updated_at = self.now();
        self.ctx
            .store
            .apply(
                ChangeSet::new()
                    .with_subscription(subscription)
                    .with_prescription(prescription.clone()),
            )
            .await?;

        info!(prescription_id = %prescription.id, order_id = %order_id, "Initial order recorded");
        Ok(order_id.to_string())
    }

    pub(super) async fn attach_order_label(&self, prescription_id: Uuid, order_id: &str) -> Result<()> {
        let prescription = self.load_prescription(prescription_id).await?;
        let confirmed = self
            .ctx
            .commerce
            .attach_metadata(order_id, &label_payload(&prescription))
            .await?;
        if !confirmed {
            return Err(LifecycleError::ExternalRejected {
                operation: "label attachment",
            });
        }
        debug!(prescription_id = %prescription_id, order_id, "Label attached");
        Ok(())
    }

    pub(super) async fn attach_signed_document(&self, prescription_id: Uuid, order_id: &str) -> Result<()> {
        let prescription = self.load_prescription(prescription_id).await?;
        let (Some(request_id), Some(document_id)) = (
            prescription.signature_request_id.as_deref(),
            prescription.signature_document_id.as_deref(),
        ) else {
            return Err(LifecycleError::DataIntegrity(format!(
                "prescription {prescription_id} has no signed document reference"
            )));
        };

        let document = self
            .ctx
            .signature
            .fetch_signed_document(request_id, document_id)
            .await?
            .ok_or(LifecycleError::ExternalRejected {
                operation: "signed document download",
            })?;

        let label = format!("prescription-{prescription_id}.pdf");
        let confirmed = self
            .ctx
            .commerce
            .attach_document(order_id, &document, &label)
            .await?;
        if !confirmed {
            return Err(LifecycleError::ExternalRejected {
                operation: "signed document attachment",
            });
        }
        debug!(prescription_id = %prescription_id, order_id, "Signed document attached");
        Ok(())
    }

    pub(super) async fn update_billing_plan(&self, subscription_id: Uuid, step_index: usize) -> Result<()> {
        let subscription = self.load_subscription(subscription_id).await?;
        if subscription.status == SubscriptionStatus::Cancelled {
            info!(subscription_id = %subscription_id, "Subscription cancelled; billing update skipped");
            return Ok(());
        }
        let prescription_id = subscription.prescription_id.ok_or_else(|| {
            LifecycleError::DataIntegrity(format!(
                "subscription {subscription_id} has no linked prescription"
            ))
        })?;
        let prescription = self.load_prescription(prescription_id).await?;
        let step = self.dose_step(&prescription, step_index)?.clone();

        if requires_billing_update(&step, &subscription.billing_price_id) {
            let confirmed = self
                .ctx
                .billing
                .gateway(subscription.provider)?
                .update_plan(&subscription.external_id, &step.billing_price_id)
                .await?;
            if !confirmed {
                return Err(LifecycleError::ExternalRejected {
                    operation: "billing plan update",
                });
            }
        }

        let _guard = self.ctx.locks.lock(subscription.patient_id).await;
        let mut subscription = self.load_subscription(subscription_id).await?;
        let mut prescription = self.load_prescription(prescription_id).await?;
        let mut changes = ChangeSet::new();

        if subscription.billing_price_id != step.billing_price_id {
            subscription.billing_price_id = step.billing_price_id.clone();
            changes = changes.with_subscription(subscription);
        }
        if prescription.is_replacement()
            && step_index == 0
            && prescription.activation == ActivationState::SignedProcessing
        {
            prescription.activation = ActivationState::Activated;
            prescription.updated_at = self.now();
            changes = changes.with_prescription(prescription);
        }
        if !changes.is_empty() {
            self.ctx.store.apply(changes).await?;
        }

        info!(
            subscription_id = %subscription_id,
            step_index,
            price_id = %step.billing_price_id,
            "Billing aligned with dose step"
        );
        Ok(())
    }

    pub(super) async fn send_clinician_letter(&self, prescription_id: Uuid) -> Result<()> {
        let prescription = self.load_prescription(prescription_id).await?;
        let letter = self.ctx.letters.render_clinician_letter(&prescription).await?;
        self.ctx
            .notifier
            .notify(
                &Recipient::Clinician(prescription.prescriber_id),
                NotificationEvent::ClinicianLetter,
                json!({
                    "prescription_id": prescription.id,
                    "patient_id": prescription.patient_id,
                    "medication": prescription.medication_name,
                    "letter_pdf_base64": base64::engine::general_purpose::STANDARD.encode(&letter),
                }),
            )
            .await;
        Ok(())
    }
}
