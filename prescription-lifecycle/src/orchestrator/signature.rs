use serde_json::json;
use tracing::{debug, info};

use super::{DocumentSigned, LifecycleOrchestrator, SignatureOutcome};
use crate::error::{LifecycleError, Result};
use crate::gateways::{NotificationEvent, Recipient};
use crate::models::{ActivationState, Prescription, PrescriptionStatus, Subscription};
use crate::steps::LifecycleStep;
use crate::store::ChangeSet;

impl LifecycleOrchestrator {
    /// Activate the prescription behind a completed signature request.
    ///
    /// Activation and subscription linking commit before any follow-up step
    /// is enqueued. A repeat of an event that already activated the
    /// prescription is acknowledged as a duplicate; while activation is
    /// still processing, the repeat queues the follow-up steps again.
    pub async fn handle_document_signed(&self, event: DocumentSigned) -> Result<SignatureOutcome> {
        let found = self
            .ctx
            .store
            .prescription_by_signature_request(&event.signature_request_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("signature request", &event.signature_request_id))?;

        let guard = self.ctx.locks.lock(found.patient_id).await;
        let mut prescription = self.load_prescription(found.id).await?;

        if prescription.status == PrescriptionStatus::Active && prescription.is_signed() {
            drop(guard);
            debug!(prescription_id = %prescription.id, "Signature already processed");
            if prescription.activation == ActivationState::SignedProcessing {
                // Follow-ups may have been lost before they ran; the steps are idempotent.
                let replacement = prescription.is_replacement();
                let subscription = self
                    .ctx
                    .store
                    .subscription_for_prescription(prescription.id)
                    .await?
                    .ok_or_else(|| {
                        LifecycleError::DataIntegrity(format!(
                            "activated prescription {} has no linked subscription",
                            prescription.id
                        ))
                    })?;
                info!(prescription_id = %prescription.id, "Re-queueing activation follow-ups");
                self.enqueue_activation_steps(&prescription, &subscription, replacement)
                    .await?;
            }
            return Ok(SignatureOutcome::Duplicate {
                prescription_id: prescription.id,
            });
        }
        if prescription.status != PrescriptionStatus::PendingSignature {
            return Err(LifecycleError::InvalidTransition {
                id: prescription.id,
                from: prescription.status,
                to: PrescriptionStatus::Active,
            });
        }

        let now = self.now();
        prescription.status = PrescriptionStatus::Active;
        prescription.activation = ActivationState::SignedProcessing;
        prescription.signed_at = Some(event.signed_at);
        if event.document_id.is_some() {
            prescription.signature_document_id = event.document_id.clone();
        }
        if event.signed_document_ref.is_some() {
            prescription.signed_document_ref = event.signed_document_ref.clone();
        }
        prescription.updated_at = now;

        let replacement = prescription.is_replacement();
        let (subscription, changes) = if replacement {
            self.retire_previous(&prescription).await?
        } else {
            self.link_subscription(&prescription).await?
        };

        self.ctx
            .store
            .apply(changes.with_prescription(prescription.clone()))
            .await?;
        drop(guard);

        info!(
            prescription_id = %prescription.id,
            subscription_id = %subscription.id,
            replacement,
            "Prescription signed and activated"
        );

        self.ctx
            .notifier
            .notify(
                &Recipient::Patient(prescription.patient_id),
                NotificationEvent::PrescriptionActivated,
                json!({
                    "prescription_id": prescription.id,
                    "medication": prescription.medication_name,
                    "replacement": replacement,
                    "signed_at": event.signed_at,
                }),
            )
            .await;

        self.enqueue_activation_steps(&prescription, &subscription, replacement)
            .await?;

        Ok(SignatureOutcome::Activated {
            prescription_id: prescription.id,
            replacement,
        })
    }

    async fn enqueue_activation_steps(
        &self,
        prescription: &Prescription,
        subscription: &Subscription,
        replacement: bool,
    ) -> Result<()> {
        if replacement {
            self.enqueue(LifecycleStep::UpdateBillingPlan {
                subscription_id: subscription.id,
                step_index: 0,
            })
            .await?;
        }
        self.enqueue(LifecycleStep::SendClinicianLetter {
            prescription_id: prescription.id,
        })
        .await?;
        if !replacement {
            self.enqueue(LifecycleStep::CreateInitialOrder {
                prescription_id: prescription.id,
            })
            .await?;
        }
        Ok(())
    }

    /// Resolve the subscription through clinical plan and questionnaire and
    /// link it to `prescription` exactly once.
    async fn link_subscription(&self, prescription: &Prescription) -> Result<(Subscription, ChangeSet)> {
        let plan_id = prescription.clinical_plan_id.ok_or_else(|| {
            LifecycleError::DataIntegrity(format!(
                "prescription {} has no clinical plan",
                prescription.id
            ))
        })?;
        let plan = self
            .ctx
            .store
            .clinical_plan(plan_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("clinical plan", plan_id))?;
        let mut subscription = self
            .ctx
            .store
            .subscription_for_questionnaire(plan.questionnaire_submission_id)
            .await?
            .ok_or_else(|| {
                LifecycleError::DataIntegrity(format!(
                    "no subscription for questionnaire submission {}",
                    plan.questionnaire_submission_id
                ))
            })?;

        if let Some(existing) = self
            .ctx
            .store
            .subscription_for_prescription(prescription.id)
            .await?
        {
            if existing.id != subscription.id {
                return Err(LifecycleError::DataIntegrity(format!(
                    "prescription {} is already linked to subscription {}",
                    prescription.id, existing.id
                )));
            }
        }

        match subscription.prescription_id {
            Some(linked) if linked != prescription.id => Err(LifecycleError::AlreadyLinked {
                subscription_id: subscription.id,
                linked_to: linked,
            }),
            Some(_) => Ok((subscription, ChangeSet::new())),
            None => {
                subscription.prescription_id = Some(prescription.id);
                Ok((subscription.clone(), ChangeSet::new().with_subscription(subscription)))
            }
        }
    }

    /// A replacement is already linked; its predecessor is retired now.
    async fn retire_previous(&self, prescription: &Prescription) -> Result<(Subscription, ChangeSet)> {
        let subscription = self
            .ctx
            .store
            .subscription_for_prescription(prescription.id)
            .await?
            .ok_or_else(|| {
                LifecycleError::DataIntegrity(format!(
                    "replacement {} has no linked subscription",
                    prescription.id
                ))
            })?;

        let mut changes = ChangeSet::new();
        if let Some(previous_id) = prescription.replaces_prescription_id {
            let mut previous = self.load_prescription(previous_id).await?;
            if previous.replaced_by_prescription_id != Some(prescription.id) {
                return Err(LifecycleError::DataIntegrity(format!(
                    "prescription {previous_id} does not point back to replacement {}",
                    prescription.id
                )));
            }
            if previous.status == PrescriptionStatus::Active {
                previous.status = PrescriptionStatus::Replaced;
                previous.updated_at = self.now();
                changes = changes.with_prescription(previous);
            }
        }
        Ok((subscription, changes))
    }
}
