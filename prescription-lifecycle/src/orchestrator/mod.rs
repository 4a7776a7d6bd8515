//! Lifecycle orchestration: signature completion, recurring renewals,
//! replacement prescriptions and the step handlers behind them.
//!
//! Event handlers commit local state first and then enqueue
//! [`LifecycleStep`]s; each step performs its external call, then re-reads
//! and commits under the patient guard. Steps are idempotent so the queue
//! can deliver them more than once.

mod fulfilment;
mod renewal;
mod signature;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use workflow_engine::{JobHandler, JobSink, StepError};

use crate::context::LifecycleContext;
use crate::dose_schedule::{validate_schedule, DoseProgress};
use crate::error::{LifecycleError, Result};
use crate::gateways::SignerInfo;
use crate::models::{ActivationState, Prescription, PrescriptionStatus, Subscription};
use crate::steps::LifecycleStep;
use crate::store::ChangeSet;

/// The signature provider reports a completed signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSigned {
    pub signature_request_id: String,
    pub document_id: Option<String>,
    pub signed_document_ref: Option<String>,
    pub signed_at: DateTime<Utc>,
}

/// The billing provider reports a successful recurring charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringPaymentConfirmed {
    pub external_subscription_id: String,
    /// Payment or invoice id; the idempotency key for the renewal.
    pub external_payment_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignatureOutcome {
    Activated { prescription_id: Uuid, replacement: bool },
    Duplicate { prescription_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Queued { subscription_id: Uuid },
    Duplicate,
    /// The subscription is no longer active locally; nothing to fulfil.
    Ignored { subscription_id: Uuid },
}

pub struct LifecycleOrchestrator {
    ctx: LifecycleContext,
    steps: Arc<dyn JobSink<LifecycleStep>>,
    /// External payment ids whose renewal is between claim and commit.
    renewals_in_flight: DashSet<String>,
}

impl LifecycleOrchestrator {
    pub fn new(ctx: LifecycleContext, steps: Arc<dyn JobSink<LifecycleStep>>) -> Self {
        Self {
            ctx,
            steps,
            renewals_in_flight: DashSet::new(),
        }
    }

    pub fn context(&self) -> &LifecycleContext {
        &self.ctx
    }

    fn now(&self) -> DateTime<Utc> {
        self.ctx.clock.now()
    }

    async fn load_prescription(&self, id: Uuid) -> Result<Prescription> {
        self.ctx
            .store
            .prescription(id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("prescription", id))
    }

    async fn load_subscription(&self, id: Uuid) -> Result<Subscription> {
        self.ctx
            .store
            .subscription(id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("subscription", id))
    }

    async fn enqueue(&self, step: LifecycleStep) -> Result<()> {
        self.steps.enqueue(step).await?;
        Ok(())
    }

    /// Current and next dose for a prescription.
    pub async fn dose_progress(&self, prescription_id: Uuid) -> Result<DoseProgress> {
        let prescription = self.load_prescription(prescription_id).await?;
        Ok(DoseProgress::resolve(
            &prescription.dose_schedule,
            prescription.refills_remaining,
        ))
    }

    /// Send a pending prescription to its prescriber for signature and record
    /// the provider's request id.
    pub async fn request_signature(
        &self,
        prescription_id: Uuid,
        document: &[u8],
        signer: &SignerInfo,
    ) -> Result<String> {
        let prescription = self.load_prescription(prescription_id).await?;
        if prescription.status != PrescriptionStatus::PendingSignature {
            return Err(LifecycleError::InvalidTransition {
                id: prescription.id,
                from: prescription.status,
                to: PrescriptionStatus::PendingSignature,
            });
        }

        let request_id = self
            .ctx
            .signature
            .create_request(document, signer)
            .await?
            .ok_or(LifecycleError::ExternalRejected {
                operation: "signature request creation",
            })?;

        let _guard = self.ctx.locks.lock(prescription.patient_id).await;
        let mut prescription = self.load_prescription(prescription_id).await?;
        if let Some(existing) = prescription.signature_request_id.as_deref() {
            warn!(
                prescription_id = %prescription.id,
                previous_request = existing,
                "Replacing earlier signature request"
            );
        }
        prescription.signature_request_id = Some(request_id.clone());
        prescription.updated_at = self.now();
        self.ctx
            .store
            .apply(ChangeSet::new().with_prescription(prescription))
            .await?;

        info!(prescription_id = %prescription_id, signature_request_id = %request_id, "Signature requested");
        Ok(request_id)
    }

    /// Register `replacement` as the successor of an active prescription.
    ///
    /// Both inverse links are written, and the subscription is moved to the
    /// replacement, in one change set. The previous prescription stays active
    /// until the replacement is signed.
    pub async fn create_replacement(
        &self,
        previous_id: Uuid,
        mut replacement: Prescription,
    ) -> Result<Prescription> {
        validate_schedule(&replacement.dose_schedule)?;

        let previous = self.load_prescription(previous_id).await?;
        let _guard = self.ctx.locks.lock(previous.patient_id).await;
        let mut previous = self.load_prescription(previous_id).await?;

        if previous.status != PrescriptionStatus::Active {
            return Err(LifecycleError::ReplacementConflict(format!(
                "prescription {previous_id} is {}, only active prescriptions can be replaced",
                previous.status
            )));
        }
        if replacement.patient_id != previous.patient_id {
            return Err(LifecycleError::ReplacementConflict(
                "replacement belongs to a different patient".to_string(),
            ));
        }
        if let Some(successor_id) = previous.replaced_by_prescription_id {
            let successor = self.ctx.store.prescription(successor_id).await?;
            if successor.is_some_and(|s| !s.status.is_terminal()) {
                return Err(LifecycleError::ReplacementConflict(format!(
                    "prescription {previous_id} already has pending successor {successor_id}"
                )));
            }
        }

        let mut subscription = self
            .ctx
            .store
            .subscription_for_prescription(previous.id)
            .await?
            .ok_or_else(|| {
                LifecycleError::DataIntegrity(format!(
                    "active prescription {previous_id} has no subscription"
                ))
            })?;

        let now = self.now();
        replacement.status = PrescriptionStatus::PendingSignature;
        replacement.activation = ActivationState::AwaitingSignature;
        replacement.signed_at = None;
        replacement.replaces_prescription_id = Some(previous.id);
        replacement.replaced_by_prescription_id = None;
        replacement.renewals_processed = 0;
        replacement.clinical_plan_id = replacement.clinical_plan_id.or(previous.clinical_plan_id);
        replacement.updated_at = now;

        previous.replaced_by_prescription_id = Some(replacement.id);
        previous.updated_at = now;
        subscription.prescription_id = Some(replacement.id);

        self.ctx
            .store
            .apply(
                ChangeSet::new()
                    .with_prescription(previous)
                    .with_prescription(replacement.clone())
                    .with_subscription(subscription),
            )
            .await?;

        info!(
            previous_id = %previous_id,
            replacement_id = %replacement.id,
            "Replacement prescription created"
        );
        Ok(replacement)
    }

    async fn mark_activation_failed(&self, prescription_id: Uuid) -> Result<()> {
        let prescription = self.load_prescription(prescription_id).await?;
        let _guard = self.ctx.locks.lock(prescription.patient_id).await;
        let mut prescription = self.load_prescription(prescription_id).await?;
        if prescription.activation != ActivationState::SignedProcessing {
            return Ok(());
        }
        prescription.activation = ActivationState::Failed;
        prescription.updated_at = self.now();
        self.ctx
            .store
            .apply(ChangeSet::new().with_prescription(prescription))
            .await
    }

    /// Prescription whose activation depends on `step`, if any.
    async fn activation_subject(&self, step: &LifecycleStep) -> Option<Uuid> {
        match step {
            LifecycleStep::CreateInitialOrder { prescription_id }
            | LifecycleStep::AttachOrderLabel { prescription_id, .. }
            | LifecycleStep::AttachSignedDocument { prescription_id, .. } => Some(*prescription_id),
            LifecycleStep::UpdateBillingPlan {
                subscription_id, ..
            } => self
                .ctx
                .store
                .subscription(*subscription_id)
                .await
                .ok()
                .flatten()
                .and_then(|s| s.prescription_id),
            LifecycleStep::SendClinicianLetter { .. } | LifecycleStep::ProcessRenewal { .. } => None,
        }
    }
}

#[async_trait]
impl JobHandler<LifecycleStep> for LifecycleOrchestrator {
    async fn handle(&self, step: &LifecycleStep) -> std::result::Result<(), StepError> {
        let result = match step {
            LifecycleStep::CreateInitialOrder { prescription_id } => {
                self.create_initial_order(*prescription_id).await
            }
            LifecycleStep::AttachOrderLabel {
                prescription_id,
                order_id,
            } => self.attach_order_label(*prescription_id, order_id).await,
            LifecycleStep::AttachSignedDocument {
                prescription_id,
                order_id,
            } => self.attach_signed_document(*prescription_id, order_id).await,
            LifecycleStep::UpdateBillingPlan {
                subscription_id,
                step_index,
            } => self.update_billing_plan(*subscription_id, *step_index).await,
            LifecycleStep::SendClinicianLetter { prescription_id } => {
                self.send_clinician_letter(*prescription_id).await
            }
            LifecycleStep::ProcessRenewal {
                subscription_id,
                external_payment_id,
            } => self.process_renewal(*subscription_id, external_payment_id).await,
        };
        result.map_err(StepError::from)
    }

    async fn on_exhausted(&self, step: &LifecycleStep, failure: &StepError) {
        let Some(prescription_id) = self.activation_subject(step).await else {
            return;
        };
        if let Err(e) = self.mark_activation_failed(prescription_id).await {
            error!(
                prescription_id = %prescription_id,
                step = ?step,
                failure = %failure,
                error = %e,
                "Could not record failed activation"
            );
        }
    }
}
