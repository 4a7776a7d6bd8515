//! Named, independently retryable side-effect steps.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use workflow_engine::Job;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum LifecycleStep {
    /// First commerce order for a newly activated (non-replacement) prescription.
    CreateInitialOrder { prescription_id: Uuid },
    /// Pharmacy label payload on an order.
    AttachOrderLabel { prescription_id: Uuid, order_id: String },
    /// Signed prescription document on an order.
    AttachSignedDocument { prescription_id: Uuid, order_id: String },
    /// Move the subscription's billing onto a schedule step's price.
    UpdateBillingPlan { subscription_id: Uuid, step_index: usize },
    SendClinicianLetter { prescription_id: Uuid },
    /// Bookkeeping and reorder for a confirmed recurring payment.
    ProcessRenewal {
        subscription_id: Uuid,
        external_payment_id: String,
    },
}

impl Job for LifecycleStep {
    fn kind(&self) -> &'static str {
        match self {
            LifecycleStep::CreateInitialOrder { .. } => "create_initial_order",
            LifecycleStep::AttachOrderLabel { .. } => "attach_order_label",
            LifecycleStep::AttachSignedDocument { .. } => "attach_signed_document",
            LifecycleStep::UpdateBillingPlan { .. } => "update_billing_plan",
            LifecycleStep::SendClinicianLetter { .. } => "send_clinician_letter",
            LifecycleStep::ProcessRenewal { .. } => "process_renewal",
        }
    }

    fn dedupe_key(&self) -> String {
        match self {
            LifecycleStep::CreateInitialOrder { prescription_id }
            | LifecycleStep::SendClinicianLetter { prescription_id } => {
                format!("{}:{prescription_id}", self.kind())
            }
            LifecycleStep::AttachOrderLabel { order_id, .. }
            | LifecycleStep::AttachSignedDocument { order_id, .. } => {
                format!("{}:{order_id}", self.kind())
            }
            LifecycleStep::UpdateBillingPlan {
                subscription_id,
                step_index,
            } => format!("{}:{subscription_id}:{step_index}", self.kind()),
            LifecycleStep::ProcessRenewal {
                external_payment_id, ..
            } => format!("{}:{external_payment_id}", self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keys_separate_step_kinds() {
        let id = Uuid::new_v4();
        let order = LifecycleStep::CreateInitialOrder { prescription_id: id };
        let letter = LifecycleStep::SendClinicianLetter { prescription_id: id };
        assert_ne!(order.dedupe_key(), letter.dedupe_key());
    }

    #[test]
    fn steps_serialise_with_a_tag() {
        let step = LifecycleStep::UpdateBillingPlan {
            subscription_id: Uuid::nil(),
            step_index: 1,
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["step"], "update_billing_plan");
        assert_eq!(json["step_index"], 1);
    }
}
