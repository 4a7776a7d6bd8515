//! Recording fakes and a harness wiring them to the orchestrator.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use prescription_lifecycle::gateways::{
    BillingGateway, BillingRouter, CommerceGateway, CustomerRef, ExternalSubscription, LetterRenderer,
    NotificationDispatcher, NotificationEvent, OrderLineItem, Recipient, SignatureGateway, SignerInfo,
};
use prescription_lifecycle::{
    ActivationState, BillingProvider, ChangeSet, ClinicalPlan, ClinicalPlanStatus, DoseStep, GatewayError,
    GatewayResult, InMemoryLifecycleStore, LifecycleContext, LifecycleOrchestrator, LifecycleStep,
    LifecycleStore, PatientLocks, Prescription, PrescriptionStatus, RenewalSweep, Subscription,
    SubscriptionStatus, SweepSettings,
};
use workflow_engine::{ManualClock, RetryPolicy, TaskQueue};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum BillingCall {
    Cancel { external_id: String, reason: String },
    UpdatePlan { external_id: String, price_id: String },
}

pub struct RecordingBilling {
    provider: BillingProvider,
    pub calls: Mutex<Vec<BillingCall>>,
    pub cancel_outcomes: Mutex<VecDeque<GatewayResult<bool>>>,
    pub renewals: Mutex<Vec<ExternalSubscription>>,
}

impl RecordingBilling {
    pub fn new(provider: BillingProvider) -> Self {
        Self {
            provider,
            calls: Mutex::new(Vec::new()),
            cancel_outcomes: Mutex::new(VecDeque::new()),
            renewals: Mutex::new(Vec::new()),
        }
    }

    pub fn price_updates(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BillingCall::UpdatePlan { price_id, .. } => Some(price_id.clone()),
                BillingCall::Cancel { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl BillingGateway for RecordingBilling {
    fn provider(&self) -> BillingProvider {
        self.provider
    }

    async fn cancel(&self, external_id: &str, reason: &str) -> GatewayResult<bool> {
        self.calls.lock().push(BillingCall::Cancel {
            external_id: external_id.to_string(),
            reason: reason.to_string(),
        });
        self.cancel_outcomes.lock().pop_front().unwrap_or(Ok(true))
    }

    async fn update_plan(&self, external_id: &str, price_id: &str) -> GatewayResult<bool> {
        self.calls.lock().push(BillingCall::UpdatePlan {
            external_id: external_id.to_string(),
            price_id: price_id.to_string(),
        });
        Ok(true)
    }

    async fn upcoming_renewals(&self, _days_ahead: u32) -> GatewayResult<Vec<ExternalSubscription>> {
        Ok(self.renewals.lock().clone())
    }

    async fn subscription(&self, external_id: &str) -> GatewayResult<Option<ExternalSubscription>> {
        Ok(self
            .renewals
            .lock()
            .iter()
            .find(|s| s.external_id == external_id)
            .cloned())
    }
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: String,
    pub line_item: OrderLineItem,
    pub customer: CustomerRef,
    pub metadata: Value,
}

#[derive(Default)]
pub struct RecordingCommerce {
    pub orders: Mutex<Vec<PlacedOrder>>,
    pub metadata: Mutex<Vec<(String, Value)>>,
    pub documents: Mutex<Vec<(String, Vec<u8>, String)>>,
    /// Number of upcoming `create_order` calls that time out.
    pub failing_orders: AtomicU32,
    /// Yield to the scheduler before confirming an order.
    pub slow_orders: AtomicBool,
    counter: AtomicU32,
}

#[async_trait]
impl CommerceGateway for RecordingCommerce {
    async fn create_order(
        &self,
        line_item: &OrderLineItem,
        customer: &CustomerRef,
        metadata: &Value,
    ) -> GatewayResult<Option<String>> {
        let failing = self
            .failing_orders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GatewayError::Timeout { gateway: "commerce" });
        }
        if self.slow_orders.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let order_id = format!("order_{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.orders.lock().push(PlacedOrder {
            order_id: order_id.clone(),
            line_item: line_item.clone(),
            customer: customer.clone(),
            metadata: metadata.clone(),
        });
        Ok(Some(order_id))
    }

    async fn attach_metadata(&self, order_id: &str, payload: &Value) -> GatewayResult<bool> {
        self.metadata.lock().push((order_id.to_string(), payload.clone()));
        Ok(true)
    }

    async fn attach_document(&self, order_id: &str, file: &[u8], label: &str) -> GatewayResult<bool> {
        self.documents
            .lock()
            .push((order_id.to_string(), file.to_vec(), label.to_string()));
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingSignature {
    pub requests: Mutex<Vec<SignerInfo>>,
}

#[async_trait]
impl SignatureGateway for RecordingSignature {
    async fn create_request(&self, _document: &[u8], signer: &SignerInfo) -> GatewayResult<Option<String>> {
        let mut requests = self.requests.lock();
        requests.push(signer.clone());
        Ok(Some(format!("sig_{}", requests.len())))
    }

    async fn fetch_signed_document(&self, request_id: &str, document_id: &str) -> GatewayResult<Option<Vec<u8>>> {
        Ok(Some(format!("%PDF {request_id}/{document_id}").into_bytes()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Recipient, NotificationEvent, Value)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(Recipient, NotificationEvent)> {
        self.sent.lock().iter().map(|(r, e, _)| (*r, *e)).collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify(&self, recipient: &Recipient, event: NotificationEvent, payload: Value) {
        self.sent.lock().push((*recipient, event, payload));
    }
}

#[derive(Default)]
pub struct FakeLetters {
    pub broken: AtomicBool,
}

#[async_trait]
impl LetterRenderer for FakeLetters {
    async fn render_clinician_letter(&self, prescription: &Prescription) -> GatewayResult<Vec<u8>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                gateway: "letters",
                status: 500,
                message: "template engine down".into(),
            });
        }
        Ok(format!("letter for {}", prescription.id).into_bytes())
    }
}

pub fn two_step_schedule() -> Vec<DoseStep> {
    vec![
        DoseStep {
            refill_number: 0,
            dose: "2.5mg".into(),
            billing_price_id: "price-low".into(),
            product_variant_id: "variant-low".into(),
        },
        DoseStep {
            refill_number: 1,
            dose: "5mg".into(),
            billing_price_id: "price-high".into(),
            product_variant_id: "variant-high".into(),
        },
    ]
}

/// The records created by [`Harness::seed_pending`].
#[derive(Debug, Clone)]
pub struct Seeded {
    pub prescription: Prescription,
    pub subscription: Subscription,
    pub plan: ClinicalPlan,
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryLifecycleStore>,
    pub billing: Arc<RecordingBilling>,
    pub commerce: Arc<RecordingCommerce>,
    pub signature: Arc<RecordingSignature>,
    pub notifier: Arc<RecordingNotifier>,
    pub letters: Arc<FakeLetters>,
    pub queue: Arc<TaskQueue<LifecycleStep>>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub sweep: RenewalSweep,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SweepSettings::default())
    }

    pub fn with_settings(settings: SweepSettings) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(InMemoryLifecycleStore::new());
        let billing = Arc::new(RecordingBilling::new(BillingProvider::PlanBased));
        let commerce = Arc::new(RecordingCommerce::default());
        let signature = Arc::new(RecordingSignature::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let letters = Arc::new(FakeLetters::default());
        let queue = Arc::new(TaskQueue::new(RetryPolicy::default(), clock.clone()));

        let ctx = LifecycleContext {
            store: store.clone(),
            billing: BillingRouter::new().with_gateway(billing.clone()),
            commerce: commerce.clone(),
            signature: signature.clone(),
            notifier: notifier.clone(),
            letters: letters.clone(),
            clock: clock.clone(),
            locks: Arc::new(PatientLocks::new()),
        };
        let orchestrator = Arc::new(LifecycleOrchestrator::new(ctx.clone(), queue.clone()));
        let sweep = RenewalSweep::new(ctx, settings);

        Self {
            clock,
            store,
            billing,
            commerce,
            signature,
            notifier,
            letters,
            queue,
            orchestrator,
            sweep,
        }
    }

    /// Fresh queue and orchestrator over the same records and fakes, as
    /// after a process restart. Steps queued before are gone.
    pub fn restart(&mut self) {
        self.queue = Arc::new(TaskQueue::new(RetryPolicy::default(), self.clock.clone()));
        let ctx = LifecycleContext {
            store: self.store.clone(),
            billing: BillingRouter::new().with_gateway(self.billing.clone()),
            commerce: self.commerce.clone(),
            signature: self.signature.clone(),
            notifier: self.notifier.clone(),
            letters: self.letters.clone(),
            clock: self.clock.clone(),
            locks: Arc::new(PatientLocks::new()),
        };
        self.orchestrator = Arc::new(LifecycleOrchestrator::new(ctx, self.queue.clone()));
    }

    /// Run every step that is ready now.
    pub async fn drain(&self) -> usize {
        self.queue.run_ready(self.orchestrator.as_ref()).await
    }

    /// Keep advancing the clock past each retry until nothing is pending.
    pub async fn drain_with_retries(&self) {
        loop {
            self.drain().await;
            match self.queue.next_run_at() {
                Some(at) => self.clock.set(at),
                None => break,
            }
        }
    }

    /// A pending prescription reachable from its subscription through the
    /// clinical plan and questionnaire, with a signature request in flight.
    pub async fn seed_pending(&self, schedule: Vec<DoseStep>, refills: i32) -> Seeded {
        let patient_id = Uuid::new_v4();
        let plan = ClinicalPlan {
            id: Uuid::new_v4(),
            patient_id,
            questionnaire_submission_id: Uuid::new_v4(),
            status: ClinicalPlanStatus::Active,
        };
        let price = schedule
            .first()
            .map(|s| s.billing_price_id.clone())
            .unwrap_or_default();
        let mut prescription = Prescription::pending(
            patient_id,
            Uuid::new_v4(),
            "tirzepatide",
            schedule,
            refills,
            start(),
            start(),
        );
        prescription.clinical_plan_id = Some(plan.id);
        prescription.signature_request_id = Some(format!("sig_{}", prescription.id));
        prescription.signature_document_id = Some("doc_1".into());

        let subscription = Subscription {
            id: Uuid::new_v4(),
            external_id: format!("sub_{}", patient_id.simple()),
            external_customer_id: "cus_1".into(),
            billing_price_id: price,
            provider: BillingProvider::PlanBased,
            prescription_id: None,
            patient_id,
            questionnaire_submission_id: Some(plan.questionnaire_submission_id),
            status: SubscriptionStatus::Active,
            next_charge_scheduled_at: Some(start() + Duration::days(30)),
            initial_order_id: None,
            cancelled_at: None,
            cancellation_reason: None,
            refill_alert_sent_for: None,
        };

        self.store
            .apply(
                ChangeSet::new()
                    .with_prescription(prescription.clone())
                    .with_subscription(subscription.clone())
                    .with_clinical_plan(plan.clone()),
            )
            .await
            .unwrap();

        Seeded {
            prescription,
            subscription,
            plan,
        }
    }

    /// An already signed, active prescription linked to its subscription.
    pub async fn seed_active(&self, schedule: Vec<DoseStep>, refills: i32) -> Seeded {
        let mut seeded = self.seed_pending(schedule, refills).await;
        seeded.prescription.status = PrescriptionStatus::Active;
        seeded.prescription.activation = ActivationState::Activated;
        seeded.prescription.signed_at = Some(start());
        seeded.subscription.prescription_id = Some(seeded.prescription.id);
        seeded.subscription.initial_order_id = Some("order_initial".into());
        self.store
            .apply(
                ChangeSet::new()
                    .with_prescription(seeded.prescription.clone())
                    .with_subscription(seeded.subscription.clone()),
            )
            .await
            .unwrap();
        seeded
    }

    pub async fn prescription(&self, id: Uuid) -> Prescription {
        self.store.prescription(id).await.unwrap().unwrap()
    }

    pub async fn subscription(&self, id: Uuid) -> Subscription {
        self.store.subscription(id).await.unwrap().unwrap()
    }
}
