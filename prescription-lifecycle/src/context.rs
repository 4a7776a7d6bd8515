use std::sync::Arc;
use workflow_engine::Clock;

use crate::gateways::{BillingRouter, CommerceGateway, LetterRenderer, NotificationDispatcher, SignatureGateway};
use crate::guard::PatientLocks;
use crate::store::LifecycleStore;

/// Collaborators shared by the orchestrator and the renewal sweep.
///
/// Both must share one [`PatientLocks`] so their writes to the same patient
/// are serialised.
#[derive(Clone)]
pub struct LifecycleContext {
    pub store: Arc<dyn LifecycleStore>,
    pub billing: BillingRouter,
    pub commerce: Arc<dyn CommerceGateway>,
    pub signature: Arc<dyn SignatureGateway>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub letters: Arc<dyn LetterRenderer>,
    pub clock: Arc<dyn Clock>,
    pub locks: Arc<PatientLocks>,
}
