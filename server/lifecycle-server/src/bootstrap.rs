use anyhow::{bail, Context};
use billing_service::{ItemPriceBillingGateway, PlanBillingGateway};
use config_engine::LifecycleConfig;
use database_layer::{DatabasePool, SqliteLifecycleStore};
use email_service::{EmailNotificationDispatcher, TemplateLetterRenderer};
use fulfillment_service::{HttpCommerceGateway, HttpSignatureGateway};
use logger_redacted::PhiRedactor;
use prescription_lifecycle::gateways::BillingRouter;
use prescription_lifecycle::{LifecycleContext, LifecycleOrchestrator, LifecycleStep, PatientLocks, RenewalSweep};
use std::sync::Arc;
use tracing::info;
use workflow_engine::{Clock, SystemClock, TaskQueue};

use crate::server::{LifecycleServer, SweepDefaults};

/// Everything a running process needs, wired from one configuration.
pub struct Runtime {
    pub server: LifecycleServer,
    pub queue: Arc<TaskQueue<LifecycleStep>>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub pool: DatabasePool,
}

fn billing_router(config: &LifecycleConfig) -> anyhow::Result<BillingRouter> {
    let mut router = BillingRouter::new();
    if let Some(endpoint) = &config.billing.plan_based {
        router = router.with_gateway(Arc::new(
            PlanBillingGateway::new(endpoint).context("plan-based billing gateway")?,
        ));
    }
    if let Some(endpoint) = &config.billing.item_price_based {
        router = router.with_gateway(Arc::new(
            ItemPriceBillingGateway::new(endpoint).context("item-price billing gateway")?,
        ));
    }
    if router.gateways().next().is_none() {
        bail!("no billing provider is configured");
    }
    Ok(router)
}

/// Connect storage and build every gateway, the step queue, the
/// orchestrator and the renewal sweep.
pub async fn build_runtime(config: &LifecycleConfig) -> anyhow::Result<Runtime> {
    let pool = DatabasePool::connect(&config.database.url, config.database.max_connections)
        .await
        .context("connecting to the lifecycle database")?;

    let notifications = config.notifications()?;
    let redactor = PhiRedactor::new(&config.logging.redaction)?;
    let notifier = EmailNotificationDispatcher::new(notifications.clone(), redactor)
        .context("email notification dispatcher")?;
    let letters = TemplateLetterRenderer::new(notifications.clinic_name.clone())?;

    let signature = config.signature()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let ctx = LifecycleContext {
        store: Arc::new(SqliteLifecycleStore::new(pool.clone())),
        billing: billing_router(config)?,
        commerce: Arc::new(HttpCommerceGateway::new(config.commerce()?).context("commerce gateway")?),
        signature: Arc::new(
            HttpSignatureGateway::new(&signature.endpoint, signature.test_mode).context("signature gateway")?,
        ),
        notifier: Arc::new(notifier),
        letters: Arc::new(letters),
        clock: clock.clone(),
        locks: Arc::new(PatientLocks::new()),
    };

    let queue = Arc::new(TaskQueue::new(config.retry.policy()?, clock));
    let orchestrator = Arc::new(LifecycleOrchestrator::new(ctx.clone(), queue.clone()));
    let sweep = Arc::new(RenewalSweep::new(ctx, config.renewal.sweep_settings()));

    let server = LifecycleServer::new(orchestrator.clone(), sweep, queue.clone())
        .with_database(pool.clone())
        .with_sweep_defaults(SweepDefaults {
            window_days: config.renewal.sweep_window_days,
            source: config.renewal.source,
        });

    info!(
        test_mode = signature.test_mode,
        retry_tiers = config.retry.tier_secs.len(),
        "Lifecycle runtime ready"
    );
    Ok(Runtime {
        server,
        queue,
        orchestrator,
        pool,
    })
}
