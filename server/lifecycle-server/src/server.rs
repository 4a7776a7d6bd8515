use chrono::{DateTime, Utc};
use database_layer::DatabasePool;
use prescription_lifecycle::{LifecycleOrchestrator, LifecycleStep, RenewalSource, RenewalSweep};
use std::sync::Arc;
use workflow_engine::TaskQueue;

/// Sweep parameters used when a trigger does not override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepDefaults {
    pub window_days: u32,
    pub source: RenewalSource,
}

impl Default for SweepDefaults {
    fn default() -> Self {
        Self {
            window_days: 7,
            source: RenewalSource::LocalRecords,
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct LifecycleServer {
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub sweep: Arc<RenewalSweep>,
    pub steps: Arc<TaskQueue<LifecycleStep>>,
    /// Absent when running on the in-memory store.
    pub database: Option<DatabasePool>,
    pub sweep_defaults: SweepDefaults,
    pub started_at: DateTime<Utc>,
}

impl LifecycleServer {
    pub fn new(
        orchestrator: Arc<LifecycleOrchestrator>,
        sweep: Arc<RenewalSweep>,
        steps: Arc<TaskQueue<LifecycleStep>>,
    ) -> Self {
        let started_at = orchestrator.context().clock.now();
        Self {
            orchestrator,
            sweep,
            steps,
            database: None,
            sweep_defaults: SweepDefaults::default(),
            started_at,
        }
    }

    pub fn with_database(mut self, database: DatabasePool) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_sweep_defaults(mut self, defaults: SweepDefaults) -> Self {
        self.sweep_defaults = defaults;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.orchestrator.context().clock.now()
    }
}
