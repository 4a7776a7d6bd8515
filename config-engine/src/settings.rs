//! Typed configuration sections.

use billing_service::BillingEndpoint;
use email_service::EmailConfig;
use fulfillment_service::ApiEndpoint;
use logger_redacted::LoggingConfig;
use prescription_lifecycle::{RenewalSource, RenewalValidator, RenewalWindows, SweepSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use workflow_engine::RetryPolicy;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub renewal: RenewalSettings,
    pub retry: RetrySettings,
    pub workers: WorkerSettings,
    pub database: DatabaseSettings,
    pub billing: BillingSettings,
    pub commerce: Option<ApiEndpoint>,
    pub signature: Option<SignatureSettings>,
    pub notifications: Option<EmailConfig>,
    pub logging: LoggingConfig,
    pub server: ServerSettings,
}

impl LifecycleConfig {
    pub fn commerce(&self) -> Result<&ApiEndpoint> {
        self.commerce.as_ref().ok_or(ConfigError::MissingSection("commerce"))
    }

    pub fn signature(&self) -> Result<&SignatureSettings> {
        self.signature.as_ref().ok_or(ConfigError::MissingSection("signature"))
    }

    pub fn notifications(&self) -> Result<&EmailConfig> {
        self.notifications
            .as_ref()
            .ok_or(ConfigError::MissingSection("notifications"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalSettings {
    /// Invalid renewals charging within this many hours are cancelled.
    pub cancellation_window_hours: u32,
    pub refill_alert_window_days: u32,
    /// How far ahead each sweep looks.
    pub sweep_window_days: u32,
    /// Six-field cron expression for the periodic sweep.
    pub sweep_schedule: String,
    pub source: RenewalSource,
    pub dedupe_refill_alerts: bool,
}

impl Default for RenewalSettings {
    fn default() -> Self {
        Self {
            cancellation_window_hours: 48,
            refill_alert_window_days: 7,
            sweep_window_days: 7,
            sweep_schedule: "0 0 * * * *".to_string(),
            source: RenewalSource::LocalRecords,
            dedupe_refill_alerts: false,
        }
    }
}

impl RenewalSettings {
    pub fn windows(&self) -> RenewalWindows {
        RenewalWindows {
            cancellation: chrono::Duration::hours(i64::from(self.cancellation_window_hours)),
            refill_alert: chrono::Duration::days(i64::from(self.refill_alert_window_days)),
        }
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            validator: RenewalValidator::new(self.windows()),
            dedupe_refill_alerts: self.dedupe_refill_alerts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub tier_secs: Vec<u64>,
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            tier_secs: vec![60, 300, 600, 1800],
            max_attempts: 5,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::from_secs(&self.tier_secs, self.max_attempts)
            .map_err(|e| ConfigError::ValidationError(vec![format!("retry: {e}")]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub count: usize,
    pub poll_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 4,
            poll_interval_ms: 500,
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://lifecycle.db".to_string(),
            max_connections: 5,
        }
    }
}

/// One entry per billing provider in use. Either may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    pub plan_based: Option<BillingEndpoint>,
    pub item_price_based: Option<BillingEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSettings {
    pub endpoint: ApiEndpoint,
    /// Requests are created in the provider's sandbox and are not legally binding.
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}
