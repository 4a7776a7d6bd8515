//! Checks that cannot be expressed in the types alone.

use reqwest::Url;
use std::net::SocketAddr;

use crate::error::{ConfigError, Result};
use crate::settings::LifecycleConfig;

fn check_url(problems: &mut Vec<String>, field: &str, value: &str) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => problems.push(format!("{field}: unsupported scheme '{}'", url.scheme())),
        Err(e) => problems.push(format!("{field}: invalid url '{value}': {e}")),
    }
}

/// Collects every problem instead of stopping at the first.
pub fn validate(config: &LifecycleConfig) -> Result<()> {
    let mut problems = Vec::new();

    if config.retry.tier_secs.is_empty() {
        problems.push("retry.tier_secs: at least one backoff tier is required".to_string());
    }
    if config.retry.max_attempts == 0 {
        problems.push("retry.max_attempts: must be at least 1".to_string());
    }

    let renewal = &config.renewal;
    if renewal.cancellation_window_hours == 0 {
        problems.push("renewal.cancellation_window_hours: must be positive".to_string());
    }
    if renewal.refill_alert_window_days == 0 {
        problems.push("renewal.refill_alert_window_days: must be positive".to_string());
    }
    if renewal.sweep_window_days == 0 {
        problems.push("renewal.sweep_window_days: must be positive".to_string());
    }
    if renewal.sweep_schedule.split_whitespace().count() != 6 {
        problems.push(format!(
            "renewal.sweep_schedule: expected six cron fields, got '{}'",
            renewal.sweep_schedule
        ));
    }

    if config.workers.count == 0 {
        problems.push("workers.count: must be at least 1".to_string());
    }
    if config.database.url.is_empty() {
        problems.push("database.url: must not be empty".to_string());
    }
    if config.database.max_connections == 0 {
        problems.push("database.max_connections: must be at least 1".to_string());
    }

    if let Some(plan) = &config.billing.plan_based {
        check_url(&mut problems, "billing.plan_based.base_url", &plan.base_url);
    }
    if let Some(item) = &config.billing.item_price_based {
        check_url(&mut problems, "billing.item_price_based.base_url", &item.base_url);
    }
    if let Some(commerce) = &config.commerce {
        check_url(&mut problems, "commerce.base_url", &commerce.base_url);
    }
    if let Some(signature) = &config.signature {
        check_url(&mut problems, "signature.endpoint.base_url", &signature.endpoint.base_url);
    }
    if let Some(notifications) = &config.notifications {
        check_url(&mut problems, "notifications.api_url", &notifications.api_url);
        if !notifications.care_team_address.contains('@') {
            problems.push("notifications.care_team_address: not an email address".to_string());
        }
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        problems.push(format!(
            "server.bind_address: '{}' is not a socket address",
            config.server.bind_address
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(problems))
    }
}
