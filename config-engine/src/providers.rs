//! Configuration sources, lowest precedence first: built-in defaults, an
//! optional YAML file, then `RXLC_`-prefixed environment variables with `__`
//! separating nested keys (`RXLC_RETRY__MAX_ATTEMPTS=7`).

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use tracing::info;

use crate::error::{ConfigError, Result};
use crate::settings::LifecycleConfig;
use crate::validation::validate;

pub const ENV_PREFIX: &str = "RXLC_";

pub fn sources(path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(LifecycleConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Yaml::file(path));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate. A path that was given but does not exist is an error.
pub fn load(path: Option<&Path>) -> Result<LifecycleConfig> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::SourceNotFound(path.display().to_string()));
        }
    }
    let config: LifecycleConfig = sources(path).extract()?;
    validate(&config)?;
    let config_file = path.map_or_else(|| "none".to_string(), |p| p.display().to_string());
    info!(
        config_file = %config_file,
        source = ?config.renewal.source,
        "Configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use prescription_lifecycle::RenewalSource;

    #[test]
    fn defaults_apply_without_sources() {
        Jail::expect_with(|_jail| {
            let config = load(None).map_err(|e| e.to_string())?;
            assert_eq!(config, LifecycleConfig::default());
            assert_eq!(config.retry.tier_secs, vec![60, 300, 600, 1800]);
            assert_eq!(config.renewal.cancellation_window_hours, 48);
            Ok(())
        });
    }

    #[test]
    fn file_then_environment_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "lifecycle.yaml",
                r#"
renewal:
  sweep_window_days: 3
  source: gateway
retry:
  max_attempts: 3
billing:
  plan_based:
    base_url: "https://billing.example.com"
    api_key: "sk_file"
commerce:
  base_url: "https://shop.example.com"
  api_key: "shpat_file"
"#,
            )?;
            jail.set_env("RXLC_RETRY__MAX_ATTEMPTS", "7");
            jail.set_env("RXLC_BILLING__PLAN_BASED__API_KEY", "sk_env");

            let config = load(Some(Path::new("lifecycle.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.renewal.sweep_window_days, 3);
            assert_eq!(config.renewal.source, RenewalSource::Gateway);
            assert_eq!(config.retry.max_attempts, 7);
            assert_eq!(config.retry.tier_secs, vec![60, 300, 600, 1800]);

            let plan = config.billing.plan_based.as_ref().ok_or("plan billing missing")?;
            assert_eq!(plan.api_key, "sk_env");
            assert_eq!(plan.timeout_secs, 30);
            assert!(config.billing.item_price_based.is_none());
            assert_eq!(config.commerce().map_err(|e| e.to_string())?.api_key, "shpat_file");
            assert!(config.signature().is_err());
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_reported() {
        Jail::expect_with(|_jail| {
            let result = load(Some(Path::new("absent.yaml")));
            assert!(matches!(result, Err(ConfigError::SourceNotFound(_))));
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fail_validation() {
        Jail::expect_with(|jail| {
            jail.set_env("RXLC_RETRY__MAX_ATTEMPTS", "0");
            jail.set_env("RXLC_RENEWAL__SWEEP_WINDOW_DAYS", "0");
            match load(None) {
                Err(ConfigError::ValidationError(problems)) => assert_eq!(problems.len(), 2),
                other => panic!("expected validation failure, got {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn malformed_value_is_a_parse_error() {
        Jail::expect_with(|jail| {
            jail.set_env("RXLC_WORKERS__COUNT", "many");
            assert!(matches!(load(None), Err(ConfigError::ParseError(_))));
            Ok(())
        });
    }
}
