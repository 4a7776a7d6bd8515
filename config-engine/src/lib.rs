//! Configuration for the lifecycle services.
//!
//! [`load`] layers three sources with [`figment`]: built-in defaults, an
//! optional YAML file and `RXLC_` environment variables. The result is a
//! typed [`LifecycleConfig`] that has passed [`validate`].
//!
//! # Example
//!
//! ```rust,no_run
//! use config_engine::load;
//! use std::path::Path;
//!
//! let config = load(Some(Path::new("lifecycle.yaml")))?;
//! let policy = config.retry.policy()?;
//! # Ok::<(), config_engine::ConfigError>(())
//! ```
//!
//! # Configuration Example
//!
//! ```yaml
//! renewal:
//!   cancellation_window_hours: 48
//!   refill_alert_window_days: 7
//!   sweep_window_days: 7
//!   sweep_schedule: "0 0 * * * *"
//!   source: local_records
//! retry:
//!   tier_secs: [60, 300, 600, 1800]
//!   max_attempts: 5
//! database:
//!   url: "sqlite://lifecycle.db"
//! billing:
//!   plan_based:
//!     base_url: "https://billing.example.com"
//!     api_key: "${RXLC_BILLING__PLAN_BASED__API_KEY}"
//! ```

pub mod error;
pub mod providers;
pub mod settings;
pub mod validation;

pub use error::*;
pub use providers::{load, sources, ENV_PREFIX};
pub use settings::*;
pub use validation::validate;
