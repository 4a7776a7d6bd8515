//! Logging for the lifecycle services.
//!
//! [`init_tracing`] installs a `tracing-subscriber` registry with an
//! `EnvFilter` and either human-readable or JSON output. [`PhiRedactor`]
//! scrubs patient contact details (email addresses, phone numbers, card and
//! social security numbers, IP addresses) from free text before it reaches a
//! log line. With correlation hashing on, each value becomes a short stable
//! token so repeated failures for one recipient can still be grouped.
//!
//! # Example
//!
//! ```rust,no_run
//! use logger_redacted::{init_tracing, LoggingConfig, PhiRedactor};
//!
//! init_tracing(&LoggingConfig::default()).ok();
//! let redactor = PhiRedactor::default();
//! tracing::warn!(recipient = %redactor.redact("jane@example.com"), "Delivery failed");
//! ```

pub mod config;
pub mod error;
pub mod redactor;
pub mod subscriber;

pub use config::*;
pub use error::*;
pub use redactor::*;
pub use subscriber::*;
