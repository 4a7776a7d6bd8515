//! Prescription–subscription lifecycle orchestration.
//!
//! Keeps a patient's recurring subscription consistent with the prescription
//! that clinically backs it:
//!
//! - [`renewal::RenewalValidator`] decides whether an upcoming renewal is
//!   backed, whether to cancel it now or wait, and whether the care team
//!   needs a refill alert
//! - [`sweep::RenewalSweep`] runs that decision over every subscription
//!   renewing soon and performs the resulting cancellations and alerts
//! - [`dose_schedule`] resolves the current and next dose of a titration
//!   schedule from the refills left
//! - [`orchestrator::LifecycleOrchestrator`] reacts to signature completion
//!   and recurring payments through idempotent, retryable
//!   [`steps::LifecycleStep`]s
//!
//! External services are reached only through the traits in [`gateways`];
//! persistence goes through [`store::LifecycleStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use prescription_lifecycle::{RenewalSource, RenewalSweep, SweepSettings};
//!
//! let sweep = RenewalSweep::new(ctx, SweepSettings::default());
//! let report = sweep.run(3, RenewalSource::LocalRecords).await?;
//! tracing::info!(cancelled = report.cancelled, "sweep done");
//! ```

pub mod context;
pub mod dose_schedule;
pub mod error;
pub mod gateways;
pub mod guard;
pub mod models;
pub mod orchestrator;
pub mod renewal;
pub mod steps;
pub mod store;
pub mod sweep;

pub use context::LifecycleContext;
pub use dose_schedule::DoseProgress;
pub use error::{GatewayError, GatewayResult, LifecycleError};
pub use guard::PatientLocks;
pub use models::*;
pub use orchestrator::{
    DocumentSigned, LifecycleOrchestrator, PaymentOutcome, RecurringPaymentConfirmed, SignatureOutcome,
};
pub use renewal::{InvalidReason, RenewalDecision, RenewalValidator, RenewalWindows, Validity};
pub use steps::LifecycleStep;
pub use store::{ChangeSet, InMemoryLifecycleStore, LifecycleStore};
pub use sweep::{RenewalSource, RenewalSweep, SweepReport, SweepSettings};
