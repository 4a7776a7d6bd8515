//! Outbound messages for the prescription lifecycle.
//!
//! [`EmailNotificationDispatcher`] implements the lifecycle's notification
//! contract over a transactional email API: each event is rendered from a
//! Handlebars subject/body pair, patients and clinicians are addressed by
//! profile id, and refill alerts go to the care-team inbox. Delivery failures
//! are logged with addresses redacted and never propagate.
//!
//! [`TemplateLetterRenderer`] produces the single-page PDF letter sent to the
//! prescriber once a prescription activates.
//!
//! # Configuration Example
//!
//! ```yaml
//! notifications:
//!   api_url: "https://mail.example.com"
//!   api_key: "${RXLC_NOTIFICATIONS__API_KEY}"
//!   sender: "pharmacy@example.com"
//!   care_team_address: "care-team@example.com"
//!   clinic_name: "Northside Clinic"
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod letters;
pub mod templates;

pub use config::EmailConfig;
pub use dispatcher::{Destination, EmailNotificationDispatcher};
pub use error::{EmailError, EmailResult};
pub use letters::TemplateLetterRenderer;
pub use templates::{NotificationTemplates, RenderedMessage};
