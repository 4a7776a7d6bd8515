//! SQLite persistence for the prescription lifecycle.
//!
//! [`SqliteLifecycleStore`] implements
//! [`prescription_lifecycle::LifecycleStore`]: prescriptions, subscriptions,
//! clinical plans and processed-payment idempotency records, with every
//! change set committed in a single transaction. The schema is created on
//! connect.
//!
//! ```rust,ignore
//! use database_layer::{DatabasePool, SqliteLifecycleStore};
//!
//! let pool = DatabasePool::connect("sqlite://lifecycle.db", 5).await?;
//! let store = SqliteLifecycleStore::new(pool);
//! ```

pub mod connection;
pub mod error;
mod models;
pub mod schema;
pub mod store;

pub use connection::DatabasePool;
pub use error::{DatabaseError, DatabaseResult};
pub use store::SqliteLifecycleStore;
