//! Fulfilment-side adapters: the commerce platform that receives pharmacy
//! orders, and the e-signature provider that collects prescriber signatures.

pub mod commerce;
pub mod http;
pub mod signature;

pub use commerce::HttpCommerceGateway;
pub use http::{ApiEndpoint, FulfillmentError, FulfillmentResult};
pub use signature::HttpSignatureGateway;
