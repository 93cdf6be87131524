//! # parley-memory
//!
//! SQLite-backed stores for Parley: inbound messages, users, durable
//! conversation state, and the delivery audit log.

pub mod audit;
pub mod store;

pub use audit::DeliveryLog;
pub use store::Store;
