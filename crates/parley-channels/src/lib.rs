//! # parley-channels
//!
//! Client for the external WhatsApp bridge process.

pub mod bridge;
pub mod utils;

pub use bridge::BridgeClient;
