//! WhatsApp bridge client.
//!
//! The bridge is a separate process that owns the WhatsApp session and
//! exposes a small REST API. Parley only needs `POST /api/send`.

mod send;


use async_trait::async_trait;
use parley_core::{config::BridgeConfig, error::ParleyError, traits::Bridge};
use std::time::Duration;

/// Largest chunk sent in a single bridge call.
pub(crate) const MAX_MESSAGE_LEN: usize = 4096;

/// Marker the bridge returns when a ping omits the recipient; proves it is up.
pub(crate) const RECIPIENT_REQUIRED_MARKER: &str = "recipient required";

/// HTTP client for the bridge REST API.
pub struct BridgeClient {
    client: reqwest::Client,
    send_url: String,
    timeout: Duration,
}

impl BridgeClient {
    /// Create a bridge client from config.
    pub fn new(config: &BridgeConfig) -> Self {
        let base = config.base_url.trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            send_url: format!("{base}/api/send"),
            timeout: config.timeout(),
        }
    }

    /// Full URL of the send endpoint.
    pub fn send_url(&self) -> &str {
        &self.send_url
    }
}

#[async_trait]
impl Bridge for BridgeClient {
    async fn send(&self, recipient: &str, message: &str) -> Result<(), ParleyError> {
        self.send_text(recipient, message).await
    }

    async fn is_alive(&self) -> bool {
        self.ping().await
    }
}
