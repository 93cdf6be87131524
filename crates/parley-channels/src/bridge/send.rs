//! Send and liveness-ping calls.

use super::{BridgeClient, MAX_MESSAGE_LEN, RECIPIENT_REQUIRED_MARKER};
use crate::utils::split_message;
use parley_core::error::ParleyError;
use serde::Deserialize;
use tracing::{debug, warn};

/// Body returned by `POST /api/send`. Fields are optional because bridge
/// versions differ in what they echo back.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SendResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decide whether a send succeeded from the HTTP status and raw body.
pub(crate) fn interpret_send_response(status: u16, body: &str) -> Result<(), ParleyError> {
    let parsed: Option<SendResponse> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let detail = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.trim().to_string());
        return Err(ParleyError::Bridge(format!(
            "bridge send failed ({status}): {detail}"
        )));
    }

    match parsed {
        Some(r) if r.ok == Some(false) || r.success == Some(false) => Err(ParleyError::Bridge(
            format!(
                "bridge rejected send: {}",
                r.error.unwrap_or_else(|| "no reason given".to_string())
            ),
        )),
        Some(SendResponse {
            error: Some(err), ..
        }) if !err.is_empty() => Err(ParleyError::Bridge(format!(
            "bridge rejected send: {err}"
        ))),
        _ => Ok(()),
    }
}

/// Whether a ping response shows the bridge is up.
pub(crate) fn ping_indicates_alive(status: u16, body: &str) -> bool {
    (200..300).contains(&status)
        || body
            .to_lowercase()
            .contains(RECIPIENT_REQUIRED_MARKER)
}

impl BridgeClient {
    /// Send a text message, split into bridge-sized chunks.
    pub(crate) async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ParleyError> {
        if recipient.trim().is_empty() {
            return Err(ParleyError::Bridge("empty recipient".into()));
        }

        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let body = serde_json::json!({
                "recipient": recipient,
                "message": chunk,
            });

            let resp = self
                .client
                .post(&self.send_url)
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| ParleyError::Bridge(format!("bridge send failed: {e}")))?;

            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            interpret_send_response(status, &text)?;
        }

        debug!("bridge: delivered to {recipient}");
        Ok(())
    }

    /// Liveness ping: send `{"test": "ping"}` and inspect the answer.
    pub(crate) async fn ping(&self) -> bool {
        let resp = match self
            .client
            .post(&self.send_url)
            .json(&serde_json::json!({ "test": "ping" }))
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("bridge ping failed: {e}");
                return false;
            }
        };

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let alive = ping_indicates_alive(status, &body);
        if !alive {
            warn!("bridge ping returned {status}: {body}");
        }
        alive
    }
}
