//! Outbound gate: every message to the bridge goes through here.

use super::admin::AdminCheck;
use super::ratelimit::{RateDecision, RateLimitLedger};
use chrono::{DateTime, Utc};
use parley_core::{
    error::ParleyError,
    message::{AcceptedMessage, MessageClass},
    traits::Bridge,
};
use parley_memory::audit::{DeliveryEntry, DeliveryLog, DeliveryStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of a gated send that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Refused by the ledger; the bridge was not called.
    Throttled(RateDecision),
}

/// Wraps the bridge with the rate limit ledger and the delivery log.
pub struct OutboundGate {
    bridge: Arc<dyn Bridge>,
    ledger: Arc<RateLimitLedger>,
    admin: Arc<AdminCheck>,
    delivery_log: Option<DeliveryLog>,
    timeout: Duration,
}

impl OutboundGate {
    pub fn new(
        bridge: Arc<dyn Bridge>,
        ledger: Arc<RateLimitLedger>,
        admin: Arc<AdminCheck>,
        delivery_log: Option<DeliveryLog>,
        timeout: Duration,
    ) -> Self {
        Self {
            bridge,
            ledger,
            admin,
            delivery_log,
            timeout,
        }
    }

    /// Send an unsolicited message, gated by the ledger.
    pub async fn send(
        &self,
        recipient: &str,
        text: &str,
        class: MessageClass,
    ) -> Result<SendOutcome, ParleyError> {
        self.send_at(recipient, text, class, Utc::now()).await
    }

    /// [`send`](Self::send) with an explicit decision time.
    pub async fn send_at(
        &self,
        recipient: &str,
        text: &str,
        class: MessageClass,
        now: DateTime<Utc>,
    ) -> Result<SendOutcome, ParleyError> {
        let privilege = self.admin.privilege_for(recipient).await;

        let decision = self.ledger.check(recipient, privilege, class, now);
        if !decision.is_allowed() {
            info!("outbound to {recipient} throttled: {decision:?}");
            self.audit(
                recipient,
                text,
                class,
                DeliveryStatus::Throttled,
                Some(format!("{decision:?}")),
            )
            .await;
            return Ok(SendOutcome::Throttled(decision));
        }

        self.deliver(recipient, text, class).await?;
        self.ledger.record_response(recipient, privilege, class, now);
        Ok(SendOutcome::Sent)
    }

    /// Reply to a message accepted at intake. Its budget was already
    /// recorded, so the ledger is neither checked nor updated here.
    pub async fn reply(&self, accepted: &AcceptedMessage, text: &str) -> Result<(), ParleyError> {
        self.deliver(&accepted.record.conversation_id, text, accepted.class)
            .await
    }

    async fn deliver(
        &self,
        recipient: &str,
        text: &str,
        class: MessageClass,
    ) -> Result<(), ParleyError> {
        let send = self.bridge.send(recipient, text);
        let result = match tokio::time::timeout(self.timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ParleyError::Bridge(format!(
                "bridge send timed out after {}s",
                self.timeout.as_secs_f32()
            ))),
        };

        match &result {
            Ok(()) => {
                self.audit(recipient, text, class, DeliveryStatus::Sent, None)
                    .await;
            }
            Err(e) => {
                error!("send to {recipient} failed: {e}");
                self.audit(
                    recipient,
                    text,
                    class,
                    DeliveryStatus::Failed,
                    Some(e.to_string()),
                )
                .await;
            }
        }
        result
    }

    async fn audit(
        &self,
        recipient: &str,
        text: &str,
        class: MessageClass,
        status: DeliveryStatus,
        reason: Option<String>,
    ) {
        let Some(log) = &self.delivery_log else {
            return;
        };
        let entry = DeliveryEntry {
            recipient: recipient.to_string(),
            text: text.to_string(),
            class: class.as_str().to_string(),
            status,
            reason,
        };
        if let Err(e) = log.log(&entry).await {
            warn!("delivery log: {e}");
        }
    }
}
