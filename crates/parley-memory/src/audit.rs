//! Delivery log: records every outbound attempt through the gate.

use parley_core::error::ParleyError;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// An entry to write to the delivery log.
pub struct DeliveryEntry {
    pub recipient: String,
    pub text: String,
    /// Message class the send was gated under.
    pub class: String,
    pub status: DeliveryStatus,
    pub reason: Option<String>,
}

/// Outcome of an outbound attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Throttled,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Throttled => "throttled",
            Self::Failed => "failed",
        }
    }
}

/// Delivery log backed by SQLite.
#[derive(Clone)]
pub struct DeliveryLog {
    pool: SqlitePool,
}

impl DeliveryLog {
    /// Create a delivery log sharing the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write an entry to the delivery log.
    pub async fn log(&self, entry: &DeliveryEntry) -> Result<(), ParleyError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO delivery_log (id, recipient, text, class, status, reason) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&entry.recipient)
        .bind(&entry.text)
        .bind(&entry.class)
        .bind(entry.status.as_str())
        .bind(&entry.reason)
        .execute(&self.pool)
        .await
        .map_err(|e| ParleyError::Store(format!("delivery log write failed: {e}")))?;

        debug!(
            "delivery: {} [{}] {}",
            entry.recipient,
            entry.status.as_str(),
            truncate(&entry.text, 80)
        );

        Ok(())
    }

    /// Count entries for a recipient with the given status.
    pub async fn count(
        &self,
        recipient: &str,
        status: DeliveryStatus,
    ) -> Result<i64, ParleyError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM delivery_log WHERE recipient = ? AND status = ?")
                .bind(recipient)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ParleyError::Store(format!("delivery log count failed: {e}")))?;
        Ok(count)
    }
}

/// Truncate to at most `max` bytes without splitting a character.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
