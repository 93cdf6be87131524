//! Inbound message rows.
//!
//! Timestamps are stored as integer Unix milliseconds so the `since` filter
//! uses the column's native ordering instead of comparing formatted strings.

use super::Store;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parley_core::{error::ParleyError, message::InboundMessageRecord, traits::MessageStore};

type InboundRow = (String, String, String, String, i64, bool);

/// Convert a point in time to the store's millisecond column.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert a stored millisecond value back to a point in time.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

impl Store {
    /// Insert an inbound row. Re-inserting an existing id is ignored.
    pub async fn insert_inbound(&self, record: &InboundMessageRecord) -> Result<(), ParleyError> {
        sqlx::query(
            "INSERT OR IGNORE INTO inbound_messages \
             (id, conversation_id, sender_id, body, ts_ms, is_from_self) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.conversation_id)
        .bind(&record.sender_id)
        .bind(&record.body)
        .bind(to_millis(record.timestamp))
        .bind(record.is_from_self)
        .execute(&self.pool)
        .await
        .map_err(|e| ParleyError::Store(format!("insert failed: {e}")))?;

        Ok(())
    }

    /// Rows strictly newer than `since`, oldest first.
    pub async fn inbound_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessageRecord>, ParleyError> {
        let rows: Vec<InboundRow> = sqlx::query_as(
            "SELECT id, conversation_id, sender_id, body, ts_ms, is_from_self \
             FROM inbound_messages \
             WHERE ts_ms > ? \
             ORDER BY ts_ms ASC, rowid ASC",
        )
        .bind(to_millis(since))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ParleyError::Store(format!("query failed: {e}")))?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, conversation_id, sender_id, body, ts_ms, is_from_self) in rows {
            let Some(timestamp) = from_millis(ts_ms) else {
                tracing::warn!("skipping inbound row {id}: timestamp {ts_ms} out of range");
                continue;
            };
            records.push(InboundMessageRecord {
                id,
                conversation_id,
                sender_id,
                body,
                timestamp,
                is_from_self,
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl MessageStore for Store {
    async fn is_ready(&self) -> bool {
        self.ping().await
    }

    async fn get_messages_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessageRecord>, ParleyError> {
        self.inbound_since(since).await
    }
}
