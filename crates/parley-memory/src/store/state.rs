//! Durable conversation state: processed-message marks.

use super::{Store, EXCLUDED_CHATS};
use async_trait::async_trait;
use parley_core::{
    error::ParleyError, message::InboundMessageRecord, traits::ConversationState,
};
use tracing::{debug, info};

impl Store {
    /// Whether a message id has a durable processed mark.
    pub async fn is_processed(&self, message_id: &str) -> Result<bool, ParleyError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT message_id FROM processed_messages WHERE message_id = ?")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ParleyError::Store(format!("processed lookup failed: {e}")))?;
        Ok(row.is_some())
    }

    /// Number of processed marks for a conversation.
    pub async fn processed_count(&self, conversation_id: &str) -> Result<i64, ParleyError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM processed_messages WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ParleyError::Store(format!("count failed: {e}")))?;
        Ok(count)
    }
}

#[async_trait]
impl ConversationState for Store {
    async fn initialize(&self) -> Result<(), ParleyError> {
        // Tables come from migrations; this only verifies they are reachable.
        sqlx::query("SELECT COUNT(*) FROM processed_messages")
            .execute(&self.pool)
            .await
            .map_err(|e| ParleyError::Store(format!("conversation state unavailable: {e}")))?;
        Ok(())
    }

    async fn should_process_message(
        &self,
        record: &InboundMessageRecord,
    ) -> Result<bool, ParleyError> {
        if record.is_from_self {
            return Ok(false);
        }
        if EXCLUDED_CHATS.contains(&record.conversation_id.as_str()) {
            debug!("excluded chat {}", record.conversation_id);
            return Ok(false);
        }
        Ok(!self.is_processed(&record.id).await?)
    }

    async fn mark_message_processed(
        &self,
        record: &InboundMessageRecord,
    ) -> Result<(), ParleyError> {
        sqlx::query(
            "INSERT OR IGNORE INTO processed_messages (message_id, conversation_id) VALUES (?, ?)",
        )
        .bind(&record.id)
        .bind(&record.conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| ParleyError::Store(format!("mark processed failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.pool.close().await;
        info!("Conversation state closed");
        Ok(())
    }
}
