use crate::{
    error::ParleyError,
    message::{InboundMessageRecord, UserRecord},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Inbound message store, where the bridge drops received messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Whether the store can currently serve queries.
    async fn is_ready(&self) -> bool;

    /// All rows with `timestamp > since`, ascending by timestamp.
    async fn get_messages_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessageRecord>, ParleyError>;
}

/// WhatsApp bridge: the external process that actually talks to WhatsApp.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Deliver a text message to a recipient.
    async fn send(&self, recipient: &str, message: &str) -> Result<(), ParleyError>;

    /// Liveness check.
    async fn is_alive(&self) -> bool;
}

/// User directory, used for privilege checks.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by canonical address. `Ok(None)` if unknown.
    async fn get_user_by_address(&self, address: &str) -> Result<Option<UserRecord>, ParleyError>;
}

/// Durable per-conversation processing state, used for crash-safe dedup.
#[async_trait]
pub trait ConversationState: Send + Sync {
    /// Prepare the backing storage.
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// `false` if the message was already processed or belongs to an excluded chat.
    async fn should_process_message(
        &self,
        record: &InboundMessageRecord,
    ) -> Result<bool, ParleyError>;

    /// Persist the "processed" mark for a message.
    async fn mark_message_processed(&self, record: &InboundMessageRecord)
        -> Result<(), ParleyError>;

    /// Flush and release resources.
    async fn close(&self) -> Result<(), ParleyError>;
}
