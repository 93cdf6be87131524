//! At-most-once guard for inbound message ids.

use parley_core::{message::InboundMessageRecord, traits::ConversationState};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// In-memory set of handled ids, backed by durable conversation state so
/// marks survive restarts. The set grows for the life of the process.
pub struct DedupCache {
    seen: Mutex<HashSet<String>>,
    state: Arc<dyn ConversationState>,
}

impl DedupCache {
    pub fn new(state: Arc<dyn ConversationState>) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            state,
        }
    }

    fn seen(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the message was already handled (or the durable store refuses it).
    ///
    /// A durable-store failure counts as "not handled"; the in-memory set still applies.
    pub async fn has(&self, record: &InboundMessageRecord) -> bool {
        if self.seen().contains(&record.id) {
            return true;
        }
        match self.state.should_process_message(record).await {
            Ok(should_process) => !should_process,
            Err(e) => {
                warn!("dedup: conversation state lookup failed for {}: {e}", record.id);
                false
            }
        }
    }

    /// Mark the message handled in memory and durably.
    pub async fn mark_processed(&self, record: &InboundMessageRecord) {
        self.seen().insert(record.id.clone());
        if let Err(e) = self.state.mark_message_processed(record).await {
            warn!("dedup: failed to persist processed mark for {}: {e}", record.id);
        }
    }
}
