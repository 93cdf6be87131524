use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row read from the inbound message store. Never mutated by Parley.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessageRecord {
    /// Store-assigned unique identifier.
    pub id: String,
    /// Opaque chat identifier (e.g. `5511999887766@c.us`).
    pub conversation_id: String,
    /// Opaque sender identifier. May be empty for one-to-one chats.
    #[serde(default)]
    pub sender_id: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// Messages the bot itself sent, echoed back by the bridge.
    #[serde(default)]
    pub is_from_self: bool,
}

impl InboundMessageRecord {
    /// Address used for privilege lookups: the sender, or the chat when the
    /// sender is unknown.
    pub fn author(&self) -> &str {
        if self.sender_id.is_empty() {
            &self.conversation_id
        } else {
            &self.sender_id
        }
    }

    /// Whether the row lacks the fields the pipeline needs to act on it.
    pub fn is_malformed(&self) -> bool {
        self.id.trim().is_empty() || self.conversation_id.trim().is_empty()
    }
}

/// How a message is treated by the rate limit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    /// Body starts with the command prefix.
    Command,
    /// Body contains a question marker.
    Question,
    /// Anything else.
    Chat,
}

/// Question markers recognised in message bodies.
const QUESTION_MARKERS: [char; 3] = ['?', '¿', '؟'];

impl MessageClass {
    /// Classify a message body. Leading whitespace is ignored for the prefix check.
    pub fn classify(body: &str, command_prefix: &str) -> Self {
        let trimmed = body.trim_start();
        if !command_prefix.is_empty() && trimmed.starts_with(command_prefix) {
            Self::Command
        } else if body.contains(QUESTION_MARKERS) {
            Self::Question
        } else {
            Self::Chat
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, Self::Command)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Question => "question",
            Self::Chat => "chat",
        }
    }
}

/// Authorization decision for a conversation, made once per operation and
/// threaded through the ledger and the outbound gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Exempt from all throttling.
    Admin,
    Standard,
}

impl Privilege {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// A message that passed intake and was emitted downstream.
///
/// Its rate limit budget was consumed when it was accepted, so a reply to it
/// goes out without being gated a second time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedMessage {
    pub record: InboundMessageRecord,
    pub class: MessageClass,
    pub privilege: Privilege,
}

/// A user record from the user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub address: String,
    pub display_name: Option<String>,
    pub role: String,
}

/// Role value that marks a user as an administrator.
pub const ADMIN_ROLE: &str = "admin";
