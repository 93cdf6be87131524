use thiserror::Error;

/// Top-level error type for Parley.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Error talking to the WhatsApp bridge.
    #[error("bridge error: {0}")]
    Bridge(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Message, user, or conversation-state store error.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
