mod defaults;


use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ParleyError;
use defaults::*;

/// Top-level Parley configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub parley: ParleyConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// General bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// WhatsApp bridge connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the bridge REST API (without `/api/send`).
    #[serde(default = "default_bridge_url")]
    pub base_url: String,
    /// Per-request timeout for sends and liveness pings.
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
    /// Suffix appended to bare phone numbers to form a canonical address.
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            timeout_secs: default_bridge_timeout(),
            domain_suffix: default_domain_suffix(),
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Inbound polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Messages starting with this prefix are commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Seconds added to "now" when fixing the cutover boundary at start-up.
    #[serde(default = "default_cutover_grace")]
    pub cutover_grace_secs: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            command_prefix: default_command_prefix(),
            cutover_grace_secs: default_cutover_grace(),
        }
    }
}

impl IntakeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cutover_grace(&self) -> Duration {
        Duration::from_secs(self.cutover_grace_secs)
    }
}

/// Per-conversation throttling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Standard cooldown between responses in the same conversation.
    #[serde(default = "default_min_response_interval_ms")]
    pub min_response_interval_ms: u64,
    #[serde(default = "default_max_daily_responses")]
    pub max_daily_responses: u32,
    /// Cooldown between commands, measured from the last command.
    #[serde(default = "default_command_cooldown_ms")]
    pub command_cooldown_ms: u64,
    #[serde(default = "default_question_cooldown_ms")]
    pub question_cooldown_ms: u64,
    /// Relaxed cooldown while a conversation is still "new".
    #[serde(default = "default_new_conversation_cooldown_ms")]
    pub new_conversation_cooldown_ms: u64,
    /// A conversation is "new" while its daily count is below this.
    #[serde(default = "default_new_conversation_threshold")]
    pub new_conversation_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_response_interval_ms: default_min_response_interval_ms(),
            max_daily_responses: default_max_daily_responses(),
            command_cooldown_ms: default_command_cooldown_ms(),
            question_cooldown_ms: default_question_cooldown_ms(),
            new_conversation_cooldown_ms: default_new_conversation_cooldown_ms(),
            new_conversation_threshold: default_new_conversation_threshold(),
        }
    }
}

/// SQLite store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Database file, or `:memory:` for a private in-memory database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Config {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ParleyError> {
        if self.intake.poll_interval_ms == 0 {
            return Err(ParleyError::Config(
                "intake.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.intake.command_prefix.is_empty() {
            return Err(ParleyError::Config(
                "intake.command_prefix must not be empty".into(),
            ));
        }
        if self.bridge.base_url.trim().is_empty() {
            return Err(ParleyError::Config("bridge.base_url must be set".into()));
        }
        if self.rate_limit.max_daily_responses == 0 {
            return Err(ParleyError::Config(
                "rate_limit.max_daily_responses must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, ParleyError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ParleyError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| ParleyError::Config(format!("failed to parse config: {}", e)))?;

    config.validate()?;
    Ok(config)
}
