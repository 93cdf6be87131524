//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "Parley".to_string()
}

pub fn default_data_dir() -> String {
    "~/.parley".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_bridge_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

pub fn default_bridge_timeout() -> u64 {
    15
}

pub fn default_domain_suffix() -> String {
    "@c.us".to_string()
}

pub fn default_poll_interval_ms() -> u64 {
    2000
}

pub fn default_command_prefix() -> String {
    "!".to_string()
}

pub fn default_cutover_grace() -> u64 {
    10
}

pub fn default_min_response_interval_ms() -> u64 {
    20_000
}

pub fn default_max_daily_responses() -> u32 {
    100
}

pub fn default_command_cooldown_ms() -> u64 {
    5_000
}

pub fn default_question_cooldown_ms() -> u64 {
    12_000
}

pub fn default_new_conversation_cooldown_ms() -> u64 {
    3_000
}

pub fn default_new_conversation_threshold() -> u32 {
    5
}

pub fn default_db_path() -> String {
    "~/.parley/data/parley.db".to_string()
}
