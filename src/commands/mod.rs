//! Built-in bot commands: instant responses keyed on the command prefix.


use crate::gateway::ratelimit::RateLimitLedger;
use chrono::Utc;
use parley_core::message::{AcceptedMessage, MessageClass};
use parley_memory::Store;
use std::time::Instant;

/// Grouped context for command execution.
pub struct CommandContext<'a> {
    pub store: &'a Store,
    pub ledger: &'a RateLimitLedger,
    pub message: &'a AcceptedMessage,
    pub bot_name: &'a str,
    pub prefix: &'a str,
    pub uptime: &'a Instant,
}

/// Known bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Ping,
    Status,
    Whoami,
    /// Prefixed word that matches no command.
    Unknown(String),
}

impl Command {
    /// Parse a command from message text. Returns `None` when the text does
    /// not start with `prefix`.
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        if prefix.is_empty() {
            return None;
        }
        let rest = text.trim_start().strip_prefix(prefix)?;
        let word = rest.split_whitespace().next().unwrap_or("").to_lowercase();
        let cmd = match word.as_str() {
            "help" | "h" | "commands" => Self::Help,
            "ping" => Self::Ping,
            "status" | "info" => Self::Status,
            "whoami" | "profile" => Self::Whoami,
            _ => Self::Unknown(word),
        };
        Some(cmd)
    }
}

/// Handle a command and return the reply text.
pub async fn handle(cmd: Command, ctx: &CommandContext<'_>) -> String {
    match cmd {
        Command::Help => handle_help(ctx.bot_name, ctx.prefix),
        Command::Ping => "pong".to_string(),
        Command::Status => handle_status(ctx).await,
        Command::Whoami => handle_whoami(ctx),
        Command::Unknown(word) => {
            let shown = if word.is_empty() {
                ctx.prefix.to_string()
            } else {
                format!("{}{word}", ctx.prefix)
            };
            format!(
                "Unknown command '{shown}'. Send {}help for the list.",
                ctx.prefix
            )
        }
    }
}

fn handle_help(bot_name: &str, prefix: &str) -> String {
    format!(
        "*{bot_name} commands*\n\
         {prefix}help: this list\n\
         {prefix}ping: check that I'm listening\n\
         {prefix}status: uptime and activity\n\
         {prefix}whoami: your address and limits"
    )
}

async fn handle_status(ctx: &CommandContext<'_>) -> String {
    let elapsed = ctx.uptime.elapsed();
    let hours = elapsed.as_secs() / 3600;
    let minutes = (elapsed.as_secs() % 3600) / 60;
    let secs = elapsed.as_secs() % 60;

    let conversation = &ctx.message.record.conversation_id;
    let handled = ctx
        .store
        .processed_count(conversation)
        .await
        .map(|n| n.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!(
        "*{} status*\n\
         Uptime: {hours}h {minutes}m {secs}s\n\
         Messages handled here: {handled}",
        ctx.bot_name
    )
}

fn handle_whoami(ctx: &CommandContext<'_>) -> String {
    let record = &ctx.message.record;
    let role = if ctx.message.privilege.is_admin() {
        "admin"
    } else {
        "user"
    };
    let used = ctx
        .ledger
        .snapshot(&record.conversation_id)
        .map(|l| l.daily_count)
        .unwrap_or(0);
    let limit = if ctx.message.privilege.is_admin() {
        "unlimited".to_string()
    } else {
        format!("{used}/{} today", ctx.ledger.config().max_daily_responses)
    };
    let ready = ctx.ledger.can_respond(
        &record.conversation_id,
        ctx.message.privilege,
        MessageClass::Chat,
        Utc::now(),
    );
    format!(
        "Address: {}\nRole: {role}\nResponses: {limit}\nReply window open: {}",
        record.author(),
        if ready { "yes" } else { "no" }
    )
}
