mod commands;
mod gateway;

use clap::{Parser, Subcommand};
use gateway::outbound::SendOutcome;
use parley_channels::BridgeClient;
use parley_core::{
    config::{self, shellexpand},
    traits::{Bridge, ConversationState, MessageStore},
};
use parley_memory::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "parley",
    version,
    about = "Parley: rate-limited intake and replies for a WhatsApp bridge"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, env = "PARLEY_CONFIG", default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway until Ctrl-C.
    Start,
    /// Check store readiness and bridge liveness.
    Status,
    /// Send a one-off message through the rate-limited gate.
    Send {
        /// Recipient address or bare phone number.
        to: String,
        /// The message to send.
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
}

/// Stderr output plus a daily log file under `{data_dir}/logs`.
///
/// The returned guard flushes the file writer on drop and must outlive `main`'s work.
fn init_logging(cfg: &config::Config) -> anyhow::Result<WorkerGuard> {
    let log_dir = PathBuf::from(shellexpand(&cfg.parley.data_dir)).join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "parley.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.parley.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_logging(&cfg)?;

    match cli.command {
        Commands::Start => {
            let memory = Store::new(&cfg.memory).await?;
            let bridge = Arc::new(BridgeClient::new(&cfg.bridge));

            if !bridge.is_alive().await {
                tracing::warn!(
                    "bridge at {} is not answering yet; replies will fail until it does",
                    cfg.bridge.base_url
                );
            }

            println!("{} starting...", cfg.parley.name);
            let gw = Arc::new(gateway::Gateway::new(cfg, memory, bridge).await?);
            gw.run().await?;
        }
        Commands::Send { to, message } => {
            if message.is_empty() {
                anyhow::bail!("no message provided. Usage: parley send <to> <message>");
            }
            let text = message.join(" ");

            let memory = Store::new(&cfg.memory).await?;
            let bridge = Arc::new(BridgeClient::new(&cfg.bridge));
            let gw = gateway::Gateway::new(cfg, memory.clone(), bridge).await?;

            let outcome = gw.send(&to, &text).await;
            memory.close().await?;
            match outcome? {
                SendOutcome::Sent => println!("sent to {to}"),
                SendOutcome::Throttled(decision) => {
                    anyhow::bail!("not sent to {to}: throttled ({decision:?})")
                }
            }
        }
        Commands::Status => {
            println!("{} status\n", cfg.parley.name);
            println!("Config: {}", cli.config);
            println!();

            let store_ready = match Store::new(&cfg.memory).await {
                Ok(store) => store.is_ready().await,
                Err(e) => {
                    println!("  store error: {e}");
                    false
                }
            };
            println!(
                "  store ({}): {}",
                cfg.memory.db_path,
                if store_ready { "ready" } else { "unavailable" }
            );

            let bridge = BridgeClient::new(&cfg.bridge);
            println!(
                "  bridge ({}): {}",
                bridge.send_url(),
                if bridge.is_alive().await {
                    "alive"
                } else {
                    "not responding"
                }
            );
        }
    }

    Ok(())
}
