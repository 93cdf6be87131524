//! Gateway: wires the intake poller, the rate limit ledger and the outbound
//! gate around one store and one bridge, and runs until Ctrl-C.

pub mod admin;
pub mod cutover;
pub mod dedup;
pub mod outbound;
pub mod poller;
pub mod ratelimit;


use crate::commands::{self, Command, CommandContext};
use admin::AdminCheck;
use cutover::CutoverClock;
use dedup::DedupCache;
use outbound::{OutboundGate, SendOutcome};
use parley_core::{
    config::Config,
    error::ParleyError,
    message::{AcceptedMessage, MessageClass},
    traits::{Bridge, ConversationState, MessageStore},
};
use parley_memory::{DeliveryLog, Store};
use poller::{IntakePoller, PollerParts};
use ratelimit::RateLimitLedger;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Capacity of the poller-to-dispatcher channel.
const INTAKE_CHANNEL_CAPACITY: usize = 256;

/// The central gateway between the inbound store and the bridge.
pub struct Gateway {
    pub(super) config: Config,
    pub(super) store: Store,
    pub(super) ledger: Arc<RateLimitLedger>,
    pub(super) poller: IntakePoller,
    pub(super) gate: OutboundGate,
    pub(super) uptime: Instant,
    rx: Mutex<Option<mpsc::Receiver<AcceptedMessage>>>,
}

impl Gateway {
    /// Build a gateway. Fixes the cutover boundary and verifies durable
    /// conversation state is reachable.
    pub async fn new(
        config: Config,
        store: Store,
        bridge: Arc<dyn Bridge>,
    ) -> Result<Self, ParleyError> {
        let cutover = CutoverClock::initialize(config.intake.cutover_grace())?;
        Self::with_cutover(config, store, bridge, cutover).await
    }

    /// [`new`](Self::new) with an explicit cutover clock.
    pub async fn with_cutover(
        config: Config,
        store: Store,
        bridge: Arc<dyn Bridge>,
        cutover: CutoverClock,
    ) -> Result<Self, ParleyError> {
        let messages = Arc::new(store.clone());
        Self::assemble(config, store, messages, bridge, cutover).await
    }

    /// Wire the gateway, with intake reading from `messages`.
    async fn assemble(
        config: Config,
        store: Store,
        messages: Arc<dyn MessageStore>,
        bridge: Arc<dyn Bridge>,
        cutover: CutoverClock,
    ) -> Result<Self, ParleyError> {
        store.initialize().await?;

        let shared = Arc::new(store.clone());
        let ledger = Arc::new(RateLimitLedger::new(config.rate_limit.clone()));
        let admin = Arc::new(AdminCheck::new(
            shared.clone(),
            config.bridge.domain_suffix.clone(),
        ));
        let dedup = Arc::new(DedupCache::new(shared));

        let (tx, rx) = mpsc::channel(INTAKE_CHANNEL_CAPACITY);
        let poller = IntakePoller::new(
            PollerParts {
                store: messages,
                dedup,
                ledger: ledger.clone(),
                admin: admin.clone(),
                cutover,
                command_prefix: config.intake.command_prefix.clone(),
            },
            tx,
        );
        let gate = OutboundGate::new(
            bridge,
            ledger.clone(),
            admin,
            Some(DeliveryLog::new(store.pool().clone())),
            config.bridge.timeout(),
        );

        Ok(Self {
            config,
            store,
            ledger,
            poller,
            gate,
            uptime: Instant::now(),
            rx: Mutex::new(Some(rx)),
        })
    }

    /// Send an unsolicited message, gated by the rate limit ledger.
    pub async fn send(&self, recipient: &str, text: &str) -> Result<SendOutcome, ParleyError> {
        let class = MessageClass::classify(text, &self.config.intake.command_prefix);
        self.gate.send(recipient, text, class).await
    }

    /// Run the main event loop until Ctrl-C.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await
    }

    /// Run the main event loop until `shutdown` resolves.
    pub async fn run_until(
        self: Arc<Self>,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> anyhow::Result<()> {
        let mut rx = self
            .rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| anyhow::anyhow!("gateway is already running"))?;

        info!(
            "{} gateway running | prefix: {} | poll: {}ms",
            self.config.parley.name,
            self.config.intake.command_prefix,
            self.config.intake.poll_interval_ms
        );
        self.poller.start(self.config.intake.poll_interval());

        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                incoming = rx.recv() => {
                    let Some(incoming) = incoming else { break };
                    self.dispatch(&mut handlers, incoming);
                }
                Some(done) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = done {
                        warn!("message handler ended abnormally: {e}");
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        self.shutdown(rx, handlers).await;
        Ok(())
    }

    /// Stop the poller, let in-flight work finish, then close durable state.
    ///
    /// Messages the last tick emits are still dispatched: they are already
    /// marked processed and would otherwise be lost.
    async fn shutdown(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<AcceptedMessage>,
        mut handlers: JoinSet<()>,
    ) {
        info!("Shutting down...");
        if self.poller.is_running() {
            self.poller.stop();
        }

        let drain = self.poller.drain();
        tokio::pin!(drain);
        loop {
            tokio::select! {
                _ = &mut drain => break,
                Some(incoming) = rx.recv() => self.dispatch(&mut handlers, incoming),
            }
        }
        while let Ok(incoming) = rx.try_recv() {
            self.dispatch(&mut handlers, incoming);
        }
        info!("intake stopped at {}", self.poller.cursor());

        while let Some(done) = handlers.join_next().await {
            if let Err(e) = done {
                warn!("message handler ended abnormally: {e}");
            }
        }
        if let Err(e) = self.store.close().await {
            warn!("failed to close conversation state: {e}");
        }
        info!("Shutdown complete.");
    }

    fn dispatch(self: &Arc<Self>, handlers: &mut JoinSet<()>, incoming: AcceptedMessage) {
        let gw = self.clone();
        handlers.spawn(async move {
            gw.handle_message(incoming).await;
        });
    }

    /// Handle one accepted message. Returns the reply text when one was sent.
    pub async fn handle_message(&self, accepted: AcceptedMessage) -> Option<String> {
        let prefix = &self.config.intake.command_prefix;
        let Some(cmd) = Command::parse(&accepted.record.body, prefix) else {
            debug!(
                "{} message {} needs no reply",
                accepted.class.as_str(),
                accepted.record.id
            );
            return None;
        };

        let ctx = CommandContext {
            store: &self.store,
            ledger: &self.ledger,
            message: &accepted,
            bot_name: &self.config.parley.name,
            prefix,
            uptime: &self.uptime,
        };
        let reply = commands::handle(cmd, &ctx).await;

        match self.gate.reply(&accepted, &reply).await {
            Ok(()) => Some(reply),
            Err(e) => {
                warn!(
                    "reply to {} in {} not delivered: {e}",
                    accepted.record.id, accepted.record.conversation_id
                );
                None
            }
        }
    }
}
