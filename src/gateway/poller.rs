//! Intake poller: fetches new rows, filters them and emits the survivors.
//!
//! Every examined row advances the cursor, whatever its outcome, so a row
//! refused once is never fetched again.

use super::admin::AdminCheck;
use super::cutover::{CutoverClock, ProcessingCursor};
use super::dedup::DedupCache;
use super::ratelimit::RateLimitLedger;
use chrono::{DateTime, Utc};
use parley_core::{
    message::{AcceptedMessage, InboundMessageRecord, MessageClass},
    traits::MessageStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// What happened to one examined row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Malformed,
    /// At or before the cutover boundary.
    Stale,
    FromSelf,
    Duplicate,
    Throttled,
    Accepted,
}

/// Per-tick counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick did not run (store not ready or another tick in flight).
    pub skipped: bool,
    pub examined: usize,
    pub accepted: usize,
    pub throttled: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub from_self: usize,
    pub malformed: usize,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    fn count(&mut self, outcome: RowOutcome) {
        self.examined += 1;
        match outcome {
            RowOutcome::Malformed => self.malformed += 1,
            RowOutcome::Stale => self.stale += 1,
            RowOutcome::FromSelf => self.from_self += 1,
            RowOutcome::Duplicate => self.duplicates += 1,
            RowOutcome::Throttled => self.throttled += 1,
            RowOutcome::Accepted => self.accepted += 1,
        }
    }
}

/// Collaborators the poller filters rows through.
pub struct PollerParts {
    pub store: Arc<dyn MessageStore>,
    pub dedup: Arc<DedupCache>,
    pub ledger: Arc<RateLimitLedger>,
    pub admin: Arc<AdminCheck>,
    pub cutover: CutoverClock,
    pub command_prefix: String,
}

struct PollerInner {
    parts: PollerParts,
    cursor: Mutex<ProcessingCursor>,
    tx: mpsc::Sender<AcceptedMessage>,
    ticking: AtomicBool,
}

/// Clears the in-flight flag when a tick ends, even on panic.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One spawned tick loop and the flag that stops it.
struct LoopRun {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl LoopRun {
    fn is_active(&self) -> bool {
        !*self.shutdown.borrow() && !self.handle.is_finished()
    }
}

#[derive(Default)]
struct Runs {
    current: Option<LoopRun>,
    /// Stopped loops that may still be finishing a tick.
    retired: Vec<JoinHandle<()>>,
}

/// Periodic intake poller. Accepted messages go out on the `mpsc` sender.
pub struct IntakePoller {
    inner: Arc<PollerInner>,
    runs: Mutex<Runs>,
}

impl IntakePoller {
    pub fn new(parts: PollerParts, tx: mpsc::Sender<AcceptedMessage>) -> Self {
        let cursor = parts.cutover.cursor();
        Self {
            inner: Arc::new(PollerInner {
                parts,
                cursor: Mutex::new(cursor),
                tx,
                ticking: AtomicBool::new(false),
            }),
            runs: Mutex::new(Runs::default()),
        }
    }

    /// Current cursor position.
    pub fn cursor(&self) -> DateTime<Utc> {
        self.inner.cursor()
    }

    /// Whether a loop is ticking and has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.lock_runs()
            .current
            .as_ref()
            .is_some_and(LoopRun::is_active)
    }

    fn lock_runs(&self) -> MutexGuard<'_, Runs> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start ticking every `interval`. A second call while running is a no-op.
    ///
    /// A loop that was stopped but is still finishing its tick is retired and
    /// a fresh one is spawned; the tick guard keeps the two from overlapping.
    pub fn start(&self, interval: Duration) {
        let mut runs = self.lock_runs();
        if runs.current.as_ref().is_some_and(LoopRun::is_active) {
            warn!("intake poller already running, ignoring start");
            return;
        }
        if let Some(stale) = runs.current.take() {
            if !stale.handle.is_finished() {
                runs.retired.push(stale.handle);
            }
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let inner = self.inner.clone();

        info!(
            "intake poller starting | interval: {}ms | cutover: {}",
            interval.as_millis(),
            inner.parts.cutover.boundary_string()
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        if inner.poll_once().await.skipped {
                            trace!("intake tick skipped");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            info!("intake poller stopped");
        });
        runs.current = Some(LoopRun { handle, shutdown });
    }

    /// Stop ticking. Does not wait for an in-flight tick; see [`drain`](Self::drain).
    pub fn stop(&self) {
        if let Some(run) = &self.lock_runs().current {
            run.shutdown.send_replace(true);
        }
    }

    /// Wait for stopped loops (and any in-flight tick) to finish.
    /// Only meaningful after [`stop`](Self::stop).
    pub async fn drain(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut runs = self.lock_runs();
            let mut handles = std::mem::take(&mut runs.retired);
            handles.extend(runs.current.take().map(|run| run.handle));
            handles
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("intake poller task ended abnormally: {e}");
            }
        }
    }

    /// Run one tick now. A no-op if another tick is in flight.
    #[cfg(test)]
    pub async fn poll_once(&self) -> TickReport {
        self.inner.poll_once().await
    }
}

impl PollerInner {
    fn cursor(&self) -> DateTime<Utc> {
        self.cursor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_processed()
    }

    fn advance(&self, ts: DateTime<Utc>) {
        self.cursor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .advance(ts);
    }

    async fn poll_once(&self) -> TickReport {
        if self.ticking.swap(true, Ordering::SeqCst) {
            debug!("intake tick already in progress, skipping");
            return TickReport::skipped();
        }
        let _guard = TickGuard(&self.ticking);
        self.tick().await
    }

    async fn tick(&self) -> TickReport {
        if !self.parts.store.is_ready().await {
            debug!("message store not ready, skipping tick");
            return TickReport::skipped();
        }
        self.parts.ledger.roll_day(Utc::now());

        let since = self.cursor();
        let rows = match self.parts.store.get_messages_since(since).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("intake fetch failed, retrying next tick: {e}");
                Vec::new()
            }
        };

        let mut report = TickReport::default();
        for row in &rows {
            let outcome = self.examine(row).await;
            debug!("intake {} from {}: {outcome:?}", row.id, row.conversation_id);
            report.count(outcome);
            self.advance(row.timestamp);
        }

        if report.examined > 0 {
            info!(
                "intake tick: {} examined, {} accepted, {} throttled, {} duplicate, \
                 {} stale, {} own, {} malformed",
                report.examined,
                report.accepted,
                report.throttled,
                report.duplicates,
                report.stale,
                report.from_self,
                report.malformed
            );
        }
        report
    }

    async fn examine(&self, row: &InboundMessageRecord) -> RowOutcome {
        if row.is_malformed() {
            warn!("skipping malformed inbound row (id '{}')", row.id);
            return RowOutcome::Malformed;
        }
        if !self.parts.cutover.is_after_cutover(row.timestamp) {
            return RowOutcome::Stale;
        }
        if row.is_from_self {
            return RowOutcome::FromSelf;
        }
        if self.parts.dedup.has(row).await {
            return RowOutcome::Duplicate;
        }

        let class = MessageClass::classify(&row.body, &self.parts.command_prefix);
        let privilege = self.parts.admin.privilege_for(row.author()).await;

        let decision = self.parts.ledger.try_acquire(
            &row.conversation_id,
            privilege,
            class,
            row.timestamp,
        );
        if !decision.is_allowed() {
            info!(
                "throttled {} {} in {}: {decision:?}",
                class.as_str(),
                row.id,
                row.conversation_id
            );
            self.parts.dedup.mark_processed(row).await;
            return RowOutcome::Throttled;
        }

        self.parts.dedup.mark_processed(row).await;
        let accepted = AcceptedMessage {
            record: row.clone(),
            class,
            privilege,
        };
        if self.tx.send(accepted).await.is_err() {
            warn!("intake receiver dropped, message {} not dispatched", row.id);
        }
        RowOutcome::Accepted
    }
}
