//! Session-scoped owner of the ledger, the draw engine and the countdown timer.
//!
//! Merges take the ledger write lock for the whole batch and draws read a
//! snapshot under the read lock, so a half-applied batch is never observable.
//! At most one countdown task exists per session and at most one source fetch
//! is in flight.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::config::DrawConfig;
use crate::draw::{DrawEngine, DrawOutcome, DrawState, TicketPicker};
use crate::ledger::{Ledger, LedgerSnapshot, MergeResult};
use crate::models::donation::RawDonation;
use crate::source::simulator::MAX_BATCH_SIZE;
use crate::source::{DonationSource, FetchRange, Simulator, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),
    #[error("a donation fetch is already in progress")]
    FetchInProgress,
    #[error("the donation simulator is disabled")]
    SimulatorDisabled,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source: &'static str,
    pub fetched: usize,
    pub merge: MergeResult,
}

impl IngestReport {
    pub fn message(&self) -> String {
        format!(
            "Fetched {} donations from the {}. Added {} new.",
            self.fetched,
            self.source,
            self.merge.added.len()
        )
    }
}

pub struct RaffleSession {
    ledger: RwLock<Ledger>,
    engine: Mutex<DrawEngine>,
    picker: Mutex<Box<dyn TicketPicker>>,
    source: Arc<dyn DonationSource>,
    simulator: Option<Arc<Simulator>>,
    fetch_guard: tokio::sync::Mutex<()>,
    countdown: Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
    state_tx: watch::Sender<DrawState>,
}

impl RaffleSession {
    pub fn new(
        source: Arc<dyn DonationSource>,
        simulator: Option<Arc<Simulator>>,
        picker: Box<dyn TicketPicker>,
        draw: &DrawConfig,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(DrawState::Idle);
        Arc::new(Self {
            ledger: RwLock::new(Ledger::new()),
            engine: Mutex::new(DrawEngine::new(draw.countdown_ticks)),
            picker: Mutex::new(picker),
            source,
            simulator,
            fetch_guard: tokio::sync::Mutex::new(()),
            countdown: Mutex::new(None),
            tick_interval: draw.tick_interval(),
            state_tx,
        })
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn simulator_enabled(&self) -> bool {
        self.simulator.is_some()
    }

    pub fn merge(&self, batch: &[RawDonation]) -> MergeResult {
        let mut ledger = self.ledger.write();
        let result = ledger.merge(batch);
        info!(
            added = result.added.len(),
            skipped = result.skipped,
            rejected = result.rejected,
            ledger_count = ledger.count(),
            "Merged donation batch"
        );
        result
    }

    /// Fetches from the configured source and merges the result. The ledger is
    /// untouched when the source fails.
    pub async fn refresh(&self, range: &FetchRange) -> Result<IngestReport, SessionError> {
        let _in_flight = self
            .fetch_guard
            .try_lock()
            .map_err(|_| SessionError::FetchInProgress)?;
        let batch = match self.source.fetch(range).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(source = self.source.name(), "Donation fetch failed: {err}");
                return Err(err.into());
            }
        };
        let merge = self.merge(&batch);
        Ok(IngestReport {
            source: self.source.name(),
            fetched: batch.len(),
            merge,
        })
    }

    pub fn simulate(&self, count: usize) -> Result<IngestReport, SessionError> {
        let simulator = self
            .simulator
            .as_ref()
            .ok_or(SessionError::SimulatorDisabled)?;
        let batch = simulator.generate(count.min(MAX_BATCH_SIZE), &FetchRange::default());
        let merge = self.merge(&batch);
        Ok(IngestReport {
            source: simulator.name(),
            fetched: batch.len(),
            merge,
        })
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.read().all()
    }

    pub fn count(&self) -> usize {
        self.ledger.read().count()
    }

    pub fn total_tickets(&self) -> u64 {
        self.ledger.read().total_tickets()
    }

    pub fn state(&self) -> DrawState {
        self.engine.lock().state().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DrawState> {
        self.state_tx.subscribe()
    }

    /// Selects the winner immediately and starts the countdown that reveals it.
    pub fn draw(self: &Arc<Self>) -> DrawOutcome {
        let snapshot = self.snapshot();
        let mut engine = self.engine.lock();
        let outcome = {
            let mut picker = self.picker.lock();
            let outcome = engine.draw(&snapshot, &mut **picker);
            debug!(samples_drawn = picker.samples_drawn(), "Ticket picker consulted");
            outcome
        };

        if let DrawOutcome::Started(started) = &outcome {
            self.state_tx.send_replace(engine.state().clone());
            let handle = tokio::spawn(run_countdown(
                Arc::downgrade(self),
                started.draw_id,
                self.tick_interval,
            ));
            if let Some(previous) = self.countdown.lock().replace(handle) {
                previous.abort();
            }
        }
        outcome
    }

    pub fn cancel_draw(&self) -> bool {
        // Draws install their countdown handle under this same lock.
        let mut engine = self.engine.lock();
        let cancelled = engine.cancel();
        if cancelled {
            self.abort_countdown();
            self.state_tx.send_replace(engine.state().clone());
        }
        cancelled
    }

    pub fn acknowledge(&self) -> bool {
        let mut engine = self.engine.lock();
        let acknowledged = engine.acknowledge();
        if acknowledged {
            self.state_tx.send_replace(engine.state().clone());
        }
        acknowledged
    }

    /// Full session restart: clears the ledger and any draw.
    pub fn reset(&self) {
        let mut engine = self.engine.lock();
        self.abort_countdown();
        self.ledger.write().reset();
        engine.reset();
        self.state_tx.send_replace(DrawState::Idle);
        info!("Session reset");
    }

    pub fn shutdown(&self) {
        self.abort_countdown();
    }

    fn abort_countdown(&self) {
        if let Some(handle) = self.countdown.lock().take() {
            handle.abort();
        }
    }

    fn advance(&self, draw_id: u64) -> Option<DrawState> {
        let mut engine = self.engine.lock();
        let state = engine.tick(draw_id)?;
        self.state_tx.send_replace(state.clone());
        Some(state)
    }
}

impl Drop for RaffleSession {
    fn drop(&mut self) {
        if let Some(handle) = self.countdown.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_countdown(session: Weak<RaffleSession>, draw_id: u64, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(session) = session.upgrade() else {
            return;
        };
        match session.advance(draw_id) {
            Some(state) if state.is_resolved() => return,
            Some(_) => continue,
            None => return,
        }
    }
}
