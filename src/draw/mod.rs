//! Ticket-based weighted draw over a ledger snapshot.
//!
//! Every ticket has the same probability of being picked, so a donor holding
//! N tickets is N times as likely to win as a donor holding one. The pool is
//! never materialised: each eligible record owns a contiguous run of ticket
//! positions in ledger order and a picked position is resolved by binary
//! search over the run boundaries.

use tracing::{debug, info};

use crate::donation::{MINOR_UNITS_PER_MAJOR, TICKET_UNIT, format_amount};
use crate::ledger::LedgerSnapshot;
use crate::models::donation::DonationRecord;
use crate::models::draw::DrawStateView;

pub mod picker;

pub use picker::{RngPicker, TicketPicker};

pub const MAX_COUNTDOWN_TICKS: u32 = 60;

pub struct TicketPool {
    snapshot: LedgerSnapshot,
    /// (exclusive end position, record index) for every record holding tickets.
    runs: Vec<(u64, usize)>,
    size: u64,
}

impl TicketPool {
    pub fn build(snapshot: &LedgerSnapshot) -> Self {
        let mut runs = Vec::new();
        let mut size = 0u64;
        for (index, record) in snapshot.iter().enumerate() {
            let tickets = record.tickets();
            if tickets == 0 {
                continue;
            }
            size += tickets;
            runs.push((size, index));
        }
        Self {
            snapshot: LedgerSnapshot::clone(snapshot),
            runs,
            size,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Record owning the ticket at `position`.
    pub fn winner_at(&self, position: u64) -> &DonationRecord {
        assert!(position < self.size, "Ticket position out of pool bounds");
        let run = self.runs.partition_point(|(end, _)| *end <= position);
        let (_, record_index) = self.runs[run];
        &self.snapshot[record_index]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawState {
    Idle,
    CountingDown { ticks_remaining: u32 },
    Resolved { winner: DonationRecord },
}

impl DrawState {
    pub fn is_drawing(&self) -> bool {
        matches!(self, DrawState::CountingDown { .. })
    }

    pub fn is_resolved(&self) -> bool {
        self.winner().is_some()
    }

    pub fn winner(&self) -> Option<&DonationRecord> {
        match self {
            DrawState::Resolved { winner } => Some(winner),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            DrawState::Idle => "Ready to draw.".to_string(),
            DrawState::CountingDown { ticks_remaining } => {
                format!("Drawing... {ticks_remaining}...")
            }
            DrawState::Resolved { winner } => {
                format!("Congratulations, {}! You are the winner!", winner.donor_name)
            }
        }
    }

    pub fn to_view(&self) -> DrawStateView {
        match self {
            DrawState::Idle => DrawStateView::Idle,
            DrawState::CountingDown { ticks_remaining } => DrawStateView::CountingDown {
                ticks_remaining: *ticks_remaining,
            },
            DrawState::Resolved { winner } => DrawStateView::Resolved {
                winner: winner.to_view(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    EmptyLedger,
    NoTickets,
}

impl Ineligibility {
    pub fn message(self) -> String {
        match self {
            Ineligibility::EmptyLedger => "There are no donations to draw from!".to_string(),
            Ineligibility::NoTickets => format!(
                "No donor has enough lucky numbers (minimum donation of {})!",
                format_amount(TICKET_UNIT * MINOR_UNITS_PER_MAJOR)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawStarted {
    pub draw_id: u64,
    pub ticks: u32,
    pub pool_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    Started(DrawStarted),
    NoEligibleDonors(Ineligibility),
    DrawInProgress,
}

struct PendingDraw {
    id: u64,
    winner: DonationRecord,
    ticks_remaining: u32,
}

/// Draw lifecycle: Idle → CountingDown → Resolved. The winner is chosen when
/// the draw starts; the countdown only paces when it becomes visible.
pub struct DrawEngine {
    countdown_ticks: u32,
    state: DrawState,
    pending: Option<PendingDraw>,
    next_draw_id: u64,
}

impl DrawEngine {
    pub fn new(countdown_ticks: u32) -> Self {
        assert!(countdown_ticks > 0, "Countdown needs at least one tick");
        assert!(
            countdown_ticks <= MAX_COUNTDOWN_TICKS,
            "Countdown exceeds tick limit"
        );
        Self {
            countdown_ticks,
            state: DrawState::Idle,
            pending: None,
            next_draw_id: 1,
        }
    }

    pub fn state(&self) -> &DrawState {
        &self.state
    }

    pub fn is_drawing(&self) -> bool {
        self.state.is_drawing()
    }

    pub fn draw(
        &mut self,
        snapshot: &LedgerSnapshot,
        picker: &mut dyn TicketPicker,
    ) -> DrawOutcome {
        if self.is_drawing() {
            return DrawOutcome::DrawInProgress;
        }
        if snapshot.is_empty() {
            return DrawOutcome::NoEligibleDonors(Ineligibility::EmptyLedger);
        }

        let pool = TicketPool::build(snapshot);
        if pool.is_empty() {
            return DrawOutcome::NoEligibleDonors(Ineligibility::NoTickets);
        }

        let position = picker.pick(pool.size());
        assert!(position < pool.size(), "Picker returned out-of-range index");
        let winner = pool.winner_at(position).clone();

        let id = self.next_draw_id;
        self.next_draw_id += 1;
        debug!(draw_id = id, position, pool_size = pool.size(), "Winner selected");
        info!(
            draw_id = id,
            pool_size = pool.size(),
            donors = snapshot.len(),
            "Draw started"
        );

        self.pending = Some(PendingDraw {
            id,
            winner,
            ticks_remaining: self.countdown_ticks,
        });
        self.state = DrawState::CountingDown {
            ticks_remaining: self.countdown_ticks,
        };

        DrawOutcome::Started(DrawStarted {
            draw_id: id,
            ticks: self.countdown_ticks,
            pool_size: pool.size(),
        })
    }

    /// Advances the countdown of draw `draw_id`. Returns the new state, or
    /// `None` when the draw is no longer pending.
    pub fn tick(&mut self, draw_id: u64) -> Option<DrawState> {
        let pending = self.pending.as_mut().filter(|pending| pending.id == draw_id)?;
        assert!(pending.ticks_remaining > 0, "Pending draw without ticks");
        pending.ticks_remaining -= 1;

        if pending.ticks_remaining > 0 {
            self.state = DrawState::CountingDown {
                ticks_remaining: pending.ticks_remaining,
            };
            return Some(self.state.clone());
        }

        let resolved = self.pending.take()?;
        info!(
            draw_id,
            winner_id = %resolved.winner.id,
            winner = %resolved.winner.donor_name,
            "Draw resolved"
        );
        self.state = DrawState::Resolved {
            winner: resolved.winner,
        };
        Some(self.state.clone())
    }

    /// Aborts a running countdown. Returns whether a draw was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                info!(draw_id = pending.id, "Draw cancelled");
                self.state = DrawState::Idle;
                true
            }
            None => false,
        }
    }

    /// Clears a resolved result. Returns whether there was one.
    pub fn acknowledge(&mut self) -> bool {
        if self.state.is_resolved() {
            self.state = DrawState::Idle;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.state = DrawState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::picker::FixedPicker;
    use super::*;
    use crate::ledger::Ledger;
    use crate::models::donation::RawDonation;

    fn raw(id: u64, cents: u64) -> RawDonation {
        RawDonation {
            id: Some(json!(id)),
            amount: Some(json!(cents)),
            ..RawDonation::default()
        }
    }

    fn snapshot(batch: &[RawDonation]) -> LedgerSnapshot {
        let mut ledger = Ledger::new();
        ledger.merge(batch);
        ledger.all()
    }

    fn run_to_resolution(engine: &mut DrawEngine, draw_id: u64) -> DonationRecord {
        loop {
            match engine.tick(draw_id).expect("draw pending") {
                DrawState::Resolved { winner } => return winner,
                DrawState::CountingDown { .. } => continue,
                DrawState::Idle => panic!("draw returned to idle"),
            }
        }
    }

    #[test]
    fn concrete_scenario_maps_positions_to_donors() {
        let snapshot = snapshot(&[raw(1, 1_000), raw(2, 2_500), raw(1, 1_000)]);
        assert_eq!(snapshot.len(), 2);

        let pool = TicketPool::build(&snapshot);
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.winner_at(0).id, "1");
        assert_eq!(pool.winner_at(1).id, "2");
        assert_eq!(pool.winner_at(2).id, "2");

        for (index, expected) in [(0, "1"), (1, "2"), (2, "2")] {
            let mut engine = DrawEngine::new(3);
            let mut picker = FixedPicker::new(vec![index]);
            let DrawOutcome::Started(started) = engine.draw(&snapshot, &mut picker) else {
                panic!("draw should start");
            };
            assert_eq!(started.pool_size, 3);
            assert_eq!(run_to_resolution(&mut engine, started.draw_id).id, expected);
        }
    }

    #[test]
    fn zero_ticket_donors_hold_no_positions() {
        let snapshot = snapshot(&[raw(1, 999), raw(2, 1_000), raw(3, 0), raw(4, 3_000)]);
        let pool = TicketPool::build(&snapshot);
        assert_eq!(pool.size(), 4);
        let winners: Vec<&str> = (0..pool.size())
            .map(|position| pool.winner_at(position).id.as_str())
            .collect();
        assert_eq!(winners, vec!["2", "4", "4", "4"]);
    }

    #[test]
    fn empty_ledger_stays_idle() {
        let mut engine = DrawEngine::new(3);
        let mut picker = RngPicker::seeded(1);
        let outcome = engine.draw(&LedgerSnapshot::default(), &mut picker);
        assert_eq!(
            outcome,
            DrawOutcome::NoEligibleDonors(Ineligibility::EmptyLedger)
        );
        assert_eq!(engine.state(), &DrawState::Idle);
        assert_eq!(picker.samples_drawn(), 0);
    }

    #[test]
    fn ledger_without_tickets_is_ineligible() {
        let snapshot = snapshot(&[raw(1, 500), raw(2, 999)]);
        let mut engine = DrawEngine::new(3);
        let outcome = engine.draw(&snapshot, &mut RngPicker::seeded(1));
        assert_eq!(outcome, DrawOutcome::NoEligibleDonors(Ineligibility::NoTickets));
        assert!(!engine.is_drawing());
        assert!(Ineligibility::NoTickets.message().contains("10.00"));
    }

    #[test]
    fn rejects_reentrant_draws() {
        let snapshot = snapshot(&[raw(1, 1_000)]);
        let mut engine = DrawEngine::new(2);
        let mut picker = RngPicker::seeded(3);
        let DrawOutcome::Started(started) = engine.draw(&snapshot, &mut picker) else {
            panic!("draw should start");
        };
        assert!(engine.is_drawing());
        assert_eq!(engine.draw(&snapshot, &mut picker), DrawOutcome::DrawInProgress);
        assert_eq!(
            engine.state(),
            &DrawState::CountingDown { ticks_remaining: 2 }
        );
        assert_eq!(run_to_resolution(&mut engine, started.draw_id).id, "1");
    }

    #[test]
    fn countdown_ticks_then_resolves() {
        let snapshot = snapshot(&[raw(1, 1_000)]);
        let mut engine = DrawEngine::new(3);
        let DrawOutcome::Started(started) = engine.draw(&snapshot, &mut RngPicker::seeded(9))
        else {
            panic!("draw should start");
        };
        assert_eq!(started.ticks, 3);
        assert_eq!(
            engine.tick(started.draw_id),
            Some(DrawState::CountingDown { ticks_remaining: 2 })
        );
        assert_eq!(
            engine.tick(started.draw_id),
            Some(DrawState::CountingDown { ticks_remaining: 1 })
        );
        let resolved = engine.tick(started.draw_id).expect("resolution");
        assert_eq!(resolved.winner().map(|winner| winner.id.as_str()), Some("1"));
        assert!(resolved.message().starts_with("Congratulations"));
        assert_eq!(engine.tick(started.draw_id), None);
    }

    #[test]
    fn stale_ticks_are_ignored_after_cancel() {
        let snapshot = snapshot(&[raw(1, 1_000), raw(2, 1_000)]);
        let mut engine = DrawEngine::new(2);
        let mut picker = RngPicker::seeded(5);
        let DrawOutcome::Started(first) = engine.draw(&snapshot, &mut picker) else {
            panic!("draw should start");
        };
        assert!(engine.cancel());
        assert_eq!(engine.state(), &DrawState::Idle);
        assert!(!engine.cancel());

        let DrawOutcome::Started(second) = engine.draw(&snapshot, &mut picker) else {
            panic!("draw should start");
        };
        assert_ne!(first.draw_id, second.draw_id);
        assert_eq!(engine.tick(first.draw_id), None);
        assert_eq!(
            engine.state(),
            &DrawState::CountingDown { ticks_remaining: 2 }
        );
    }

    #[test]
    fn new_draw_replaces_previous_winner_only_on_resolution() {
        let snapshot = snapshot(&[raw(1, 1_000), raw(2, 1_000)]);
        let mut engine = DrawEngine::new(1);
        let mut picker = FixedPicker::new(vec![0, 1]);

        let DrawOutcome::Started(first) = engine.draw(&snapshot, &mut picker) else {
            panic!("draw should start");
        };
        assert_eq!(run_to_resolution(&mut engine, first.draw_id).id, "1");

        let DrawOutcome::Started(second) = engine.draw(&snapshot, &mut picker) else {
            panic!("draw should start from resolved");
        };
        assert!(engine.state().winner().is_none());
        assert_eq!(run_to_resolution(&mut engine, second.draw_id).id, "2");

        assert!(engine.acknowledge());
        assert_eq!(engine.state(), &DrawState::Idle);
        assert!(!engine.acknowledge());
    }

    #[test]
    fn win_rate_tracks_ticket_share() {
        let snapshot = snapshot(&[raw(1, 10_000), raw(2, 1_000)]);
        let mut picker = RngPicker::seeded(0xD0_4A7E);
        let mut engine = DrawEngine::new(1);
        let mut wins: HashMap<String, u32> = HashMap::new();

        for _ in 0..22_000 {
            let DrawOutcome::Started(started) = engine.draw(&snapshot, &mut picker) else {
                panic!("draw should start");
            };
            let winner = run_to_resolution(&mut engine, started.draw_id);
            *wins.entry(winner.id).or_default() += 1;
        }

        let a = f64::from(wins["1"]);
        let b = f64::from(wins["2"]);
        let ratio = a / b;
        assert!(
            (8.5..=11.5).contains(&ratio),
            "expected ~10x win ratio, observed {ratio:.2}"
        );
    }
}
