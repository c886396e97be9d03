use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::donation::{ValidationError, normalize};
use crate::models::donation::{DonationRecord, RawDonation};

/// Shared, immutable view of the ledger in admission order.
pub type LedgerSnapshot = Arc<Vec<DonationRecord>>;

pub const MAX_LEDGER_ENTRIES: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Index of the offending payload inside the merged batch.
    pub position: usize,
    pub reason: ValidationError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub added: Vec<DonationRecord>,
    pub skipped: usize,
    pub rejected: usize,
    pub rejections: Vec<Rejection>,
}

impl MergeResult {
    pub fn received(&self) -> usize {
        self.added.len() + self.skipped + self.rejected
    }
}

/// Deduplicated, append-only donation store. `merge` is the only mutation
/// path outside of an explicit `reset`.
#[derive(Debug)]
pub struct Ledger {
    records: LedgerSnapshot,
    ids: HashSet<String>,
    total_tickets: u64,
    capacity: usize,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::with_capacity_limit(MAX_LEDGER_ENTRIES)
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger admitting at most `capacity` records. Later records are
    /// rejected with `LedgerFull`.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        assert!(capacity > 0, "Ledger capacity must be positive");
        assert!(
            capacity <= MAX_LEDGER_ENTRIES,
            "Ledger capacity exceeds entry limit"
        );
        Self {
            records: LedgerSnapshot::default(),
            ids: HashSet::new(),
            total_tickets: 0,
            capacity,
        }
    }

    pub fn merge<'a, I>(&mut self, batch: I) -> MergeResult
    where
        I: IntoIterator<Item = &'a RawDonation>,
    {
        let mut result = MergeResult::default();

        for (position, raw) in batch.into_iter().enumerate() {
            let record = match normalize(raw) {
                Ok(record) => record,
                Err(reason) => {
                    warn!(position, %reason, "Rejecting malformed donation");
                    result.rejected += 1;
                    result.rejections.push(Rejection { position, reason });
                    continue;
                }
            };

            if self.ids.contains(&record.id) {
                debug!(id = %record.id, "Skipping duplicate donation");
                result.skipped += 1;
                continue;
            }

            if self.ids.len() >= self.capacity {
                warn!(position, id = %record.id, "Ledger is full, rejecting donation");
                result.rejected += 1;
                result.rejections.push(Rejection {
                    position,
                    reason: ValidationError::LedgerFull,
                });
                continue;
            }
            self.ids.insert(record.id.clone());
            self.total_tickets += record.tickets();
            result.added.push(record);
        }

        if !result.added.is_empty() {
            // Clones only when a reader still holds the previous snapshot.
            Arc::make_mut(&mut self.records).extend(result.added.iter().cloned());
        }

        assert_eq!(
            self.records.len(),
            self.ids.len(),
            "Ledger index out of sync with records"
        );
        result
    }

    pub fn all(&self) -> LedgerSnapshot {
        Arc::clone(&self.records)
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn total_tickets(&self) -> u64 {
        self.total_tickets
    }

    pub fn reset(&mut self) {
        self.records = LedgerSnapshot::default();
        self.ids.clear();
        self.total_tickets = 0;
    }
}
