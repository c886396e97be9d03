use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;

use super::{DonationSource, FetchRange, SourceError};
use crate::models::donation::RawDonation;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const MAX_BATCH_SIZE: usize = 500;

const MIN_AMOUNT_CENTS: u64 = 100;
const MAX_AMOUNT_CENTS: u64 = 20_000;

const DONOR_NAMES: &[&str] = &[
    "Ana", "Bruno", "Carla", "Diego", "Elisa", "Felipe", "Gabi", "Heitor", "Iris", "Joao",
];

const MESSAGES: &[&str] = &[
    "Great stream!",
    "Good luck everyone",
    "Sending some love",
    "Let's go!",
];

/// Produces raw donations shaped like the LivePix payloads, without network
/// access. Ids are unique for the lifetime of the simulator.
pub struct Simulator {
    rng: Mutex<ChaCha8Rng>,
    next_id: AtomicU64,
    batch_size: usize,
}

impl Simulator {
    pub fn new(seed: u64, batch_size: usize) -> Self {
        assert!(batch_size > 0, "Simulator batch size must be positive");
        assert!(
            batch_size <= MAX_BATCH_SIZE,
            "Simulator batch size exceeds limit"
        );
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            next_id: AtomicU64::new(1),
            batch_size,
        }
    }

    pub fn generate(&self, count: usize, range: &FetchRange) -> Vec<RawDonation> {
        assert!(count <= MAX_BATCH_SIZE, "Simulated batch too large");
        let mut rng = self.rng.lock();
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
            let username = if rng.gen_bool(0.85) {
                DONOR_NAMES.choose(&mut *rng).map(|name| json!(name))
            } else {
                None
            };
            let message = if rng.gen_bool(0.7) {
                MESSAGES.choose(&mut *rng).map(|message| json!(message))
            } else {
                None
            };
            let amount = rng.gen_range(MIN_AMOUNT_CENTS..=MAX_AMOUNT_CENTS);
            let created_at = simulated_timestamp(&mut *rng, range);

            batch.push(RawDonation {
                id: Some(json!(format!("sim-{id}"))),
                username,
                amount: Some(json!(amount)),
                message,
                created_at: Some(json!(created_at)),
            });
        }
        batch
    }
}

fn simulated_timestamp(rng: &mut ChaCha8Rng, range: &FetchRange) -> String {
    let now = Utc::now();
    let latest = range
        .end
        .and_then(|end| end.and_hms_opt(0, 0, 0))
        .map(|end| end.and_utc())
        .map(|end| (end + ChronoDuration::days(1) - ChronoDuration::seconds(1)).min(now))
        .unwrap_or(now);
    let earliest = range
        .start
        .and_then(|start| start.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc())
        .unwrap_or(latest - ChronoDuration::hours(1))
        .min(latest);
    let span = (latest - earliest).num_seconds().max(0);
    let offset = rng.gen_range(0..=span);
    (earliest + ChronoDuration::seconds(offset)).to_rfc3339()
}

#[async_trait]
impl DonationSource for Simulator {
    fn name(&self) -> &'static str {
        "simulator"
    }

    async fn fetch(&self, range: &FetchRange) -> Result<Vec<RawDonation>, SourceError> {
        Ok(self.generate(self.batch_size, range))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate};

    use super::*;
    use crate::donation::normalize;

    #[test]
    fn generated_payloads_normalize_cleanly() {
        let simulator = Simulator::new(11, DEFAULT_BATCH_SIZE);
        let batch = simulator.generate(50, &FetchRange::default());
        assert_eq!(batch.len(), 50);
        for raw in &batch {
            let record = normalize(raw).expect("simulated donation is valid");
            assert!((MIN_AMOUNT_CENTS..=MAX_AMOUNT_CENTS).contains(&record.amount_cents));
            assert!(record.received_at.is_some());
        }
    }

    #[test]
    fn ids_never_repeat_across_batches() {
        let simulator = Simulator::new(11, DEFAULT_BATCH_SIZE);
        let first = simulator.generate(3, &FetchRange::default());
        let second = simulator.generate(3, &FetchRange::default());
        let ids: std::collections::HashSet<_> = first
            .iter()
            .chain(second.iter())
            .map(|raw| raw.id.clone().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn timestamps_respect_the_range() {
        let simulator = Simulator::new(3, DEFAULT_BATCH_SIZE);
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let range = FetchRange::new(Some(start), Some(end)).unwrap();
        for raw in simulator.generate(20, &range) {
            let stamp = DateTime::parse_from_rfc3339(raw.created_at.unwrap().as_str().unwrap())
                .unwrap()
                .date_naive();
            assert!(stamp >= start && stamp <= end, "{stamp} outside range");
        }
    }

    #[tokio::test]
    async fn fetch_yields_configured_batch() {
        let simulator = Simulator::new(1, 4);
        let batch = simulator.fetch(&FetchRange::default()).await.unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(simulator.name(), "simulator");
    }
}
