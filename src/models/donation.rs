use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::donation::{MINOR_UNITS_PER_MAJOR, format_amount, ticket_count};

/// Donation payload as delivered by the source, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDonation {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub username: Option<Value>,
    /// Minor currency units (cents).
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<Value>,
}

impl RawDonation {
    /// Decodes one element of a source batch. Elements that are not objects
    /// become an empty payload, which normalization rejects for its missing id.
    pub fn from_value_lossy(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

/// Admitted donation. Never mutated once it is in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationRecord {
    pub id: String,
    pub donor_name: String,
    pub amount_cents: u64,
    pub message: String,
    pub received_at: Option<DateTime<Utc>>,
}

impl DonationRecord {
    /// Amount in major currency units.
    pub fn amount(&self) -> f64 {
        self.amount_cents as f64 / MINOR_UNITS_PER_MAJOR as f64
    }

    pub fn tickets(&self) -> u64 {
        ticket_count(self.amount_cents)
    }

    pub fn to_view(&self) -> DonationView {
        DonationView {
            id: self.id.clone(),
            donor_name: self.donor_name.clone(),
            amount: self.amount(),
            amount_formatted: format_amount(self.amount_cents),
            message: self.message.clone(),
            received_at: self.received_at,
            tickets: self.tickets(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonationView {
    pub id: String,
    pub donor_name: String,
    pub amount: f64,
    pub amount_formatted: String,
    pub message: String,
    pub received_at: Option<DateTime<Utc>>,
    pub tickets: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
    pub count: usize,
    pub total_tickets: u64,
    pub donations: Vec<DonationView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectionView {
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResponse {
    pub added: Vec<DonationView>,
    pub skipped: usize,
    pub rejected: usize,
    pub rejections: Vec<RejectionView>,
    pub ledger_count: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default, rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(default, rename = "endDate")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulateRequest {
    #[serde(default)]
    pub count: Option<usize>,
}
