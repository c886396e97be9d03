use chrono::{DateTime, Utc};
use serde_json::{Number, Value};

use crate::models::donation::{DonationRecord, RawDonation};

pub const DEFAULT_DONOR_NAME: &str = "Anonymous Donor";
pub const DEFAULT_MESSAGE: &str = "No message";

/// Source amounts arrive in cents.
pub const MINOR_UNITS_PER_MAJOR: u64 = 100;
/// Currency units (major) granting one ticket.
pub const TICKET_UNIT: u64 = 10;
pub const TICKET_UNIT_MINOR: u64 = TICKET_UNIT * MINOR_UNITS_PER_MAJOR;
pub const MAX_AMOUNT_MINOR: u64 = 1_000_000_000_000;
pub const MAX_ID_LEN: usize = 128;
pub const MAX_DONOR_NAME_LEN: usize = 128;
pub const MAX_MESSAGE_LEN: usize = 1_024;

/// Largest magnitude below which every integral `f64` is exact.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

const _: () = assert!(MAX_AMOUNT_MINOR < (1u64 << 53));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("donation id is missing")]
    MissingId,
    #[error("donation id must be a string or a number")]
    InvalidId,
    #[error("donation id exceeds {MAX_ID_LEN} characters")]
    IdTooLong,
    #[error("donation amount is missing")]
    MissingAmount,
    #[error("donation amount is not a whole number of cents: {0}")]
    InvalidAmount(String),
    #[error("donation amount is negative")]
    NegativeAmount,
    #[error("donation amount exceeds {MAX_AMOUNT_MINOR} cents")]
    AmountOutOfRange,
    #[error("ledger is full, donation not admitted")]
    LedgerFull,
}

pub fn normalize(raw: &RawDonation) -> Result<DonationRecord, ValidationError> {
    let id = canonicalize_id(raw.id.as_ref())?;
    let amount_cents = parse_amount_cents(raw.amount.as_ref())?;
    let donor_name = canonicalize_text(raw.username.as_ref(), MAX_DONOR_NAME_LEN)
        .unwrap_or_else(|| DEFAULT_DONOR_NAME.to_string());
    let message = canonicalize_text(raw.message.as_ref(), MAX_MESSAGE_LEN)
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
    let received_at = raw
        .created_at
        .as_ref()
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    Ok(DonationRecord {
        id,
        donor_name,
        amount_cents,
        message,
        received_at,
    })
}

pub fn ticket_count(amount_cents: u64) -> u64 {
    amount_cents / TICKET_UNIT_MINOR
}

pub fn format_amount(amount_cents: u64) -> String {
    format!(
        "{}.{:02}",
        amount_cents / MINOR_UNITS_PER_MAJOR,
        amount_cents % MINOR_UNITS_PER_MAJOR
    )
}

pub fn canonicalize_id(value: Option<&Value>) -> Result<String, ValidationError> {
    let id = match value {
        None | Some(Value::Null) => return Err(ValidationError::MissingId),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => numeric_id(number),
        Some(_) => return Err(ValidationError::InvalidId),
    };
    if id.is_empty() {
        return Err(ValidationError::MissingId);
    }
    if id.chars().count() > MAX_ID_LEN {
        return Err(ValidationError::IdTooLong);
    }
    Ok(id)
}

/// Integral floats share the key of the matching integer, so `1.0` and `1`
/// are the same donation.
fn numeric_id(number: &Number) -> String {
    if number.is_f64() {
        if let Some(float) = number.as_f64() {
            if float.is_finite() && float.fract() == 0.0 && float.abs() < MAX_EXACT_FLOAT {
                return format!("{}", float as i64);
            }
        }
    }
    number.to_string()
}

pub fn parse_amount_cents(value: Option<&Value>) -> Result<u64, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingAmount),
        Some(Value::Number(number)) => {
            if let Some(cents) = number.as_u64() {
                return bounded(cents);
            }
            if number.as_i64().is_some() {
                return Err(ValidationError::NegativeAmount);
            }
            match number.as_f64() {
                Some(float) => amount_from_f64(float, &number.to_string()),
                None => Err(ValidationError::InvalidAmount(number.to_string())),
            }
        }
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::MissingAmount);
            }
            if let Ok(cents) = trimmed.parse::<u64>() {
                return bounded(cents);
            }
            let float = trimmed
                .parse::<f64>()
                .map_err(|_| ValidationError::InvalidAmount(trimmed.to_string()))?;
            amount_from_f64(float, trimmed)
        }
        Some(other) => Err(ValidationError::InvalidAmount(other.to_string())),
    }
}

fn amount_from_f64(float: f64, original: &str) -> Result<u64, ValidationError> {
    if !float.is_finite() || float.fract() != 0.0 {
        return Err(ValidationError::InvalidAmount(original.to_string()));
    }
    if float < 0.0 {
        return Err(ValidationError::NegativeAmount);
    }
    if float > MAX_AMOUNT_MINOR as f64 {
        return Err(ValidationError::AmountOutOfRange);
    }
    Ok(float as u64)
}

fn bounded(cents: u64) -> Result<u64, ValidationError> {
    if cents > MAX_AMOUNT_MINOR {
        return Err(ValidationError::AmountOutOfRange);
    }
    Ok(cents)
}

/// Non-string values are treated as absent.
fn canonicalize_text(value: Option<&Value>, max_chars: usize) -> Option<String> {
    assert!(max_chars > 0, "Text bound must be positive");
    let trimmed = value?.as_str()?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}
