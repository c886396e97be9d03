use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::donation::RawDonation;

mod livepix;
pub mod simulator;

pub use livepix::LivePixClient;
pub use simulator::Simulator;

/// Inclusive date bounds forwarded to the source. Filtering is the source's job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl FetchRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, RangeError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(RangeError::Inverted { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, RangeError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(start) = self.start {
            pairs.push(("startDate", start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = self.end {
            pairs.push(("endDate", end.format(DATE_FORMAT).to_string()));
        }
        pairs
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, RangeError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map(Some)
        .map_err(|_| RangeError::InvalidDate(value.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("start date {start} is after end date {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("donation source unreachable: {0}")]
    Unavailable(String),
    #[error("donation source rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("donation source credentials were refused: {0}")]
    Unauthorized(String),
    #[error("donation source returned a malformed payload: {0}")]
    Malformed(String),
    #[error("donation source returned {observed} records, above the limit of {limit}")]
    BatchTooLarge { observed: usize, limit: usize },
}

/// Supplier of raw donation payloads.
#[async_trait]
pub trait DonationSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, range: &FetchRange) -> Result<Vec<RawDonation>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inclusive_bounds() {
        let range = FetchRange::parse(Some("2024-05-01"), Some(" 2024-05-31 ")).unwrap();
        assert_eq!(
            range.query_pairs(),
            vec![
                ("startDate", "2024-05-01".to_string()),
                ("endDate", "2024-05-31".to_string())
            ]
        );
        assert!(FetchRange::parse(Some("2024-05-01"), Some("2024-05-01")).is_ok());
    }

    #[test]
    fn blank_bounds_are_open() {
        let range = FetchRange::parse(Some(""), None).unwrap();
        assert_eq!(range, FetchRange::default());
        assert!(range.query_pairs().is_empty());
    }

    #[test]
    fn rejects_bad_dates_and_inverted_ranges() {
        assert!(matches!(
            FetchRange::parse(Some("01/05/2024"), None),
            Err(RangeError::InvalidDate(_))
        ));
        assert!(matches!(
            FetchRange::parse(Some("2024-06-01"), Some("2024-05-01")),
            Err(RangeError::Inverted { .. })
        ));
    }
}
