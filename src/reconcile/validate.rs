use chrono::NaiveDate;

use crate::config::TrackerConfig;
use crate::error::{PollError, Result};
use crate::models::{PollRecord, RawPoll};

const DATE_FORMAT: &str = "%Y-%m-%d";

// Strict YYYY-MM-DD; chrono alone would also take "2025-6-1"
pub fn parse_canonical_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

fn reject(raw: &RawPoll, reason: impl Into<String>) -> PollError {
    let (pollster, date, state) = raw.triple();
    PollError::InvalidRecord {
        pollster,
        date,
        state,
        reason: reason.into(),
    }
}

/// Checks a raw record and, when it passes, converts it into a store-shaped
/// record (no id yet). Pure: no I/O, no side effects.
pub fn validate(raw: &RawPoll, config: &TrackerConfig) -> Result<PollRecord> {
    let pollster = raw.pollster().ok_or_else(|| reject(raw, "missing pollster"))?;
    let date_text = raw.date().ok_or_else(|| reject(raw, "missing date"))?;

    let date = parse_canonical_date(date_text)
        .ok_or_else(|| reject(raw, format!("date '{}' is not YYYY-MM-DD", date_text)))?;

    if date < config.tracking_start {
        return Err(reject(
            raw,
            format!("date precedes tracking start {}", config.tracking_start),
        ));
    }

    let shares = raw.shares(config);
    if shares.numeric().next().is_none() {
        return Err(reject(raw, "no candidate carries a numeric share"));
    }

    let mut record = PollRecord::new(pollster, date, Some(&raw.state()));
    record.sample_size = raw.sample_size();
    record.source_url = raw.source_url().map(str::to_string);
    record.shares = shares;
    record.shares.fill_vocabulary(config);

    let crosstabs = raw.crosstabs(config);
    if !crosstabs.is_empty() {
        record.crosstabs = Some(crosstabs);
    }

    Ok(record)
}
