use std::collections::HashMap;

use crate::models::{PollKey, PollRecord, RawPoll};

const POLLSTER_SLUG_LEN: usize = 20;

// None when pollster or date is missing; such records never reach the store anyway
pub fn raw_key(raw: &RawPoll) -> Option<PollKey> {
    Some(PollKey::new(raw.pollster()?, raw.date()?, &raw.state()))
}

/// Key -> position in the store's record list. Built once on load and kept
/// in step with inserts; a record's key never changes after insertion.
#[derive(Debug, Default, Clone)]
pub struct KeyIndex {
    positions: HashMap<PollKey, usize>,
}

impl KeyIndex {
    pub fn from_records(records: &[PollRecord]) -> Self {
        let mut index = Self::default();
        for (pos, record) in records.iter().enumerate() {
            index.insert(record.key(), pos);
        }
        index
    }

    pub fn contains(&self, key: &PollKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn position(&self, key: &PollKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    // false (and no change) when the key was already present
    pub fn insert(&mut self, key: PollKey, pos: usize) -> bool {
        if self.positions.contains_key(&key) {
            return false;
        }
        self.positions.insert(key, pos);
        true
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Stable id from date, state and pollster. `taken` reports ids already in use;
/// a collision gets a numeric suffix.
pub fn derive_id(record: &PollRecord, taken: impl Fn(&str) -> bool) -> String {
    let pollster: String = slug(&record.pollster).chars().take(POLLSTER_SLUG_LEN).collect();
    let base = format!(
        "auto-{}-{}-{}",
        record.date_string(),
        slug(&record.state),
        pollster.trim_end_matches('-')
    );

    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(pollster: &str, state: Option<&str>) -> PollRecord {
        PollRecord::new(pollster, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), state)
    }

    #[test]
    fn records_differing_only_in_payload_share_a_key() {
        let a = RawPoll::from_value(json!({
            "pollster": "Emerson College", "date": "2025-06-01",
            "harris": 40.0, "sampleSize": 900, "source_url": "https://a.test"
        }))
        .unwrap();
        let b = RawPoll::from_value(json!({
            "pollster": "EMERSON COLLEGE ", "date": "2025-06-01", "state": "",
            "harris": 38.0, "newsom": 20.0
        }))
        .unwrap();
        assert_eq!(raw_key(&a), raw_key(&b));
    }

    #[test]
    fn state_is_part_of_the_key() {
        let national = record("UNH Survey Center", None).key();
        let nh = record("UNH Survey Center", Some("New Hampshire")).key();
        assert_ne!(national, nh);
    }

    #[test]
    fn raw_key_needs_pollster_and_date() {
        let raw = RawPoll::from_value(json!({"date": "2025-06-01"})).unwrap();
        assert!(raw_key(&raw).is_none());
    }

    #[test]
    fn key_index_membership() {
        let existing = [record("Quinnipiac", None)];
        let mut keys = KeyIndex::from_records(&existing);
        assert!(keys.contains(&record("quinnipiac", Some("National")).key()));
        assert!(!keys.insert(record("Quinnipiac", None).key(), 7));
        assert_eq!(keys.position(&record("Quinnipiac", None).key()), Some(0));
        assert!(keys.insert(record("Marist", None).key(), 1));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn id_includes_state_and_truncated_pollster() {
        let rec = record("Harvard CAPS / Harris Poll Survey", Some("New Hampshire"));
        let id = derive_id(&rec, |_| false);
        assert_eq!(id, "auto-2025-06-01-new-hampshire-harvard-caps-harris");
    }

    #[test]
    fn colliding_id_gets_suffix() {
        let rec = record("Emerson College", None);
        let id = derive_id(&rec, |id| id == "auto-2025-06-01-national-emerson-college");
        assert_eq!(id, "auto-2025-06-01-national-emerson-college-2");
    }
}
