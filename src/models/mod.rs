use chrono::NaiveDate;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::TrackerConfig;

pub const NATIONAL: &str = "National";

// dimension -> category -> sub-share
pub type Breakdown = BTreeMap<String, BTreeMap<String, f64>>;
// candidate id -> breakdown
pub type Crosstabs = BTreeMap<String, Breakdown>;

/// Identity of a poll inside the store: (pollster, date, state), normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PollKey {
    pub pollster: String,
    pub date: String,
    pub state: String,
}

impl PollKey {
    pub fn new(pollster: &str, date: &str, state: &str) -> Self {
        Self {
            pollster: pollster.trim().to_lowercase(),
            date: date.trim().to_string(),
            state: normalize_state(Some(state)).to_lowercase(),
        }
    }
}

impl fmt::Display for PollKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.pollster, self.date, self.state)
    }
}

pub fn normalize_state(state: Option<&str>) -> String {
    match state.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => NATIONAL.to_string(),
    }
}

/// Candidate id -> share. `None` means "not tested"; `Some(0.0)` is a tested zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateShares(BTreeMap<String, Option<f64>>);

impl CandidateShares {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.0.get(id).copied().flatten()
    }

    pub fn set(&mut self, id: &str, share: Option<f64>) {
        self.0.insert(id.to_string(), share);
    }

    pub fn is_numeric(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn numeric(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0
            .iter()
            .filter_map(|(id, share)| share.map(|s| (id.as_str(), s)))
    }

    // Vocabulary candidates with no numeric share, in vocabulary order
    pub fn missing(&self, config: &TrackerConfig) -> Vec<String> {
        config
            .candidate_ids()
            .filter(|id| !self.is_numeric(id))
            .map(str::to_string)
            .collect()
    }

    // Writes an explicit null for every vocabulary candidate not yet present
    pub fn fill_vocabulary(&mut self, config: &TrackerConfig) {
        for id in config.candidate_ids() {
            self.0.entry(id.to_string()).or_insert(None);
        }
    }
}

impl Serialize for CandidateShares {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, share) in &self.0 {
            map.serialize_entry(id, share)?;
        }
        map.end()
    }
}

// Flattened into PollRecord, so this sees every key the record did not claim.
// Numbers and nulls are candidate shares; anything else is ignored.
impl<'de> Deserialize<'de> for CandidateShares {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SharesVisitor;

        impl<'de> Visitor<'de> for SharesVisitor {
            type Value = CandidateShares;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of candidate ids to percentages")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut shares = CandidateShares::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    match value {
                        Value::Number(n) => shares.set(&key, n.as_f64()),
                        Value::Null => shares.set(&key, None),
                        _ => {}
                    }
                }
                Ok(shares)
            }
        }

        deserializer.deserialize_map(SharesVisitor)
    }
}

/// Non-numeric fields the store does not model (operator notes and the like),
/// kept so a rewrite of the file does not lose them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraFields(Map<String, Value>);

impl ExtraFields {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

impl Serialize for ExtraFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, value) in &self.0 {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

// Sees the same leftover keys as CandidateShares and keeps the complement
impl<'de> Deserialize<'de> for ExtraFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let all = Map::<String, Value>::deserialize(deserializer)?;
        Ok(ExtraFields(
            all.into_iter()
                .filter(|(_, v)| !matches!(v, Value::Number(_) | Value::Null))
                .collect(),
        ))
    }
}

/// One reported poll result as kept in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRecord {
    #[serde(default)]
    pub id: String,
    pub pollster: String,
    pub date: NaiveDate,
    #[serde(default = "national", deserialize_with = "state_or_national")]
    pub state: String,
    #[serde(default, deserialize_with = "lenient_sample_size")]
    pub sample_size: Option<u32>,
    #[serde(default, alias = "source_url")]
    pub source_url: Option<String>,
    #[serde(flatten)]
    pub shares: CandidateShares,
    #[serde(flatten)]
    pub extra: ExtraFields,
    #[serde(default)]
    pub crosstabs: Option<Crosstabs>,
    // Candidates whose bundle was synthesized rather than reported
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synthetic_crosstabs: Vec<String>,
}

impl PollRecord {
    pub fn new(pollster: &str, date: NaiveDate, state: Option<&str>) -> Self {
        Self {
            id: String::new(),
            pollster: pollster.trim().to_string(),
            date,
            state: normalize_state(state),
            sample_size: None,
            source_url: None,
            shares: CandidateShares::new(),
            extra: ExtraFields::default(),
            crosstabs: None,
            synthetic_crosstabs: Vec::new(),
        }
    }

    pub fn key(&self) -> PollKey {
        PollKey::new(&self.pollster, &self.date.to_string(), &self.state)
    }

    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn crosstab(&self, id: &str) -> Option<&Breakdown> {
        self.crosstabs.as_ref().and_then(|c| c.get(id))
    }

    pub fn has_crosstab(&self, id: &str) -> bool {
        self.crosstab(id).is_some()
    }

    pub fn is_synthetic(&self, id: &str) -> bool {
        self.synthetic_crosstabs.iter().any(|c| c == id)
    }

    pub fn missing_count(&self, config: &TrackerConfig) -> usize {
        self.shares.missing(config).len()
    }
}

fn national() -> String {
    NATIONAL.to_string()
}

fn state_or_national<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let state = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_state(state.as_deref()))
}

// Older rows were hand-entered and sometimes carry the sample size as a string
fn lenient_sample_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(sample_size_from_value(&value))
}

fn sample_size_from_value(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    if n >= 1.0 && n.fract() == 0.0 && n <= u32::MAX as f64 {
        Some(n as u32)
    } else {
        None
    }
}

/// An unvalidated record as returned by a collaborator or read from an import file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPoll(Map<String, Value>);

impl RawPoll {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    // Non-empty trimmed string, or None
    pub fn text(&self, field: &str) -> Option<&str> {
        match self.0.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        }
    }

    pub fn pollster(&self) -> Option<&str> {
        self.text("pollster")
    }

    pub fn date(&self) -> Option<&str> {
        self.text("date")
    }

    pub fn state(&self) -> String {
        normalize_state(self.text("state"))
    }

    pub fn source_url(&self) -> Option<&str> {
        self.text("sourceUrl").or_else(|| self.text("source_url"))
    }

    pub fn sample_size(&self) -> Option<u32> {
        self.0.get("sampleSize").and_then(sample_size_from_value)
    }

    /// A usable share: a JSON number within 0..=100. Strings, booleans and
    /// nulls are "not tested"; an explicit 0 is a tested zero.
    pub fn share(&self, id: &str) -> Option<f64> {
        match self.0.get(id) {
            Some(Value::Number(n)) => n.as_f64().filter(|v| (0.0..=100.0).contains(v)),
            _ => None,
        }
    }

    pub fn shares(&self, config: &TrackerConfig) -> CandidateShares {
        let mut shares = CandidateShares::new();
        for id in config.candidate_ids() {
            shares.set(id, self.share(id));
        }
        shares
    }

    /// Reported crosstabs for vocabulary candidates that also carry a share.
    /// Non-numeric categories and empty dimensions are dropped.
    pub fn crosstabs(&self, config: &TrackerConfig) -> Crosstabs {
        let mut out = Crosstabs::new();
        let Some(Value::Object(by_candidate)) = self.0.get("crosstabs") else {
            return out;
        };

        for (id, bundle) in by_candidate {
            if !config.is_candidate(id) || self.share(id).is_none() {
                continue;
            }
            let Value::Object(dimensions) = bundle else {
                continue;
            };

            let mut breakdown = Breakdown::new();
            for (dimension, categories) in dimensions {
                let Value::Object(categories) = categories else {
                    continue;
                };
                let parsed: BTreeMap<String, f64> = categories
                    .iter()
                    .filter_map(|(label, v)| v.as_f64().map(|n| (label.clone(), n)))
                    .collect();
                if !parsed.is_empty() {
                    breakdown.insert(dimension.clone(), parsed);
                }
            }

            if !breakdown.is_empty() {
                out.insert(id.clone(), breakdown);
            }
        }
        out
    }

    // For log lines on records that may be missing any of the three
    pub fn triple(&self) -> (String, String, String) {
        (
            self.pollster().unwrap_or("<no pollster>").to_string(),
            self.date().unwrap_or("<no date>").to_string(),
            self.state(),
        )
    }
}
