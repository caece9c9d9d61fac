use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use crate::error::{PollError, Result};

pub const DEFAULT_POLLS_FILE: &str = "public/polls.json";
pub const DEFAULT_TRACKING_START: &str = "2025-04-01";
pub const DEFAULT_SYNTH_THRESHOLD: f64 = 3.0;
pub const DEFAULT_DOCUMENT_CHAR_LIMIT: usize = 12_000;

const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
const DEFAULT_DISCOVERY_MODEL: &str = "claude-opus-4-6";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// (id, display name); the id doubles as the JSON key in the store
const CANDIDATES: &[(&str, &str)] = &[
    ("harris", "Kamala Harris"),
    ("newsom", "Gavin Newsom"),
    ("buttigieg", "Pete Buttigieg"),
    ("ocasio", "Alexandria Ocasio-Cortez"),
    ("shapiro", "Josh Shapiro"),
    ("pritzker", "J.B. Pritzker"),
    ("booker", "Cory Booker"),
    ("whitmer", "Gretchen Whitmer"),
    ("beshear", "Andy Beshear"),
    ("kelly", "Mark Kelly"),
    ("moore", "Wes Moore"),
    ("slotkin", "Elissa Slotkin"),
    ("sanders", "Bernie Sanders"),
    ("gallego", "Ruben Gallego"),
    ("warnock", "Raphael Warnock"),
    ("ossoff", "Jon Ossoff"),
    ("klobuchar", "Amy Klobuchar"),
    ("khanna", "Ro Khanna"),
    ("cooper", "Roy Cooper"),
    ("murphy", "Chris Murphy"),
    ("stewart", "Jon Stewart"),
];

// Pollsters that usually test the whole field, so backfilling them pays off
const FULL_FIELD_POLLSTERS: &[&str] = &[
    "UNH Survey Center",
    "Emerson College",
    "Harvard Harris",
    "Echelon Insights",
    "Morning Consult",
    "Focaldata",
    "Suffolk University",
    "Yale Youth Poll",
    "Quinnipiac",
    "Marist",
    "Monmouth",
    "Siena",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
}

/// Per-category multipliers applied to a candidate's overall share.
///
/// Each value scales the topline independently; a dimension's categories
/// are not a partition and need not average back to the overall share.
/// Category order matches `reconcile::crosstabs::DIMENSIONS`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateSkew {
    pub gender: [f64; 2],
    pub age: [f64; 4],
    pub race: [f64; 4],
    pub education: [f64; 4],
    pub ideology: [f64; 4],
}

impl CandidateSkew {
    pub fn dimension(&self, name: &str) -> Option<&[f64]> {
        match name {
            "gender" => Some(&self.gender),
            "age" => Some(&self.age),
            "race" => Some(&self.race),
            "education" => Some(&self.education),
            "ideology" => Some(&self.ideology),
            _ => None,
        }
    }
}

/// Immutable settings shared by every component for one run.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub polls_file: PathBuf,
    pub tracking_start: NaiveDate,
    pub candidates: Vec<Candidate>,
    pub full_field_pollsters: Vec<String>,
    pub crosstab_skews: BTreeMap<String, CandidateSkew>,
    pub synth_threshold: f64,
    pub document_char_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            polls_file: PathBuf::from(DEFAULT_POLLS_FILE),
            tracking_start: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap_or_default(),
            candidates: CANDIDATES
                .iter()
                .map(|(id, name)| Candidate {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
            full_field_pollsters: FULL_FIELD_POLLSTERS.iter().map(|p| p.to_string()).collect(),
            crosstab_skews: default_skews(),
            synth_threshold: DEFAULT_SYNTH_THRESHOLD,
            document_char_limit: DEFAULT_DOCUMENT_CHAR_LIMIT,
        }
    }
}

impl TrackerConfig {
    // Defaults overridden by POLLS_FILE / TRACKING_START_DATE
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var("POLLS_FILE") {
            if !path.trim().is_empty() {
                config.polls_file = PathBuf::from(path);
            }
        }

        if let Ok(start) = env::var("TRACKING_START_DATE") {
            config.tracking_start = parse_start_date(&start)?;
        }

        Ok(config)
    }

    pub fn with_polls_file(mut self, path: PathBuf) -> Self {
        self.polls_file = path;
        self
    }

    pub fn candidate_ids(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.id.as_str())
    }

    pub fn is_candidate(&self, id: &str) -> bool {
        self.candidates.iter().any(|c| c.id == id)
    }

    pub fn candidate_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.candidates
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
            .unwrap_or(id)
    }

    // Case-insensitive substring match, same as the allow-list is written
    pub fn is_full_field_pollster(&self, pollster: &str) -> bool {
        let pollster = pollster.to_lowercase();
        self.full_field_pollsters
            .iter()
            .any(|p| pollster.contains(&p.to_lowercase()))
    }
}

fn parse_start_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| PollError::Config(format!("TRACKING_START_DATE '{}': {}", raw, e)))
}

/// Settings for the Anthropic-backed extraction and search collaborators.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub discovery_model: String,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .map_err(|_| PollError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;

        let timeout_secs = match env::var("LLM_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| PollError::Config(format!("LLM_TIMEOUT_SECS '{}' is not a number", raw)))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key,
            model: env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            discovery_model: env::var("ANTHROPIC_DISCOVERY_MODEL")
                .unwrap_or_else(|_| DEFAULT_DISCOVERY_MODEL.to_string()),
            timeout_secs,
        })
    }
}

// Display heuristic only: rough demographic lean per candidate, not survey weights
fn default_skews() -> BTreeMap<String, CandidateSkew> {
    let rows: [(&str, CandidateSkew); 10] = [
        ("harris", CandidateSkew {
            gender: [0.92, 1.07],
            age: [0.85, 0.97, 1.05, 1.12],
            race: [0.85, 1.55, 1.05, 0.95],
            education: [1.08, 1.02, 0.95, 0.90],
            ideology: [0.95, 1.00, 1.05, 0.90],
        }),
        ("newsom", CandidateSkew {
            gender: [1.08, 0.93],
            age: [0.90, 1.05, 1.05, 0.98],
            race: [1.05, 0.75, 1.10, 1.10],
            education: [0.90, 0.98, 1.08, 1.12],
            ideology: [1.10, 1.05, 0.90, 0.80],
        }),
        ("buttigieg", CandidateSkew {
            gender: [0.95, 1.04],
            age: [0.80, 0.95, 1.08, 1.20],
            race: [1.25, 0.45, 0.80, 0.95],
            education: [0.75, 0.95, 1.20, 1.40],
            ideology: [1.00, 1.15, 0.95, 0.70],
        }),
        ("ocasio", CandidateSkew {
            gender: [0.90, 1.09],
            age: [1.70, 1.10, 0.70, 0.45],
            race: [0.95, 0.80, 1.25, 1.15],
            education: [0.95, 1.10, 1.00, 0.95],
            ideology: [1.80, 1.00, 0.55, 0.30],
        }),
        ("shapiro", CandidateSkew {
            gender: [1.05, 0.96],
            age: [0.75, 0.95, 1.10, 1.20],
            race: [1.15, 0.70, 0.90, 0.95],
            education: [0.95, 1.00, 1.05, 1.05],
            ideology: [0.75, 0.95, 1.20, 1.30],
        }),
        ("pritzker", CandidateSkew {
            gender: [1.06, 0.95],
            age: [0.90, 1.05, 1.05, 0.95],
            race: [1.10, 0.80, 0.95, 1.00],
            education: [0.90, 1.00, 1.08, 1.10],
            ideology: [1.15, 1.05, 0.90, 0.80],
        }),
        ("booker", CandidateSkew {
            gender: [0.95, 1.04],
            age: [0.95, 1.05, 1.00, 0.95],
            race: [0.80, 1.60, 0.95, 1.00],
            education: [0.95, 1.00, 1.05, 1.05],
            ideology: [1.00, 1.05, 1.00, 0.90],
        }),
        ("whitmer", CandidateSkew {
            gender: [0.85, 1.12],
            age: [0.95, 1.05, 1.02, 0.95],
            race: [1.12, 0.80, 0.90, 0.95],
            education: [1.00, 1.02, 1.00, 0.98],
            ideology: [0.90, 1.05, 1.05, 0.95],
        }),
        ("beshear", CandidateSkew {
            gender: [1.10, 0.92],
            age: [0.80, 0.95, 1.08, 1.15],
            race: [1.20, 0.70, 0.80, 0.90],
            education: [1.10, 1.00, 0.95, 0.95],
            ideology: [0.65, 0.90, 1.25, 1.45],
        }),
        ("kelly", CandidateSkew {
            gender: [1.15, 0.88],
            age: [0.80, 0.95, 1.05, 1.20],
            race: [1.10, 0.75, 1.05, 1.00],
            education: [1.00, 1.00, 1.02, 1.00],
            ideology: [0.60, 0.90, 1.30, 1.50],
        }),
    ];

    rows.into_iter().map(|(id, skew)| (id.to_string(), skew)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tracking_start_matches_constant() {
        let config = TrackerConfig::default();
        assert_eq!(config.tracking_start.to_string(), DEFAULT_TRACKING_START);
        assert_eq!(config.candidates.len(), 21);
    }

    #[test]
    fn every_skew_row_belongs_to_the_vocabulary() {
        let config = TrackerConfig::default();
        for id in config.crosstab_skews.keys() {
            assert!(config.is_candidate(id), "{} has skews but is not a candidate", id);
        }
    }

    #[test]
    fn allow_list_match_is_case_insensitive_substring() {
        let config = TrackerConfig::default();
        assert!(config.is_full_field_pollster("emerson college polling"));
        assert!(config.is_full_field_pollster("Siena College/NYT"));
        assert!(!config.is_full_field_pollster("AtlasIntel"));
    }

    #[test]
    fn unknown_candidate_name_falls_back_to_id() {
        let config = TrackerConfig::default();
        assert_eq!(config.candidate_name("ocasio"), "Alexandria Ocasio-Cortez");
        assert_eq!(config.candidate_name("nobody"), "nobody");
    }

    #[test]
    fn start_date_must_be_canonical() {
        assert!(parse_start_date("2025-04-01").is_ok());
        assert!(parse_start_date("April 1").is_err());
    }
}
