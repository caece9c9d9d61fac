use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::config::TrackerConfig;
use crate::models::PollRecord;

// Half-weight after ~42 days
const DECAY_DAYS: f64 = 60.0;
const DEFAULT_SAMPLE: f64 = 500.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAverage {
    pub id: String,
    pub name: String,
    pub average: f64,
}

fn weight(record: &PollRecord, today: NaiveDate) -> f64 {
    let age = (today - record.date).num_days().max(0) as f64;
    let sample = record.sample_size.map(f64::from).unwrap_or(DEFAULT_SAMPLE);
    (-age / DECAY_DAYS).exp() * sample.sqrt()
}

/// Recency- and sample-weighted average per candidate, highest first.
/// Candidates never tested are left out; a tested 0% counts.
pub fn calculate_averages(records: &[PollRecord], config: &TrackerConfig, today: NaiveDate) -> Vec<CandidateAverage> {
    let mut sums: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for record in records {
        let w = weight(record, today);
        for id in config.candidate_ids() {
            if let Some(share) = record.shares.get(id) {
                let entry = sums.entry(id).or_insert((0.0, 0.0));
                entry.0 += share * w;
                entry.1 += w;
            }
        }
    }

    let mut averages: Vec<CandidateAverage> = sums
        .into_iter()
        .filter(|(_, (_, total))| *total > 0.0)
        .map(|(id, (weighted, total))| CandidateAverage {
            id: id.to_string(),
            name: config.candidate_name(id).to_string(),
            average: (weighted / total * 10.0).round() / 10.0,
        })
        .collect();
    averages.sort_by(|a, b| b.average.total_cmp(&a.average));
    averages
}
