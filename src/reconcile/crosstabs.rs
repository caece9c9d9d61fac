//! Synthetic demographic breakdowns.
//!
//! When a poll reports a candidate's topline but no crosstabs, a display-only
//! breakdown is derived by scaling the topline with a fixed per-candidate,
//! per-category multiplier and rounding to whole points. The categories of a
//! dimension are independent scalings, not a partition: they do not have to
//! average (or sum) back to the topline. This is a heuristic for the UI, not a
//! statistical decomposition.

use crate::config::TrackerConfig;
use crate::models::{Breakdown, Crosstabs, PollRecord};

pub const DIMENSIONS: [(&str, &[&str]); 5] = [
    ("gender", &["Men", "Women"]),
    ("age", &["18-34", "35-49", "50-64", "65+"]),
    ("race", &["White", "Black", "Hispanic", "Other"]),
    ("education", &["No college", "Some college", "College grad", "Postgrad"]),
    ("ideology", &["Very liberal", "Somewhat liberal", "Moderate", "Conservative"]),
];

/// Breakdown for one candidate, or `None` when the share is absent, zero,
/// below the threshold, or the candidate has no multiplier row.
/// The threshold is inclusive: a share equal to it synthesizes.
pub fn synthesize(candidate: &str, share: Option<f64>, config: &TrackerConfig) -> Option<Breakdown> {
    let share = share?;
    if share <= 0.0 || share < config.synth_threshold {
        return None;
    }
    let skew = config.crosstab_skews.get(candidate)?;

    let mut breakdown = Breakdown::new();
    for (dimension, categories) in DIMENSIONS {
        let multipliers = skew.dimension(dimension)?;
        let cells = categories
            .iter()
            .zip(multipliers)
            .map(|(label, m)| (label.to_string(), (share * m).round()))
            .collect();
        breakdown.insert(dimension.to_string(), cells);
    }
    Some(breakdown)
}

/// Synthesizes bundles for every candidate with a numeric share and no bundle.
/// Existing bundles, real or synthetic, are left alone. Returns the candidates filled.
pub fn fill_missing(record: &mut PollRecord, config: &TrackerConfig) -> Vec<String> {
    let wanted: Vec<(String, Breakdown)> = record
        .shares
        .numeric()
        .filter(|(id, _)| !record.has_crosstab(id))
        .filter_map(|(id, share)| synthesize(id, Some(share), config).map(|b| (id.to_string(), b)))
        .collect();

    if wanted.is_empty() {
        return Vec::new();
    }

    let tabs = record.crosstabs.get_or_insert_with(Crosstabs::new);
    let mut filled = Vec::with_capacity(wanted.len());
    for (id, breakdown) in wanted {
        tabs.insert(id.clone(), breakdown);
        if !record.synthetic_crosstabs.contains(&id) {
            record.synthetic_crosstabs.push(id.clone());
        }
        filled.push(id);
    }
    filled
}
