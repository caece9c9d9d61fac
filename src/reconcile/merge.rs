use crate::config::TrackerConfig;
use crate::models::{CandidateShares, Crosstabs, PollRecord, RawPoll};
use crate::reconcile::crosstabs;
use crate::reconcile::identity::derive_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Fill absent values only; numeric values already stored are kept.
    GapFill,
    /// Re-read of the original document: incoming numbers overwrite, absent ones are ignored.
    Authoritative,
}

/// Field-level data to merge into an existing record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollUpdate {
    pub shares: CandidateShares,
    pub crosstabs: Crosstabs,
    pub source_url: Option<String>,
    pub sample_size: Option<u32>,
}

impl PollUpdate {
    pub fn from_raw(raw: &RawPoll, config: &TrackerConfig) -> Self {
        Self {
            shares: raw.shares(config),
            crosstabs: raw.crosstabs(config),
            source_url: raw.source_url().map(str::to_string),
            sample_size: raw.sample_size(),
        }
    }

    // Synthetic bundles are not real data and are never carried over
    pub fn from_record(record: &PollRecord) -> Self {
        let crosstabs = record
            .crosstabs
            .iter()
            .flatten()
            .filter(|(id, _)| !record.is_synthetic(id))
            .map(|(id, b)| (id.clone(), b.clone()))
            .collect();
        Self {
            shares: record.shares.clone(),
            crosstabs,
            source_url: record.source_url.clone(),
            sample_size: record.sample_size,
        }
    }

    pub fn with_source_url(mut self, url: &str) -> Self {
        self.source_url = Some(url.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub shares_changed: Vec<String>,
    pub crosstabs_changed: Vec<String>,
    pub source_url_changed: bool,
    pub sample_size_filled: bool,
    // Derived bundles; not counted as changed fields
    pub synthesized: Vec<String>,
}

impl MergeOutcome {
    pub fn changed(&self) -> usize {
        self.shares_changed.len()
            + self.crosstabs_changed.len()
            + usize::from(self.source_url_changed)
            + usize::from(self.sample_size_filled)
    }

    // "no new data"; not an error
    pub fn is_noop(&self) -> bool {
        self.changed() == 0
    }

    // Fold a later merge on top of this one, keeping each name once
    pub fn absorb(&mut self, later: MergeOutcome) {
        fn extend(into: &mut Vec<String>, from: Vec<String>) {
            for id in from {
                if !into.contains(&id) {
                    into.push(id);
                }
            }
        }
        extend(&mut self.shares_changed, later.shares_changed);
        extend(&mut self.crosstabs_changed, later.crosstabs_changed);
        extend(&mut self.synthesized, later.synthesized);
        self.source_url_changed |= later.source_url_changed;
        self.sample_size_filled |= later.sample_size_filled;
    }
}

/// Normalizes a validated record for insertion: vocabulary keys, stable id,
/// synthetic crosstabs for candidates without a reported bundle.
pub fn prepare_insert(
    mut record: PollRecord,
    config: &TrackerConfig,
    id_taken: impl Fn(&str) -> bool,
) -> PollRecord {
    record.shares.fill_vocabulary(config);
    if record.id.is_empty() {
        record.id = derive_id(&record, id_taken);
    }
    crosstabs::fill_missing(&mut record, config);
    record
}

/// Merges `update` into a copy of `existing`. The caller swaps the copy in,
/// so a merge either lands whole or not at all.
pub fn merge(
    existing: &PollRecord,
    update: &PollUpdate,
    mode: MergeMode,
    config: &TrackerConfig,
) -> (PollRecord, MergeOutcome) {
    let mut merged = existing.clone();
    let mut outcome = MergeOutcome::default();

    for (id, incoming) in update.shares.numeric() {
        if !config.is_candidate(id) {
            continue;
        }
        let current = merged.shares.get(id);
        let take = match mode {
            MergeMode::GapFill => current.is_none(),
            MergeMode::Authoritative => current != Some(incoming),
        };
        if take {
            merged.shares.set(id, Some(incoming));
            outcome.shares_changed.push(id.to_string());
        }
    }

    // A synthetic bundle was derived from the old share; drop it so it is rebuilt
    if mode == MergeMode::Authoritative {
        for id in &outcome.shares_changed {
            if merged.is_synthetic(id) {
                remove_crosstab(&mut merged, id);
            }
        }
    }

    for (id, bundle) in &update.crosstabs {
        if !merged.shares.is_numeric(id) {
            continue;
        }
        let take = match (mode, merged.crosstab(id)) {
            (_, None) => true,
            (MergeMode::GapFill, Some(_)) => merged.is_synthetic(id),
            (MergeMode::Authoritative, Some(current)) => merged.is_synthetic(id) || current != bundle,
        };
        if take {
            merged.synthetic_crosstabs.retain(|c| c != id);
            merged
                .crosstabs
                .get_or_insert_with(Crosstabs::new)
                .insert(id.clone(), bundle.clone());
            outcome.crosstabs_changed.push(id.clone());
        }
    }

    if let Some(url) = &update.source_url {
        let take = match mode {
            MergeMode::GapFill => merged.source_url.is_none(),
            MergeMode::Authoritative => merged.source_url.as_deref() != Some(url.as_str()),
        };
        if take {
            merged.source_url = Some(url.clone());
            outcome.source_url_changed = true;
        }
    }

    if merged.sample_size.is_none() && update.sample_size.is_some() {
        merged.sample_size = update.sample_size;
        outcome.sample_size_filled = true;
    }

    outcome.synthesized = crosstabs::fill_missing(&mut merged, config);
    (merged, outcome)
}

fn remove_crosstab(record: &mut PollRecord, id: &str) {
    if let Some(tabs) = record.crosstabs.as_mut() {
        tabs.remove(id);
        if tabs.is_empty() {
            record.crosstabs = None;
        }
    }
    record.synthetic_crosstabs.retain(|c| c != id);
}
