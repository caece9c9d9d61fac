pub mod crosstabs;
pub mod identity;
pub mod merge;
pub mod validate;

use log::{debug, info};

use crate::config::TrackerConfig;
use crate::error::PollError;
use crate::models::RawPoll;
use crate::report::RunReport;
use crate::store::PollStore;
use merge::{MergeMode, PollUpdate};

// What happened to one incoming record
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Inserted { id: String },
    // Duplicate whose gap-fill added data
    ToppedUp { id: String, changed: usize },
    // Duplicate with nothing new
    Unchanged { id: String },
    Skipped,
}

/// Validate -> dedup -> insert (with synthetic crosstabs), or gap-fill the
/// existing record when the key is already stored. Never fails the batch:
/// rejects and duplicates go into the report.
pub fn ingest(
    store: &mut PollStore,
    raw: &RawPoll,
    config: &TrackerConfig,
    report: &mut RunReport,
) -> IngestOutcome {
    let record = match validate::validate(raw, config) {
        Ok(record) => record,
        Err(e) => {
            report.record_error(e);
            return IngestOutcome::Skipped;
        }
    };

    let key = record.key();
    if !store.contains(&key) {
        return match store.insert(record, config) {
            Ok(inserted) => {
                let tag = if inserted.synthetic_crosstabs.is_empty() { "" } else { " [+synthetic crosstabs]" };
                info!("Added: {} ({}, {}){}", inserted.pollster, inserted.date, inserted.state, tag);
                report.inserted += 1;
                IngestOutcome::Inserted { id: inserted.id.clone() }
            }
            Err(e) => {
                report.record_error(e);
                IngestOutcome::Skipped
            }
        };
    }

    report.record_error(PollError::DuplicateRecord(key.clone()));
    let update = PollUpdate::from_raw(raw, config);
    let outcome = store.apply(&key, &update, MergeMode::GapFill, config);
    let id = store.get(&key).map(|r| r.id.clone()).unwrap_or_default();

    match outcome {
        Some(o) if !o.is_noop() => {
            info!("Topped up {}: {} field(s) filled ({})", key, o.changed(), o.shares_changed.join(", "));
            report.updated += 1;
            IngestOutcome::ToppedUp { id, changed: o.changed() }
        }
        _ => {
            debug!("No new data for {}", key);
            report.unchanged += 1;
            IngestOutcome::Unchanged { id }
        }
    }
}

// One record at a time, in order
pub fn ingest_batch(
    store: &mut PollStore,
    raws: &[RawPoll],
    config: &TrackerConfig,
    report: &mut RunReport,
) -> Vec<IngestOutcome> {
    raws.iter().map(|raw| ingest(store, raw, config, report)).collect()
}
