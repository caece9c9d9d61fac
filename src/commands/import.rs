use log::info;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::Path;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::models::RawPoll;
use crate::reconcile;
use crate::report::RunReport;
use crate::store::PollStore;

fn invalid(path: &Path, reason: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", path.display(), reason))
}

// Array of objects or one object; anything else is unreadable input
pub fn read_raw_polls(path: &Path) -> Result<Vec<RawPoll>> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|e| invalid(path, e))?;
    let raws = match value {
        Value::Array(items) => items.into_iter().filter_map(RawPoll::from_value).collect(),
        Value::Object(_) => RawPoll::from_value(value).into_iter().collect(),
        _ => return Err(invalid(path, "expected a JSON array or object").into()),
    };
    Ok(raws)
}

pub fn run(path: &Path, store: &mut PollStore, config: &TrackerConfig, report: &mut RunReport) -> Result<()> {
    let raws = read_raw_polls(path)?;
    info!("Importing {} record(s) from {}", raws.len(), path.display());
    reconcile::ingest_batch(store, &raws, config, report);
    Ok(())
}
