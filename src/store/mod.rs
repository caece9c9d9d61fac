use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::config::TrackerConfig;
use crate::error::{PollError, Result};
use crate::models::{PollKey, PollRecord};
use crate::reconcile::identity::KeyIndex;
use crate::reconcile::merge::{self, MergeMode, MergeOutcome, PollUpdate};

/// Ordered poll collection backed by a JSON file, newest first on disk.
pub struct PollStore {
    path: Option<PathBuf>,
    records: Vec<PollRecord>,
    index: KeyIndex,
    ids: HashSet<String>,
    // Unsaved changes since load or the last save
    modified: bool,
}

impl PollStore {
    // Open the store file; a missing file is an empty store
    pub fn open(path: &Path, config: &TrackerConfig) -> Result<Self> {
        let records = if path.exists() {
            let text = fs::read_to_string(path)?;
            serde_json::from_str::<Vec<PollRecord>>(&text).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("{}: {}", path.display(), e),
                )
            })?
        } else {
            info!("No store at {}, starting empty", path.display());
            Vec::new()
        };

        let mut store = Self::from_records(records, config);
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    // Store with no backing file (dry runs and tests)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Vec::new(),
            index: KeyIndex::default(),
            ids: HashSet::new(),
            modified: false,
        }
    }

    // Build from loaded rows. Rows without an id get one now; repeated keys
    // are folded into the first occurrence with gap-fill.
    pub fn from_records(records: Vec<PollRecord>, config: &TrackerConfig) -> Self {
        let mut store = Self::in_memory();
        for mut record in records {
            let key = record.key();
            if let Some(pos) = store.index.position(&key) {
                warn!("Store holds {} twice; folding the later row into the first", key);
                let update = PollUpdate::from_record(&record);
                let (merged, _) = merge::merge(&store.records[pos], &update, MergeMode::GapFill, config);
                store.records[pos] = merged;
                store.modified = true;
                continue;
            }
            if record.id.is_empty() || store.ids.contains(&record.id) {
                let ids = &store.ids;
                record.id = crate::reconcile::identity::derive_id(&record, |id| ids.contains(id));
                debug!("Assigned id {} to loaded record {}", record.id, key);
                store.modified = true;
            }
            store.push(record);
        }
        store
    }

    fn push(&mut self, record: PollRecord) {
        self.index.insert(record.key(), self.records.len());
        self.ids.insert(record.id.clone());
        self.records.push(record);
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PollRecord] {
        &self.records
    }

    pub fn contains(&self, key: &PollKey) -> bool {
        self.index.contains(key)
    }

    pub fn get(&self, key: &PollKey) -> Option<&PollRecord> {
        self.index.position(key).map(|pos| &self.records[pos])
    }

    // Most recent first, without reordering the store itself
    pub fn recent(&self, n: usize) -> Vec<&PollRecord> {
        let mut sorted: Vec<&PollRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.date.cmp(&a.date));
        sorted.truncate(n);
        sorted
    }

    // Insert path of the merge engine: id, vocabulary, synthetic crosstabs, append
    pub fn insert(&mut self, record: PollRecord, config: &TrackerConfig) -> Result<&PollRecord> {
        let key = record.key();
        if self.index.contains(&key) {
            return Err(PollError::DuplicateRecord(key));
        }
        let ids = &self.ids;
        let record = merge::prepare_insert(record, config, |id| ids.contains(id));
        self.push(record);
        self.modified = true;
        Ok(&self.records[self.records.len() - 1])
    }

    // Update path: merge into a copy, swap it in whole. None if the key is unknown.
    pub fn apply(
        &mut self,
        key: &PollKey,
        update: &PollUpdate,
        mode: MergeMode,
        config: &TrackerConfig,
    ) -> Option<MergeOutcome> {
        let pos = self.index.position(key)?;
        let (merged, outcome) = merge::merge(&self.records[pos], update, mode, config);
        if !outcome.is_noop() || !outcome.synthesized.is_empty() {
            self.records[pos] = merged;
            self.modified = true;
        }
        Some(outcome)
    }

    // Swap in a record already merged elsewhere; its key must exist
    pub fn replace(&mut self, record: PollRecord) -> bool {
        match self.index.position(&record.key()) {
            Some(pos) => {
                self.records[pos] = record;
                self.modified = true;
                true
            }
            None => false,
        }
    }

    /// Sorts newest first and rewrites the whole file through a temp file in
    /// the same directory, so a failed write leaves the old file intact.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        self.records.sort_by(|a, b| b.date.cmp(&a.date));
        self.index = KeyIndex::from_records(&self.records);

        let fail = |reason: String| PollError::PersistenceFailure {
            path: path.clone(),
            reason,
        };

        let json = serde_json::to_string_pretty(&self.records).map_err(|e| fail(e.to_string()))?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| fail(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| fail(e.to_string()))?;
        tmp.write_all(json.as_bytes()).map_err(|e| fail(e.to_string()))?;
        tmp.write_all(b"\n").map_err(|e| fail(e.to_string()))?;
        tmp.as_file().sync_all().map_err(|e| fail(e.to_string()))?;
        tmp.persist(&path).map_err(|e| fail(e.error.to_string()))?;

        self.modified = false;
        info!("Saved {} polls to {}", self.records.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(pollster: &str, date: (i32, u32, u32), harris: Option<f64>) -> PollRecord {
        let mut r = PollRecord::new(pollster, NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(), None);
        r.shares.set("harris", harris);
        r
    }

    #[test]
    fn insert_rejects_duplicate_key() {
        let config = TrackerConfig::default();
        let mut store = PollStore::in_memory();
        let id = store.insert(record("Marist", (2025, 5, 1), Some(30.0)), &config).unwrap().id.clone();
        assert_eq!(id, "auto-2025-05-01-national-marist");

        let err = store.insert(record("MARIST", (2025, 5, 1), Some(31.0)), &config).unwrap_err();
        assert!(matches!(err, PollError::DuplicateRecord(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn apply_unknown_key_is_none() {
        let config = TrackerConfig::default();
        let mut store = PollStore::in_memory();
        let key = PollKey::new("Marist", "2025-05-01", "");
        assert!(store.apply(&key, &PollUpdate::default(), MergeMode::GapFill, &config).is_none());
    }

    #[test]
    fn loading_folds_repeated_keys_and_assigns_ids() {
        let config = TrackerConfig::default();
        let mut first = record("Siena", (2025, 5, 3), Some(30.0));
        first.shares.set("newsom", None);
        let mut second = record("siena", (2025, 5, 3), None);
        second.shares.set("newsom", Some(14.0));

        let store = PollStore::from_records(vec![first, second], &config);
        assert_eq!(store.len(), 1);
        let only = &store.records()[0];
        assert_eq!(only.id, "auto-2025-05-03-national-siena");
        assert_eq!(only.shares.get("harris"), Some(30.0));
        assert_eq!(only.shares.get("newsom"), Some(14.0));
    }

    #[test]
    fn save_sorts_newest_first_and_reloads() {
        let config = TrackerConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public").join("polls.json");

        let mut store = PollStore::open(&path, &config).unwrap();
        assert!(store.is_empty());
        store.insert(record("Marist", (2025, 5, 1), Some(30.0)), &config).unwrap();
        store.insert(record("Siena", (2025, 7, 9), Some(28.0)), &config).unwrap();
        store.insert(record("Monmouth", (2025, 6, 2), Some(33.0)), &config).unwrap();
        store.save().unwrap();

        let reloaded = PollStore::open(&path, &config).unwrap();
        let dates: Vec<String> = reloaded.records().iter().map(|r| r.date_string()).collect();
        assert_eq!(dates, vec!["2025-07-09", "2025-06-02", "2025-05-01"]);
        assert_eq!(reloaded.records()[0].id, "auto-2025-07-09-national-siena");
        assert!(reloaded.contains(&PollKey::new("monmouth", "2025-06-02", "National")));
    }

    #[test]
    fn synthesizing_on_a_noop_update_marks_store_modified() {
        let config = TrackerConfig::default();
        let mut loaded = record("Marist", (2025, 5, 1), Some(30.0));
        loaded.id = "marist-may".into();
        let mut store = PollStore::from_records(vec![loaded], &config);
        assert!(!store.is_modified());

        let key = PollKey::new("Marist", "2025-05-01", "");
        let outcome = store.apply(&key, &PollUpdate::default(), MergeMode::GapFill, &config).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(outcome.synthesized, vec!["harris".to_string()]);
        assert!(store.is_modified());
        assert!(store.get(&key).unwrap().is_synthetic("harris"));
    }

    #[test]
    fn save_clears_modified() {
        let config = TrackerConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = PollStore::open(&dir.path().join("polls.json"), &config).unwrap();
        store.insert(record("Siena", (2025, 7, 9), Some(28.0)), &config).unwrap();
        assert!(store.is_modified());
        store.save().unwrap();
        assert!(!store.is_modified());
    }

    #[test]
    fn in_memory_save_is_a_no_op() {
        let mut store = PollStore::in_memory();
        assert!(store.save().is_ok());
        assert!(store.path().is_none());
    }
}
