use log::info;

use crate::collaborators::{ExtractionSchema, Searcher};
use crate::config::TrackerConfig;
use crate::reconcile::identity::raw_key;
use crate::reconcile::{self, IngestOutcome};
use crate::report::RunReport;
use crate::store::PollStore;

// Recent polls shown to the searcher so it can skip them
const RECENT_CONTEXT: usize = 5;

pub fn discovery_query(store: &PollStore, config: &TrackerConfig) -> String {
    let recent: Vec<String> = store
        .recent(RECENT_CONTEXT)
        .iter()
        .map(|r| format!("{} ({})", r.pollster, r.date))
        .collect();
    let known = if recent.is_empty() {
        "none yet".to_string()
    } else {
        recent.join(", ")
    };

    format!(
        "Search for any new 2028 Democratic presidential primary polls published since {start}.

Our most recent polls on file: {known}

Find polls that are NOT already in the list above. Search news sites, pollster websites and \
poll aggregators for national and early-state polls.

For each new poll return the pollster, the field end date, the state (null for national), \
the sample size, a link to the release, and every candidate's percentage.",
        start = config.tracking_start,
        known = known,
    )
}

/// Asks the searcher for polls not yet on file and feeds everything it
/// returns through the ingest pipeline. Search failures land in the report.
pub async fn run_discovery(
    store: &mut PollStore,
    searcher: &dyn Searcher,
    config: &TrackerConfig,
    report: &mut RunReport,
) -> Vec<IngestOutcome> {
    info!("Searching for new polls...");
    let query = discovery_query(store, config);
    let schema = ExtractionSchema::full_record(config);

    let found = match searcher.search_records(&query, &schema).await {
        Ok(found) => found,
        Err(e) => {
            report.record_error(e);
            return Vec::new();
        }
    };

    if found.is_empty() {
        info!("No new polls found");
        return Vec::new();
    }

    let known = found
        .iter()
        .filter_map(raw_key)
        .filter(|key| store.contains(key))
        .count();
    info!("Search returned {} poll(s), {} already on file", found.len(), known);

    reconcile::ingest_batch(store, &found, config, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PollError, Result};
    use crate::models::RawPoll;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct ScriptedSearch {
        reply: std::result::Result<Vec<Value>, String>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        fn returning(items: Vec<Value>) -> Self {
            Self {
                reply: Ok(items),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Searcher for ScriptedSearch {
        async fn search_records(&self, query: &str, _schema: &ExtractionSchema) -> Result<Vec<RawPoll>> {
            self.queries.lock().unwrap().push(query.to_string());
            match &self.reply {
                Ok(items) => Ok(items.iter().cloned().filter_map(RawPoll::from_value).collect()),
                Err(reason) => Err(PollError::extraction(reason.clone())),
            }
        }

        async fn search_locator(&self, _query: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn query_lists_recent_polls_and_start_date() {
        let config = TrackerConfig::default();
        let empty = discovery_query(&PollStore::in_memory(), &config);
        assert!(empty.contains("since 2025-04-01"));
        assert!(empty.contains("none yet"));
    }

    #[tokio::test]
    async fn new_and_known_polls_go_through_ingest() {
        let config = TrackerConfig::default();
        let mut store = PollStore::in_memory();
        let mut report = RunReport::new();
        let seed = RawPoll::from_value(json!({"pollster": "Marist", "date": "2025-07-10", "harris": 30.0})).unwrap();
        reconcile::ingest(&mut store, &seed, &config, &mut report);

        let search = ScriptedSearch::returning(vec![
            json!({"pollster": "Marist", "date": "2025-07-10", "state": null, "newsom": 19.0}),
            json!({"pollster": "Siena", "date": "2025-07-12", "harris": 25.0, "newsom": 20.0}),
            json!({"pollster": "Old Poll", "date": "2024-11-01", "harris": 50.0}),
        ]);
        let mut report = RunReport::new();
        let outcomes = run_discovery(&mut store, &search, &config, &mut report).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(store.len(), 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.duplicates(), 1);
        assert_eq!(report.skipped(), 1);

        let query = search.queries.lock().unwrap()[0].clone();
        assert!(query.contains("Marist (2025-07-10)"));
    }

    #[tokio::test]
    async fn search_failure_is_reported_not_raised() {
        let config = TrackerConfig::default();
        let mut store = PollStore::in_memory();
        let mut report = RunReport::new();
        let search = ScriptedSearch {
            reply: Err("response is not JSON".into()),
            queries: Mutex::new(Vec::new()),
        };

        let outcomes = run_discovery(&mut store, &search, &config, &mut report).await;
        assert!(outcomes.is_empty());
        assert_eq!(report.count(ErrorKind::ExtractionFailure), 1);
        assert!(store.is_empty());
    }
}
