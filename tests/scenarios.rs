use serde_json::json;

use poll_tracker::config::TrackerConfig;
use poll_tracker::models::{PollKey, RawPoll};
use poll_tracker::reconcile::merge::{MergeMode, PollUpdate};
use poll_tracker::reconcile::{ingest, IngestOutcome};
use poll_tracker::report::RunReport;
use poll_tracker::store::PollStore;
use poll_tracker::ErrorKind;

fn raw(value: serde_json::Value) -> RawPoll {
    RawPoll::from_value(value).unwrap()
}

fn emerson_key() -> PollKey {
    PollKey::new("Emerson College", "2025-06-01", "National")
}

// Store holding ("Emerson College", 2025-06-01, National) with harris 40, newsom null
fn seeded_store(config: &TrackerConfig) -> PollStore {
    let mut store = PollStore::in_memory();
    let mut report = RunReport::new();
    let seed = raw(json!({
        "pollster": "Emerson College",
        "date": "2025-06-01",
        "state": "National",
        "harris": 40.0,
        "newsom": null
    }));
    ingest(&mut store, &seed, config, &mut report);
    assert_eq!(store.len(), 1);
    store
}

#[test]
fn single_share_gets_id_and_synthetic_crosstabs() {
    let config = TrackerConfig::default();
    let mut store = PollStore::in_memory();
    let mut report = RunReport::new();

    let outcome = ingest(
        &mut store,
        &raw(json!({"pollster": "Echelon Insights", "date": "2025-05-20", "harris": 42.0})),
        &config,
        &mut report,
    );

    assert!(matches!(outcome, IngestOutcome::Inserted { .. }));
    assert_eq!(store.len(), 1);
    let record = &store.records()[0];
    assert!(record.id.starts_with("auto-2025-05-20-national-echelon-insights"));

    let harris = record.crosstab("harris").expect("synthesized bundle");
    assert_eq!(harris.len(), 5);
    for dimension in ["gender", "age", "race", "education", "ideology"] {
        assert!(harris.contains_key(dimension), "missing {}", dimension);
    }
    assert!(!record.has_crosstab("newsom"));
    assert!(record.is_synthetic("harris"));
}

#[test]
fn gap_fill_adds_without_touching_existing() {
    let config = TrackerConfig::default();
    let mut store = seeded_store(&config);
    let mut report = RunReport::new();

    ingest(
        &mut store,
        &raw(json!({
            "pollster": "Emerson College",
            "date": "2025-06-01",
            "state": "National",
            "harris": null,
            "newsom": 22.0
        })),
        &config,
        &mut report,
    );

    let record = store.get(&emerson_key()).unwrap();
    assert_eq!(record.shares.get("harris"), Some(40.0));
    assert_eq!(record.shares.get("newsom"), Some(22.0));
    assert_eq!(store.len(), 1);
    assert_eq!(report.duplicates(), 1);
    assert_eq!(report.updated, 1);
}

#[test]
fn authoritative_update_overwrites_conflicts() {
    let config = TrackerConfig::default();
    let mut store = seeded_store(&config);

    let update = PollUpdate::from_raw(&raw(json!({"harris": 38.5, "newsom": null})), &config);
    let outcome = store
        .apply(&emerson_key(), &update, MergeMode::Authoritative, &config)
        .unwrap();

    let record = store.get(&emerson_key()).unwrap();
    assert_eq!(record.shares.get("harris"), Some(38.5));
    assert_eq!(record.shares.get("newsom"), None);
    assert_eq!(outcome.shares_changed, vec!["harris".to_string()]);
}

#[test]
fn poll_before_tracking_start_is_rejected() {
    let config = TrackerConfig::default();
    let mut store = PollStore::in_memory();
    let mut report = RunReport::new();

    let outcome = ingest(
        &mut store,
        &raw(json!({"pollster": "Emerson College", "date": "2024-01-01", "harris": 40.0, "newsom": 20.0})),
        &config,
        &mut report,
    );

    assert_eq!(outcome, IngestOutcome::Skipped);
    assert!(store.is_empty());
    assert_eq!(report.count(ErrorKind::InvalidRecord), 1);
}

#[test]
fn poll_without_any_share_is_rejected() {
    let config = TrackerConfig::default();
    let mut store = PollStore::in_memory();
    let mut report = RunReport::new();

    let outcome = ingest(
        &mut store,
        &raw(json!({"pollster": "Marist", "date": "2025-07-01", "harris": null, "newsom": "n/a"})),
        &config,
        &mut report,
    );

    assert_eq!(outcome, IngestOutcome::Skipped);
    assert!(store.is_empty());
    assert_eq!(report.skipped(), 1);
}

#[test]
fn saved_store_reloads_newest_first() {
    let config = TrackerConfig::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("public").join("polls.json");

    let mut store = PollStore::open(&path, &config).unwrap();
    let mut report = RunReport::new();
    for (pollster, date) in [("Marist", "2025-05-01"), ("Siena", "2025-08-01"), ("Quinnipiac", "2025-06-15")] {
        ingest(
            &mut store,
            &raw(json!({"pollster": pollster, "date": date, "harris": 30.0, "stewart": 0.0})),
            &config,
            &mut report,
        );
    }
    store.save().unwrap();

    let reloaded = PollStore::open(&path, &config).unwrap();
    let dates: Vec<String> = reloaded.records().iter().map(|r| r.date_string()).collect();
    assert_eq!(dates, vec!["2025-08-01", "2025-06-15", "2025-05-01"]);

    let siena = &reloaded.records()[0];
    assert_eq!(siena.shares.get("stewart"), Some(0.0));
    assert_eq!(siena.shares.get("kelly"), None);
    assert_eq!(siena.id, store.get(&siena.key()).unwrap().id);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"sourceUrl\""));
    assert!(text.contains("\"syntheticCrosstabs\""));
}
