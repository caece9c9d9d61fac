mod backfill;
mod fetch;
mod import;
mod summary;

use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::report::RunReport;
use crate::store::PollStore;
use crate::tasks::enrichment::EnrichmentOptions;

/// Keeps the 2028 Democratic primary poll file current
#[derive(Parser, Debug)]
#[command(name = "poll-tracker")]
#[command(version)]
pub struct Cli {
    /// Poll store file (default: public/polls.json)
    #[arg(long, global = true, env = "POLLS_FILE")]
    pub polls_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search for newly published polls and add them
    Fetch {
        /// Run everything but do not write the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Fill in missing candidate numbers for incomplete polls
    Backfill {
        /// Minimum missing candidates to trigger backfill
        #[arg(long, default_value_t = 3)]
        min_missing: usize,

        /// Max polls to process
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only backfill pollsters whose name contains this
        #[arg(long)]
        pollster: Option<String>,

        /// Run everything but do not write the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Ingest raw poll records from a JSON file
    Import {
        /// JSON array (or single object) of poll records
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long)]
        dry_run: bool,
    },

    /// Print weighted polling averages
    Summary {
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

impl Command {
    fn dry_run(&self) -> bool {
        match self {
            Command::Fetch { dry_run } | Command::Backfill { dry_run, .. } | Command::Import { dry_run, .. } => {
                *dry_run
            }
            Command::Summary { .. } => true,
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = TrackerConfig::from_env()?;
    if let Some(path) = cli.polls_file {
        config = config.with_polls_file(path);
    }

    let mut store = PollStore::open(&config.polls_file, &config)?;
    info!("Loaded {} existing polls from {}", store.len(), config.polls_file.display());

    let mut report = RunReport::new();
    let dry_run = cli.command.dry_run();

    match cli.command {
        Command::Fetch { .. } => fetch::run(&mut store, &config, &mut report).await?,
        Command::Backfill {
            min_missing,
            limit,
            pollster,
            ..
        } => {
            let options = EnrichmentOptions {
                min_missing,
                limit,
                pollster,
            };
            backfill::run(&mut store, &config, &options, &mut report).await?
        }
        Command::Import { file, .. } => import::run(&file, &mut store, &config, &mut report)?,
        Command::Summary { top } => {
            summary::run(&store, &config, top);
            return Ok(());
        }
    }

    report.log_summary();
    finish(&mut store, dry_run)
}

// Single whole-store write at the end of a run
fn finish(store: &mut PollStore, dry_run: bool) -> Result<()> {
    if dry_run {
        info!("Dry run: store not written");
        return Ok(());
    }
    if !store.is_modified() {
        info!("No changes to save");
        return Ok(());
    }
    store.save()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backfill_flags_and_defaults() {
        let cli = Cli::parse_from(["poll-tracker", "backfill", "--pollster", "Emerson", "--dry-run"]);
        match cli.command {
            Command::Backfill {
                min_missing,
                limit,
                pollster,
                dry_run,
            } => {
                assert_eq!(min_missing, 3);
                assert_eq!(limit, 20);
                assert_eq!(pollster.as_deref(), Some("Emerson"));
                assert!(dry_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn polls_file_is_global() {
        let cli = Cli::parse_from(["poll-tracker", "import", "new.json", "--polls-file", "/tmp/polls.json"]);
        assert_eq!(cli.polls_file, Some(PathBuf::from("/tmp/polls.json")));
        assert!(!cli.command.dry_run());
    }

    #[test]
    fn dry_run_skips_the_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polls.json");
        let config = TrackerConfig::default();
        let mut store = PollStore::open(&path, &config).unwrap();

        finish(&mut store, false).unwrap();
        assert!(!path.exists(), "unchanged store is not written");

        let raw = crate::models::RawPoll::from_value(serde_json::json!({
            "pollster": "Marist", "date": "2025-05-01", "harris": 30.0
        }))
        .unwrap();
        crate::reconcile::ingest(&mut store, &raw, &config, &mut RunReport::new());
        finish(&mut store, true).unwrap();
        assert!(!path.exists());
        finish(&mut store, false).unwrap();
        assert!(path.exists());
    }
}
