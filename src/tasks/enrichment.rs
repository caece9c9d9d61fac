use log::{debug, info};

use crate::collaborators::{is_document_url, DocumentFetcher, ExtractionSchema, Extractor, Searcher};
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::models::PollRecord;
use crate::reconcile::merge::{self, MergeMode, MergeOutcome, PollUpdate};
use crate::report::RunReport;
use crate::store::PollStore;

// Names spelled out in the broad search query
const BROAD_SEARCH_NAMES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DirectSource,
    DiscoveredSource,
    BroadSearch,
}

impl Strategy {
    // Document re-reads may correct earlier numbers; a search summary may only add
    pub fn merge_mode(self) -> MergeMode {
        match self {
            Strategy::DirectSource | Strategy::DiscoveredSource => MergeMode::Authoritative,
            Strategy::BroadSearch => MergeMode::GapFill,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentState {
    NeedsWork,
    TriedDirectSource,
    TriedDiscoveredSource,
    TriedBroadSearch,
    Resolved(Strategy),
    Exhausted,
}

impl EnrichmentState {
    pub fn next_strategy(self) -> Option<Strategy> {
        match self {
            EnrichmentState::NeedsWork => Some(Strategy::DirectSource),
            EnrichmentState::TriedDirectSource => Some(Strategy::DiscoveredSource),
            EnrichmentState::TriedDiscoveredSource => Some(Strategy::BroadSearch),
            _ => None,
        }
    }

    pub fn after(self, strategy: Strategy, succeeded: bool) -> EnrichmentState {
        if succeeded {
            return EnrichmentState::Resolved(strategy);
        }
        match strategy {
            Strategy::DirectSource => EnrichmentState::TriedDirectSource,
            Strategy::DiscoveredSource => EnrichmentState::TriedDiscoveredSource,
            Strategy::BroadSearch => EnrichmentState::TriedBroadSearch,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EnrichmentState::Resolved(_) | EnrichmentState::Exhausted)
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    pub min_missing: usize,
    pub limit: usize,
    pub pollster: Option<String>,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            min_missing: 3,
            limit: 20,
            pollster: None,
        }
    }
}

pub fn is_eligible(record: &PollRecord, config: &TrackerConfig, options: &EnrichmentOptions) -> bool {
    if record.missing_count(config) < options.min_missing {
        return false;
    }
    if let Some(filter) = &options.pollster {
        if !record.pollster.to_lowercase().contains(&filter.to_lowercase()) {
            return false;
        }
    }
    config.is_full_field_pollster(&record.pollster)
}

// Most missing first, capped at the run limit
pub fn select_candidates<'a>(
    records: &'a [PollRecord],
    config: &TrackerConfig,
    options: &EnrichmentOptions,
) -> Vec<&'a PollRecord> {
    let mut picked: Vec<&PollRecord> = records
        .iter()
        .filter(|r| is_eligible(r, config, options))
        .collect();
    picked.sort_by_key(|r| std::cmp::Reverse(r.missing_count(config)));
    picked.truncate(options.limit);
    picked
}

#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub state: EnrichmentState,
    pub trail: Vec<EnrichmentState>,
    pub updated: Option<(PollRecord, MergeOutcome)>,
}

fn clip(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

// Candidates that were missing before the cycle and now carry a number
fn newly_filled(missing: &[String], merged: &PollRecord) -> Vec<String> {
    missing
        .iter()
        .filter(|id| merged.shares.is_numeric(id))
        .cloned()
        .collect()
}

/// Runs the fixed strategy order for one record and stops at the first
/// strategy that fills at least one missing candidate share.
pub struct Enricher<'a> {
    config: &'a TrackerConfig,
    extractor: &'a dyn Extractor,
    searcher: &'a dyn Searcher,
    fetcher: &'a dyn DocumentFetcher,
}

impl<'a> Enricher<'a> {
    pub fn new(
        config: &'a TrackerConfig,
        extractor: &'a dyn Extractor,
        searcher: &'a dyn Searcher,
        fetcher: &'a dyn DocumentFetcher,
    ) -> Self {
        Self {
            config,
            extractor,
            searcher,
            fetcher,
        }
    }

    pub async fn enrich(&self, record: &PollRecord, report: &mut RunReport) -> EnrichmentResult {
        let missing = record.shares.missing(self.config);
        info!(
            "Enriching {} ({}, {}): {} missing [{}]",
            record.pollster,
            record.state,
            record.date,
            missing.len(),
            missing.join(", ")
        );

        let mut state = EnrichmentState::NeedsWork;
        let mut trail = vec![state];
        let mut updated = None;

        // Corrections from a document that filled nothing new carry into the next strategy
        let mut base = record.clone();
        let mut carried = MergeOutcome::default();

        while let Some(strategy) = state.next_strategy() {
            let attempt = match strategy {
                Strategy::DirectSource => self.direct_source(&base).await,
                Strategy::DiscoveredSource => self.discovered_source(&base).await,
                Strategy::BroadSearch => self.broad_search(&base, &missing).await,
            };

            let applied = match attempt {
                Ok(Some(update)) => {
                    let (merged, outcome) = merge::merge(&base, &update, strategy.merge_mode(), self.config);
                    let filled = newly_filled(&missing, &merged);
                    if !filled.is_empty() {
                        info!("  {:?}: filled {} candidate(s): {}", strategy, filled.len(), filled.join(", "));
                        let mut total = std::mem::take(&mut carried);
                        total.absorb(outcome);
                        Some((merged, total))
                    } else {
                        if !outcome.shares_changed.is_empty() {
                            info!(
                                "  {:?}: corrected {} but filled nothing missing",
                                strategy,
                                outcome.shares_changed.join(", ")
                            );
                            base = merged;
                            carried.absorb(outcome);
                        } else {
                            info!("  {:?}: no new data", strategy);
                        }
                        None
                    }
                }
                Ok(None) => {
                    debug!("  {:?}: not available", strategy);
                    None
                }
                Err(e) => {
                    report.record_error(e);
                    None
                }
            };

            let succeeded = applied.is_some();
            state = state.after(strategy, succeeded);
            trail.push(state);
            if succeeded {
                updated = applied;
                break;
            }
        }

        if !state.is_terminal() {
            info!("  Could not find data");
            state = EnrichmentState::Exhausted;
            trail.push(state);
        }

        EnrichmentResult { state, trail, updated }
    }

    // Schema for a document read: every candidate, so earlier guesses can be corrected
    fn document_schema(&self) -> ExtractionSchema {
        let ids: Vec<String> = self.config.candidate_ids().map(str::to_string).collect();
        ExtractionSchema::candidates_only(&ids, self.config)
    }

    async fn read_document(&self, record: &PollRecord, url: &str) -> Result<PollUpdate> {
        let text = self.fetcher.fetch_text(url).await?;
        let text = clip(&text, self.config.document_char_limit);
        let raw = self.extractor.extract(record, text, &self.document_schema()).await?;
        Ok(PollUpdate {
            shares: raw.shares(self.config),
            crosstabs: raw.crosstabs(self.config),
            ..PollUpdate::default()
        })
    }

    async fn direct_source(&self, record: &PollRecord) -> Result<Option<PollUpdate>> {
        let Some(url) = record.source_url.as_deref().filter(|u| is_document_url(Some(*u))) else {
            return Ok(None);
        };
        info!("  Trying direct document: {}", url);
        self.read_document(record, url).await.map(Some)
    }

    async fn discovered_source(&self, record: &PollRecord) -> Result<Option<PollUpdate>> {
        let query = format!(
            "Find the direct PDF URL for this poll release:
Pollster: {}
Date: {}
State: {}
Suggested search: {} {} 2028 Democratic primary poll PDF toplines filetype:pdf",
            record.pollster, record.date, record.state, record.pollster, record.date
        );
        let Some(url) = self.searcher.search_locator(&query).await? else {
            return Ok(None);
        };
        if !is_document_url(Some(&url)) {
            debug!("  Search returned a non-document locator: {}", url);
            return Ok(None);
        }
        // Same link the direct strategy already read
        if record.source_url.as_deref() == Some(url.as_str()) {
            return Ok(None);
        }

        info!("  Found document: {}", url);
        let update = self.read_document(record, &url).await?;
        Ok(Some(update.with_source_url(&url)))
    }

    async fn broad_search(&self, record: &PollRecord, missing: &[String]) -> Result<Option<PollUpdate>> {
        if missing.is_empty() {
            return Ok(None);
        }
        let names: Vec<&str> = missing
            .iter()
            .take(BROAD_SEARCH_NAMES)
            .map(|id| self.config.candidate_name(id))
            .collect();
        let month: String = record.date_string().chars().take(7).collect();
        let query = format!(
            "Search for the full results of this poll:
Pollster: {pollster}
Date: {date}
State: {state}

I need vote share percentages for these candidates who are missing from my data:
{wanted}

Search query to use: \"{pollster} {month} 2028 Democratic primary poll full results {top}\"

Use null for candidates not tested or not found. If you can't find the poll, return all nulls.",
            pollster = record.pollster,
            date = record.date,
            state = record.state,
            wanted = names.iter().map(|n| format!("- {}", n)).collect::<Vec<_>>().join("\n"),
            month = month,
            top = names.iter().take(3).copied().collect::<Vec<_>>().join(" "),
        );

        info!("  Trying web search...");
        let schema = ExtractionSchema::candidates_only(missing, self.config);
        let found = self.searcher.search_records(&query, &schema).await?;
        Ok(found.first().map(|raw| PollUpdate {
            shares: raw.shares(self.config),
            ..PollUpdate::default()
        }))
    }
}

/// Enriches eligible records one at a time and swaps successful merges into
/// the store. Returns how many records were resolved.
pub async fn run_backfill(
    store: &mut PollStore,
    enricher: &Enricher<'_>,
    config: &TrackerConfig,
    options: &EnrichmentOptions,
    report: &mut RunReport,
) -> usize {
    let candidates: Vec<PollRecord> = select_candidates(store.records(), config, options)
        .into_iter()
        .cloned()
        .collect();

    info!("Found {} polls to backfill", candidates.len());
    for record in &candidates {
        info!(
            "  {} {} ({}): {} missing",
            record.date,
            record.pollster,
            record.state,
            record.missing_count(config)
        );
    }

    for record in &candidates {
        let result = enricher.enrich(record, report).await;
        match result.updated {
            Some((merged, _)) => {
                if store.replace(merged) {
                    report.resolved += 1;
                }
            }
            None => report.exhausted += 1,
        }
    }
    report.resolved
}
