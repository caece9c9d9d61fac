use log::info;

use crate::collaborators::anthropic::AnthropicClient;
use crate::collaborators::document::HttpDocumentFetcher;
use crate::config::{LlmConfig, TrackerConfig};
use crate::error::Result;
use crate::report::RunReport;
use crate::store::PollStore;
use crate::tasks::enrichment::{self, Enricher, EnrichmentOptions};

pub async fn run(
    store: &mut PollStore,
    config: &TrackerConfig,
    options: &EnrichmentOptions,
    report: &mut RunReport,
) -> Result<()> {
    if enrichment::select_candidates(store.records(), config, options).is_empty() {
        info!("No polls need backfilling");
        return Ok(());
    }

    let llm = LlmConfig::from_env()?;
    // One client serves both roles; only the prompts differ
    let client = AnthropicClient::new(&llm, &llm.model)?;
    let fetcher = HttpDocumentFetcher::new()?;
    let enricher = Enricher::new(config, &client, &client, &fetcher);

    enrichment::run_backfill(store, &enricher, config, options, report).await;
    Ok(())
}
