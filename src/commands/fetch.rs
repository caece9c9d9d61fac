use log::info;

use crate::collaborators::anthropic::AnthropicClient;
use crate::config::{LlmConfig, TrackerConfig};
use crate::error::Result;
use crate::report::RunReport;
use crate::store::PollStore;
use crate::tasks::discovery;

pub async fn run(store: &mut PollStore, config: &TrackerConfig, report: &mut RunReport) -> Result<()> {
    let llm = LlmConfig::from_env()?;
    let searcher = AnthropicClient::new(&llm, &llm.discovery_model)?;
    info!("Tracking polls from {} to present", config.tracking_start);

    discovery::run_discovery(store, &searcher, config, report).await;
    Ok(())
}
