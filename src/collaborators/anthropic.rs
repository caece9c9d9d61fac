use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::response::{parse_locator, parse_record, parse_record_list};
use super::{ExtractionSchema, Extractor, Searcher};
use crate::config::LlmConfig;
use crate::error::{PollError, Result};
use crate::models::{PollRecord, RawPoll};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const DISCOVERY_SYSTEM_PROMPT: &str = "You are a political data analyst. Your job is to find \
published polls for the 2028 US Democratic presidential primary and return them as structured JSON.

Rules:
- Only include polls that test the 2028 Democratic presidential primary
- Return ONLY valid JSON, no markdown, no explanation, no code fences
- Use null for candidates not included in a poll (do not use 0 unless the poll reported 0)
- Numbers are percentages as floats, e.g. 39.0
- Include crosstabs only where the poll report publishes demographic breakdowns; otherwise null
- If nothing is found, return an empty array: []";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Messages-API client acting as both extractor and (with the web search
/// tool) searcher.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PollError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: model.to_string(),
        })
    }

    // Concatenated text blocks of one messages call
    async fn complete(&self, system: Option<&str>, prompt: &str, max_tokens: u32, web_search: bool) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if web_search {
            body["tools"] = json!([{"type": "web_search_20250305", "name": "web_search"}]);
        }

        debug!("Calling {} (web search: {})", self.model, web_search);
        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| PollError::extraction(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(300).collect();
            return Err(PollError::extraction(format!("API returned {}: {}", status, preview)));
        }

        let data: MessagesResponse = response
            .json()
            .await
            .map_err(|e| PollError::extraction(format!("unreadable API response: {}", e)))?;

        let text: String = data
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Extractor for AnthropicClient {
    async fn extract(&self, poll: &PollRecord, text: &str, schema: &ExtractionSchema) -> Result<RawPoll> {
        let wanted: Vec<String> = schema.candidate_names().iter().map(|n| format!("- {}", n)).collect();
        let prompt = format!(
            "Extract 2028 Democratic presidential primary poll numbers from this document.
Pollster: {pollster}
Date: {date}
State: {state}

I need the vote share percentages for these specific candidates:
{wanted}

Return ONLY a JSON object with these candidate IDs and their percentages (or null if not tested):
{schema}

Be precise: use the exact numbers from the document. No markdown, no explanation.

--- DOCUMENT ---
{text}
--- END ---",
            pollster = poll.pollster,
            date = poll.date,
            state = poll.state,
            wanted = wanted.join("\n"),
            schema = schema.render(),
            text = text,
        );

        let reply = self.complete(None, &prompt, 500, false).await?;
        parse_record(&reply)
    }
}

#[async_trait]
impl Searcher for AnthropicClient {
    async fn search_records(&self, query: &str, schema: &ExtractionSchema) -> Result<Vec<RawPoll>> {
        let prompt = format!(
            "{query}

Each result must be a JSON object with these exact keys:
{schema}

Return a JSON array of such objects (a single object is fine when only one poll is requested).",
            query = query,
            schema = schema.render(),
        );

        let max_tokens = if schema.include_poll_fields { 4000 } else { 600 };
        let reply = self
            .complete(Some(DISCOVERY_SYSTEM_PROMPT), &prompt, max_tokens, true)
            .await?;
        if reply.is_empty() {
            info!("Search returned no text");
            return Ok(Vec::new());
        }
        parse_record_list(&reply)
    }

    async fn search_locator(&self, query: &str) -> Result<Option<String>> {
        let prompt = format!(
            "{}\n\nSearch for it and return ONLY the direct URL, nothing else. If not found, return: null",
            query
        );
        let reply = self.complete(None, &prompt, 200, true).await?;
        Ok(parse_locator(&reply))
    }
}
