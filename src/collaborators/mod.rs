pub mod anthropic;
pub mod document;
pub mod response;

use async_trait::async_trait;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::models::{PollRecord, RawPoll};
use crate::reconcile::crosstabs::DIMENSIONS;

/// Shape the extractor is asked to return: which candidate keys, and
/// whether crosstab bundles should be included.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSchema {
    pub candidates: Vec<(String, String)>,
    pub include_poll_fields: bool,
    pub include_crosstabs: bool,
}

impl ExtractionSchema {
    // Full record shape, used for discovery
    pub fn full_record(config: &TrackerConfig) -> Self {
        Self {
            candidates: config
                .candidates
                .iter()
                .map(|c| (c.id.clone(), c.name.clone()))
                .collect(),
            include_poll_fields: true,
            include_crosstabs: true,
        }
    }

    // Just the listed candidate shares, used for enrichment
    pub fn candidates_only(ids: &[String], config: &TrackerConfig) -> Self {
        Self {
            candidates: ids
                .iter()
                .map(|id| (id.clone(), config.candidate_name(id).to_string()))
                .collect(),
            include_poll_fields: false,
            include_crosstabs: false,
        }
    }

    pub fn candidate_names(&self) -> Vec<&str> {
        self.candidates.iter().map(|(_, name)| name.as_str()).collect()
    }

    /// JSON template shown to the model.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        if self.include_poll_fields {
            lines.push("  \"pollster\": \"string\",".to_string());
            lines.push("  \"date\": \"YYYY-MM-DD\",".to_string());
            lines.push("  \"state\": \"string or null (null for national polls)\",".to_string());
            lines.push("  \"sampleSize\": number or null,".to_string());
            lines.push("  \"sourceUrl\": \"string or null\",".to_string());
        }
        for (id, _) in &self.candidates {
            lines.push(format!("  \"{}\": number or null,", id));
        }
        if self.include_crosstabs {
            let dims: Vec<String> = DIMENSIONS
                .iter()
                .map(|(dim, cats)| {
                    let cells: Vec<String> = cats.iter().map(|c| format!("\"{}\": number", c)).collect();
                    format!("      \"{}\": {{{}}}", dim, cells.join(", "))
                })
                .collect();
            lines.push(format!(
                "  \"crosstabs\": {{\n    \"<candidate id>\": {{\n{}\n    }}\n  }}",
                dims.join(",\n")
            ));
        } else if let Some(last) = lines.last_mut() {
            last.pop();
        }
        format!("{{\n{}\n}}", lines.join("\n"))
    }
}

/// Language-model extraction from document or summary text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, poll: &PollRecord, text: &str, schema: &ExtractionSchema) -> Result<RawPoll>;
}

/// Free-text search. An empty result is a normal outcome, not an error.
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search_records(&self, query: &str, schema: &ExtractionSchema) -> Result<Vec<RawPoll>>;

    async fn search_locator(&self, query: &str) -> Result<Option<String>>;
}

/// Downloads a locator and returns its text.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

// Direct links to a release document rather than a landing page or article
pub fn is_document_url(url: Option<&str>) -> bool {
    let Some(url) = url else {
        return false;
    };
    let lower = url.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    let path = lower.split(&['?', '#'][..]).next().unwrap_or("");
    path.ends_with(".pdf")
        || lower.contains("viewcontent.cgi")
        || lower.contains("/pdf/")
        || (lower.contains("article=") && lower.contains("context="))
}
