use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

use super::DocumentFetcher;
use crate::error::{PollError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; PollBot/1.0)";
const FETCH_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Pdf,
    Text,
    Unsupported,
}

fn detect_format(content_type: Option<&str>, body: &[u8]) -> Format {
    if body.starts_with(b"%PDF") {
        return Format::Pdf;
    }
    match content_type.map(|c| c.to_ascii_lowercase()) {
        Some(c) if c.contains("pdf") => Format::Pdf,
        Some(c) if c.starts_with("text/") => Format::Text,
        _ => Format::Unsupported,
    }
}

/// Downloads poll releases over HTTP; PDFs are turned into text.
pub struct HttpDocumentFetcher {
    client: Client,
}

impl HttpDocumentFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PollError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PollError::fetch(url, e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PollError::fetch(url, format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| PollError::fetch(url, e.to_string()))?;

        let text = match detect_format(content_type.as_deref(), &body) {
            Format::Pdf => {
                let bytes = body.to_vec();
                // pdf-extract is synchronous and can panic on malformed files
                tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                    .await
                    .map_err(|e| PollError::fetch(url, format!("PDF reader crashed: {}", e)))?
                    .map_err(|e| PollError::fetch(url, format!("PDF extraction failed: {}", e)))?
            }
            Format::Text => String::from_utf8_lossy(&body).into_owned(),
            Format::Unsupported => {
                return Err(PollError::fetch(
                    url,
                    format!("unsupported content type {}", content_type.as_deref().unwrap_or("<none>")),
                ));
            }
        };

        if text.trim().is_empty() {
            return Err(PollError::fetch(url, "document has no text"));
        }

        info!("Fetched {} chars from {}", text.len(), url);
        debug!("Content type: {:?}", content_type);
        Ok(text)
    }
}
