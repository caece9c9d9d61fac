use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;

use crate::error::{PollError, Result};
use crate::models::RawPoll;

lazy_static! {
    static ref FENCE: Regex = Regex::new(r"```(?:json|JSON)?").unwrap();
    static ref URL: Regex = Regex::new(r#"https?://[^\s"'<>`]+"#).unwrap();
}

pub fn strip_fences(text: &str) -> String {
    FENCE.replace_all(text, "").trim().to_string()
}

// Whole text first, then the outermost {...} or [...] span if the model wrapped it in prose
fn parse_json(text: &str) -> Result<Value> {
    let cleaned = strip_fences(text);
    if cleaned.is_empty() {
        return Err(PollError::extraction("empty response"));
    }
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Ok(value);
    }

    // Outermost container opens first
    let mut spans: Vec<(usize, usize)> = [('[', ']'), ('{', '}')]
        .into_iter()
        .filter_map(|(open, close)| Some((cleaned.find(open)?, cleaned.rfind(close)?)))
        .filter(|(start, end)| start < end)
        .collect();
    spans.sort();

    for (start, end) in spans {
        if let Ok(value) = serde_json::from_str(&cleaned[start..=end]) {
            debug!("Recovered JSON from surrounding prose");
            return Ok(value);
        }
    }

    let preview: String = cleaned.chars().take(200).collect();
    Err(PollError::extraction(format!("response is not JSON: {}", preview)))
}

/// A single record-shaped object.
pub fn parse_record(text: &str) -> Result<RawPoll> {
    match parse_json(text)? {
        Value::Object(map) => Ok(RawPoll::from_value(Value::Object(map)).unwrap_or_default()),
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => {
            Ok(RawPoll::from_value(items.remove(0)).unwrap_or_default())
        }
        other => Err(PollError::extraction(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

/// A list of record-shaped objects. Empty text or `[]` is an empty list;
/// non-object items are dropped.
pub fn parse_record_list(text: &str) -> Result<Vec<RawPoll>> {
    if strip_fences(text).is_empty() {
        return Ok(Vec::new());
    }
    match parse_json(text)? {
        Value::Array(items) => {
            let total = items.len();
            let records: Vec<RawPoll> = items.into_iter().filter_map(RawPoll::from_value).collect();
            if records.len() < total {
                warn!("Dropped {} non-object item(s) from search results", total - records.len());
            }
            Ok(records)
        }
        Value::Object(map) => Ok(RawPoll::from_value(Value::Object(map)).into_iter().collect()),
        other => Err(PollError::extraction(format!(
            "expected a JSON array, got {}",
            kind_of(&other)
        ))),
    }
}

/// A bare locator. `null`, blank, or text without a URL is "not found".
pub fn parse_locator(text: &str) -> Option<String> {
    let cleaned = strip_fences(text);
    let trimmed = cleaned.trim().trim_matches('"').trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    URL.find(trimmed).map(|m| {
        m.as_str()
            .trim_end_matches(|c| matches!(c, '.' | ',' | ')' | ']'))
            .to_string()
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
