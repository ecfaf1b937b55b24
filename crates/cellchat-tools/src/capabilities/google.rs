//! Google web search, Google Scholar and Google Trends.
//!
//! Web search goes through the Custom Search JSON API. Scholar and Trends go
//! through SerpAPI, keyed by the `api_key` credential.

use async_trait::async_trait;
use cellchat_agent::{Capability, CredentialField, Credentials};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::http::{self, squash_whitespace, str_field};

const GOOGLE_API_BASE_URL: &str = "https://www.googleapis.com";
const SERPAPI_BASE_URL: &str = "https://serpapi.com";

const SEARCH_RESULTS: usize = 10;
const SCHOLAR_RESULTS: usize = 5;

/// SerpAPI reports failures in an `error` field with a 200 status.
fn serpapi_error(capability: &str, body: &Value) -> Result<()> {
    match body.get("error").and_then(Value::as_str) {
        Some(msg) if !msg.contains("hasn't returned any results") => {
            Err(ToolError::parse(capability, format!("serpapi error: {msg}")))
        }
        _ => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Google web search
// ═══════════════════════════════════════════════════════════════════════

pub struct GoogleSearch {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleSearch {
    pub const ID: &'static str = "google_search";

    pub fn new() -> Self {
        Self::with_base_url(GOOGLE_API_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self, query: &str, api_key: &str, cse_id: &str) -> Result<String> {
        let num = SEARCH_RESULTS.to_string();
        let request = self
            .client
            .get(format!("{}/customsearch/v1", self.base_url.trim_end_matches('/')))
            .query(&[("key", api_key), ("cx", cse_id), ("q", query), ("num", num.as_str())]);
        let body = http::send_json(Self::ID, request).await?;

        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(count = items.len(), "google search completed");

        let snippets: Vec<String> = items
            .iter()
            .map(|item| squash_whitespace(str_field(item, "/snippet")))
            .filter(|s| !s.is_empty())
            .collect();

        if snippets.is_empty() {
            return Ok("No good Google Search Result was found".into());
        }
        Ok(snippets.join(" "))
    }
}

impl Default for GoogleSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for GoogleSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "GoogleSearch"
    }

    fn description(&self) -> &str {
        "Use this tool for broad and up-to-date web searches using Google."
    }

    fn required_credentials(&self) -> &'static [CredentialField] {
        &[CredentialField::ApiKey, CredentialField::CseId]
    }

    async fn search(&self, query: &str, credentials: &Credentials) -> cellchat_agent::Result<String> {
        let api_key = credentials.require(Self::ID, CredentialField::ApiKey)?;
        let cse_id = credentials.require(Self::ID, CredentialField::CseId)?;
        Ok(self.lookup(query, api_key, cse_id).await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Google Scholar
// ═══════════════════════════════════════════════════════════════════════

pub struct GoogleScholarSearch {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleScholarSearch {
    pub const ID: &'static str = "google_scholar";

    pub fn new() -> Self {
        Self::with_base_url(SERPAPI_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self, query: &str, api_key: &str) -> Result<String> {
        let num = SCHOLAR_RESULTS.to_string();
        let request = self
            .client
            .get(format!("{}/search.json", self.base_url.trim_end_matches('/')))
            .query(&[
                ("engine", "google_scholar"),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", api_key),
            ]);
        let body = http::send_json(Self::ID, request).await?;
        serpapi_error(Self::ID, &body)?;

        let results = body
            .get("organic_results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(count = results.len(), "google scholar search completed");

        if results.is_empty() {
            return Ok("No good Google Scholar Result was found".into());
        }
        Ok(results
            .iter()
            .take(SCHOLAR_RESULTS)
            .map(|r| {
                let citations = r
                    .pointer("/inline_links/cited_by/total")
                    .and_then(Value::as_u64)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "n/a".into());
                format!(
                    "Title: {}\nAuthors: {}\nSummary: {}\nTotal-Citations: {citations}",
                    str_field(r, "/title"),
                    str_field(r, "/publication_info/summary"),
                    squash_whitespace(str_field(r, "/snippet")),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

impl Default for GoogleScholarSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for GoogleScholarSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "GoogleScholarSearch"
    }

    fn description(&self) -> &str {
        "Use this tool to find peer-reviewed research papers from Google Scholar."
    }

    fn required_credentials(&self) -> &'static [CredentialField] {
        &[CredentialField::ApiKey]
    }

    async fn search(&self, query: &str, credentials: &Credentials) -> cellchat_agent::Result<String> {
        let api_key = credentials.require(Self::ID, CredentialField::ApiKey)?;
        Ok(self.lookup(query, api_key).await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Google Trends
// ═══════════════════════════════════════════════════════════════════════

pub struct GoogleTrendsSearch {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTrendsSearch {
    pub const ID: &'static str = "google_trends";

    pub fn new() -> Self {
        Self::with_base_url(SERPAPI_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self, query: &str, api_key: &str) -> Result<String> {
        let request = self
            .client
            .get(format!("{}/search.json", self.base_url.trim_end_matches('/')))
            .query(&[
                ("engine", "google_trends"),
                ("q", query),
                ("data_type", "TIMESERIES"),
                ("api_key", api_key),
            ]);
        let body = http::send_json(Self::ID, request).await?;
        serpapi_error(Self::ID, &body)?;

        let timeline = body
            .pointer("/interest_over_time/timeline_data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(points = timeline.len(), "google trends lookup completed");

        Ok(summarize_timeline(query, &timeline))
    }
}

impl Default for GoogleTrendsSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// Min, max, mean and first-to-last change of the first series.
fn summarize_timeline(query: &str, timeline: &[Value]) -> String {
    let values: Vec<f64> = timeline
        .iter()
        .filter_map(|point| point.pointer("/values/0/extracted_value"))
        .filter_map(Value::as_f64)
        .collect();

    let (Some(first), Some(last)) = (values.first(), values.last()) else {
        return "No good Trend Result was found".into();
    };

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let change = if *first == 0.0 {
        0.0
    } else {
        (last - first) / first * 100.0
    };

    let date_from = timeline.first().map(|p| str_field(p, "/date")).unwrap_or_default();
    let date_to = timeline.last().map(|p| str_field(p, "/date")).unwrap_or_default();

    format!(
        "Query: {query}\nDate From: {date_from}\nDate To: {date_to}\n\
         Min Value: {min}\nMax Value: {max}\nAverage Value: {avg:.1}\n\
         Percent Change: {change:.1}%"
    )
}

#[async_trait]
impl Capability for GoogleTrendsSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "GoogleTrends"
    }

    fn description(&self) -> &str {
        "Use this tool to analyze trending search topics over time or regions."
    }

    fn required_credentials(&self) -> &'static [CredentialField] {
        &[CredentialField::ApiKey]
    }

    async fn search(&self, query: &str, credentials: &Credentials) -> cellchat_agent::Result<String> {
        let api_key = credentials.require(Self::ID, CredentialField::ApiKey)?;
        Ok(self.lookup(query, api_key).await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
