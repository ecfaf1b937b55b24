//! Wikipedia lookup through the MediaWiki search and extracts APIs.

use async_trait::async_trait;
use cellchat_agent::{Capability, Credentials};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::http::{self, str_field, truncate_chars};

const WIKIPEDIA_BASE_URL: &str = "https://en.wikipedia.org";

const TOP_K_RESULTS: usize = 3;
const MAX_EXTRACT_CHARS: usize = 500;

pub struct WikipediaSearch {
    client: reqwest::Client,
    base_url: String,
}

impl WikipediaSearch {
    pub const ID: &'static str = "wikipedia";

    pub fn new() -> Self {
        Self::with_base_url(WIKIPEDIA_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self, query: &str) -> Result<String> {
        let limit = TOP_K_RESULTS.to_string();
        // One round trip: search as a generator feeding the extracts prop.
        let request = self
            .client
            .get(format!("{}/w/api.php", self.base_url.trim_end_matches('/')))
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exlimit", limit.as_str()),
                ("redirects", "1"),
            ]);
        let body = http::send_json(Self::ID, request).await?;

        if let Some(err) = body.get("error") {
            return Err(ToolError::parse(
                Self::ID,
                format!("api error: {}", str_field(err, "/info")),
            ));
        }

        let pages = ranked_pages(&body);
        debug!(count = pages.len(), "wikipedia search completed");

        if pages.is_empty() {
            return Ok("No good Wikipedia Search Result was found".into());
        }
        Ok(pages
            .iter()
            .map(|(title, extract)| {
                format!(
                    "Page: {title}\nSummary: {}",
                    truncate_chars(extract.trim(), MAX_EXTRACT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

impl Default for WikipediaSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// `(title, extract)` pairs in search-rank order.
fn ranked_pages(body: &Value) -> Vec<(String, String)> {
    let mut pages: Vec<(u64, String, String)> = body
        .pointer("/query/pages")
        .and_then(Value::as_array)
        .map(|pages| {
            pages
                .iter()
                .filter(|p| p.get("missing").is_none())
                .map(|p| {
                    (
                        p.get("index").and_then(Value::as_u64).unwrap_or(u64::MAX),
                        str_field(p, "/title").to_owned(),
                        str_field(p, "/extract").to_owned(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    pages.sort_by_key(|(index, _, _)| *index);
    pages
        .into_iter()
        .take(TOP_K_RESULTS)
        .map(|(_, title, extract)| (title, extract))
        .collect()
}

#[async_trait]
impl Capability for WikipediaSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "WikipediaSearch"
    }

    fn description(&self) -> &str {
        "Use this tool for general factual or historical information from Wikipedia."
    }

    async fn search(&self, query: &str, _credentials: &Credentials) -> cellchat_agent::Result<String> {
        Ok(self.lookup(query).await?)
    }
}
