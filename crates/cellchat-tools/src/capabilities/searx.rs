//! SearxNG meta search. The instance URL comes from the `host` credential.

use async_trait::async_trait;
use cellchat_agent::{Capability, CredentialField, Credentials};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::http::{self, squash_whitespace, str_field};

const MAX_RESULTS: usize = 10;

pub struct SearxSearch {
    client: reqwest::Client,
}

impl SearxSearch {
    pub const ID: &'static str = "searx";

    pub fn new() -> Self {
        Self {
            client: http::client(),
        }
    }

    async fn lookup(&self, query: &str, host: &str) -> Result<String> {
        let base = normalize_host(host)?;
        let request = self
            .client
            .get(format!("{base}/search"))
            .query(&[("q", query), ("format", "json")]);
        let body = http::send_json(Self::ID, request).await?;

        let results = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        debug!(count = results.len(), "searx search completed");

        // Direct answers come first, as on the results page.
        let mut parts: Vec<String> = body
            .get("answers")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().or_else(|| v.get("answer").and_then(Value::as_str)))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        parts.extend(
            results
                .iter()
                .take(MAX_RESULTS)
                .map(|r| squash_whitespace(str_field(r, "/content")))
                .filter(|s| !s.is_empty()),
        );

        if parts.is_empty() {
            return Ok("No good search result found".into());
        }
        Ok(parts.join("\n\n"))
    }
}

impl Default for SearxSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept `searx.example.org` as well as full URLs.
fn normalize_host(host: &str) -> Result<String> {
    let host = host.trim().trim_end_matches('/');
    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    };
    url::Url::parse(&with_scheme)
        .map_err(|e| ToolError::invalid_input(SearxSearch::ID, format!("bad host {host:?}: {e}")))?;
    Ok(with_scheme)
}

#[async_trait]
impl Capability for SearxSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "SearxSearch"
    }

    fn description(&self) -> &str {
        "Use this tool for privacy-respecting meta search results across multiple engines."
    }

    fn required_credentials(&self) -> &'static [CredentialField] {
        &[CredentialField::Host]
    }

    async fn search(&self, query: &str, credentials: &Credentials) -> cellchat_agent::Result<String> {
        let host = credentials.require(Self::ID, CredentialField::Host)?;
        Ok(self.lookup(query, host).await?)
    }
}
