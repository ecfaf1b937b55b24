//! DuckDuckGo web search over the HTML endpoint. Needs no credentials.

use async_trait::async_trait;
use cellchat_agent::{Capability, Credentials};
use tracing::debug;

use crate::error::Result;
use crate::http::{self, strip_html_tags};

/// DuckDuckGo HTML search host.
const DUCKDUCKGO_BASE_URL: &str = "https://html.duckduckgo.com";

const MAX_RESULTS: usize = 5;

/// One parsed search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    pub const ID: &'static str = "duckduckgo";

    pub fn new() -> Self {
        Self::with_base_url(DUCKDUCKGO_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self, query: &str) -> Result<String> {
        // POST with form data is more reliable than GET for DDG.
        let request = self
            .client
            .post(format!("{}/html/", self.base_url.trim_end_matches('/')))
            .form(&[("q", query), ("kl", ""), ("df", "")]);
        let html = http::send_text(Self::ID, request).await?;

        let hits = parse_duckduckgo_results(&html, MAX_RESULTS);
        debug!(count = hits.len(), "duckduckgo search completed");

        if hits.is_empty() {
            return Ok("No good DuckDuckGo Search Result was found".into());
        }
        Ok(hits
            .iter()
            .map(|h| format!("{}\n{}\nLink: {}", h.title, h.snippet, h.url))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for DuckDuckGoSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "DuckDuckGoSearch"
    }

    fn description(&self) -> &str {
        "Use this tool for general-purpose web searches when you need up-to-date or \
         privacy-preserving results."
    }

    async fn search(&self, query: &str, _credentials: &Credentials) -> cellchat_agent::Result<String> {
        Ok(self.lookup(query).await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  HTML parsing
// ═══════════════════════════════════════════════════════════════════════

pub(crate) fn parse_duckduckgo_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let title_marker = "class=\"result__a\"";
    let snippet_marker = "class=\"result__snippet\"";

    let title_positions = marker_positions(html, title_marker);
    let snippet_positions = marker_positions(html, snippet_marker);

    let mut results = Vec::new();
    for (i, &title_pos) in title_positions.iter().enumerate() {
        if results.len() >= max_results {
            break;
        }

        let url = extract_href_before(&html[..title_pos]).unwrap_or_default();
        let url = clean_ddg_url(&url);

        let title = extract_tag_text(&html[title_pos + title_marker.len()..], "</a>");

        let snippet = snippet_positions
            .get(i)
            .map(|&pos| strip_html_tags(&extract_tag_text(&html[pos + snippet_marker.len()..], "</")))
            .unwrap_or_default();

        if !title.is_empty() || !url.is_empty() {
            results.push(SearchHit {
                title: strip_html_tags(&title).trim().to_owned(),
                url,
                snippet: snippet.trim().to_owned(),
            });
        }
    }

    results
}

fn marker_positions(html: &str, marker: &str) -> Vec<usize> {
    html.match_indices(marker).map(|(pos, _)| pos).collect()
}

/// Resolve DuckDuckGo redirect links to the destination URL.
fn clean_ddg_url(raw: &str) -> String {
    if raw.contains("duckduckgo.com/l/") {
        if let Some((_, query)) = raw.split_once('?') {
            if let Some((_, target)) = url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == "uddg")
            {
                return target.into_owned();
            }
        }
    }
    if raw.starts_with("//") {
        return format!("https:{raw}");
    }
    raw.to_owned()
}

fn extract_href_before(html_before: &str) -> Option<String> {
    let href_marker = "href=\"";
    let start = html_before.rfind(href_marker)? + href_marker.len();
    let remaining = &html_before[start..];
    let end = remaining.find('"')?;
    Some(remaining[..end].replace("&amp;", "&"))
}

fn extract_tag_text(html_after_marker: &str, end_marker: &str) -> String {
    let Some(closing_bracket) = html_after_marker.find('>') else {
        return String::new();
    };
    let content = &html_after_marker[closing_bracket + 1..];
    let end = content.find(end_marker).unwrap_or(content.len());
    content[..end].to_owned()
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
