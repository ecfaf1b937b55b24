//! arXiv paper search over the public Atom API.

use async_trait::async_trait;
use cellchat_agent::{Capability, Credentials};
use tracing::debug;

use crate::error::Result;
use crate::http::{self, decode_entities, squash_whitespace, truncate_chars};

const ARXIV_BASE_URL: &str = "https://export.arxiv.org";

const TOP_K_RESULTS: usize = 3;
const MAX_SUMMARY_CHARS: usize = 500;

/// One `<entry>` of the Atom feed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Paper {
    published: String,
    title: String,
    authors: Vec<String>,
    summary: String,
}

pub struct ArxivSearch {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivSearch {
    pub const ID: &'static str = "arxiv";

    pub fn new() -> Self {
        Self::with_base_url(ARXIV_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
        }
    }

    async fn lookup(&self, query: &str) -> Result<String> {
        let search_query = format!("all:{query}");
        let max_results = TOP_K_RESULTS.to_string();
        let request = self
            .client
            .get(format!("{}/api/query", self.base_url.trim_end_matches('/')))
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
            ]);
        let feed = http::send_text(Self::ID, request).await?;

        let papers = parse_feed(&feed, TOP_K_RESULTS);
        debug!(count = papers.len(), "arxiv search completed");

        if papers.is_empty() {
            return Ok("No good Arxiv Result was found".into());
        }
        Ok(papers
            .iter()
            .map(|p| {
                format!(
                    "Published: {}\nTitle: {}\nAuthors: {}\nSummary: {}",
                    p.published,
                    p.title,
                    p.authors.join(", "),
                    truncate_chars(&p.summary, MAX_SUMMARY_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

impl Default for ArxivSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for ArxivSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "ArxivSearch"
    }

    fn description(&self) -> &str {
        "Use this tool to search and summarize academic or scientific papers from Arxiv. \
         Ideal for technical or research topics."
    }

    async fn search(&self, query: &str, _credentials: &Credentials) -> cellchat_agent::Result<String> {
        Ok(self.lookup(query).await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Atom parsing
// ═══════════════════════════════════════════════════════════════════════

fn parse_feed(xml: &str, max_results: usize) -> Vec<Paper> {
    xml.split("<entry>")
        .skip(1)
        .filter_map(|chunk| chunk.split("</entry>").next())
        .take(max_results)
        .map(|entry| Paper {
            published: element_text(entry, "published")
                .map(|d| d.chars().take(10).collect())
                .unwrap_or_default(),
            title: element_text(entry, "title").unwrap_or_default(),
            authors: entry
                .split("<author>")
                .skip(1)
                .filter_map(|a| element_text(a, "name"))
                .collect(),
            summary: element_text(entry, "summary").unwrap_or_default(),
        })
        .filter(|p| !p.title.is_empty())
        .collect()
}

/// Text content of the first `<tag>` element in `xml`, whitespace-squashed.
fn element_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let start = xml.find(&open)?;
    let after_open = &xml[start + open.len()..];
    // Skip attributes; `<titlefoo>` is not `<title>`.
    if !after_open.starts_with(['>', ' ', '\n', '\t', '/']) {
        return None;
    }
    let content_start = after_open.find('>')? + 1;
    let content = &after_open[content_start..];
    let end = content.find(&close)?;
    Some(squash_whitespace(&decode_entities(&content[..end])))
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
