//! Reddit post search with application-only OAuth.

use async_trait::async_trait;
use cellchat_agent::{Capability, CredentialField, Credentials};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::http::{self, str_field, truncate_chars};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com";
const REDDIT_API_URL: &str = "https://oauth.reddit.com";

const LIMIT: &str = "10";
const MAX_BODY_CHARS: usize = 300;

pub struct RedditSearch {
    client: reqwest::Client,
    auth_url: String,
    api_url: String,
}

impl RedditSearch {
    pub const ID: &'static str = "reddit";

    pub fn new() -> Self {
        Self::with_base_urls(REDDIT_AUTH_URL, REDDIT_API_URL)
    }

    pub fn with_base_urls(auth_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            auth_url: auth_url.into(),
            api_url: api_url.into(),
        }
    }

    async fn access_token(&self, client_id: &str, client_secret: &str, user_agent: &str) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/api/v1/access_token", self.auth_url.trim_end_matches('/')))
            .basic_auth(client_id, Some(client_secret))
            .header(reqwest::header::USER_AGENT, user_agent)
            .form(&[("grant_type", "client_credentials")]);
        let body = http::send_json(Self::ID, request).await?;

        let token = str_field(&body, "/access_token");
        if token.is_empty() {
            return Err(ToolError::parse(
                Self::ID,
                format!("token response has no access_token: {}", str_field(&body, "/error")),
            ));
        }
        Ok(token.to_owned())
    }

    async fn lookup(&self, query: &str, credentials: &Credentials) -> Result<String> {
        let client_id = required(credentials, CredentialField::ClientId)?;
        let client_secret = required(credentials, CredentialField::ClientSecret)?;
        let user_agent = required(credentials, CredentialField::UserAgent)?;

        let token = self.access_token(client_id, client_secret, user_agent).await?;

        let request = self
            .client
            .get(format!("{}/r/all/search", self.api_url.trim_end_matches('/')))
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, user_agent)
            .query(&[
                ("q", query),
                ("limit", LIMIT),
                ("sort", "relevance"),
                ("t", "all"),
                ("raw_json", "1"),
            ]);
        let body = http::send_json(Self::ID, request).await?;

        let posts: Vec<&Value> = body
            .pointer("/data/children")
            .and_then(Value::as_array)
            .map(|children| children.iter().filter_map(|c| c.get("data")).collect())
            .unwrap_or_default();
        debug!(count = posts.len(), "reddit search completed");

        if posts.is_empty() {
            return Ok(format!("Searching r/all did not find any posts for: {query}"));
        }

        let rendered: Vec<String> = posts
            .iter()
            .map(|p| {
                format!(
                    "Post Title: '{}'\n User: {}\n Subreddit: {}\n Text body: {}\n Post URL: https://www.reddit.com{}\n Score: {}",
                    str_field(p, "/title"),
                    str_field(p, "/author"),
                    str_field(p, "/subreddit_name_prefixed"),
                    truncate_chars(str_field(p, "/selftext").trim(), MAX_BODY_CHARS),
                    str_field(p, "/permalink"),
                    p.get("score").and_then(Value::as_i64).unwrap_or(0),
                )
            })
            .collect();

        Ok(format!(
            "Searching r/all found {} posts:\n{}",
            rendered.len(),
            rendered.join("\n")
        ))
    }
}

fn required(credentials: &Credentials, field: CredentialField) -> Result<&str> {
    credentials.get(field).ok_or_else(|| ToolError::MissingCredential {
        capability: RedditSearch::ID.to_owned(),
        field: field.to_string(),
    })
}

impl Default for RedditSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for RedditSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "RedditSearch"
    }

    fn description(&self) -> &str {
        "Use this tool to search Reddit posts and community discussions."
    }

    fn required_credentials(&self) -> &'static [CredentialField] {
        &[
            CredentialField::ClientId,
            CredentialField::ClientSecret,
            CredentialField::UserAgent,
        ]
    }

    async fn search(&self, query: &str, credentials: &Credentials) -> cellchat_agent::Result<String> {
        Ok(self.lookup(query, credentials).await?)
    }
}
