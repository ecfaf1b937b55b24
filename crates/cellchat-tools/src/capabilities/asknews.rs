//! AskNews news search.
//!
//! Authenticates with the OAuth client-credentials grant, then queries the
//! news search endpoint for a prompt-ready string of recent articles.

use async_trait::async_trait;
use cellchat_agent::{Capability, CredentialField, Credentials};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::http::{self, str_field};

const ASKNEWS_AUTH_URL: &str = "https://auth.asknews.app";
const ASKNEWS_API_URL: &str = "https://api.asknews.app";

const ARTICLES: &str = "10";

pub struct AskNewsSearch {
    client: reqwest::Client,
    auth_url: String,
    api_url: String,
}

impl AskNewsSearch {
    pub const ID: &'static str = "asknews";

    pub fn new() -> Self {
        Self::with_base_urls(ASKNEWS_AUTH_URL, ASKNEWS_API_URL)
    }

    pub fn with_base_urls(auth_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            auth_url: auth_url.into(),
            api_url: api_url.into(),
        }
    }

    async fn access_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/oauth2/token", self.auth_url.trim_end_matches('/')))
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "news")]);
        let body = http::send_json(Self::ID, request).await?;

        let token = str_field(&body, "/access_token");
        if token.is_empty() {
            return Err(ToolError::parse(Self::ID, "token response has no access_token"));
        }
        Ok(token.to_owned())
    }

    async fn lookup(&self, query: &str, client_id: &str, client_secret: &str) -> Result<String> {
        let token = self.access_token(client_id, client_secret).await?;

        let request = self
            .client
            .get(format!("{}/v1/news/search", self.api_url.trim_end_matches('/')))
            .bearer_auth(token)
            .query(&[
                ("query", query),
                ("n_articles", ARTICLES),
                ("return_type", "string"),
                ("method", "kw"),
            ]);
        let body = http::send_json(Self::ID, request).await?;

        let articles = body.get("as_string").and_then(Value::as_str).unwrap_or_default();
        debug!(chars = articles.len(), "asknews search completed");

        if articles.trim().is_empty() {
            return Ok("No good AskNews Result was found".into());
        }
        Ok(articles.trim().to_owned())
    }
}

impl Default for AskNewsSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for AskNewsSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "AskNews"
    }

    fn description(&self) -> &str {
        "Use this tool to search for breaking news and recent media coverage."
    }

    fn required_credentials(&self) -> &'static [CredentialField] {
        &[CredentialField::ClientId, CredentialField::ClientSecret]
    }

    async fn search(&self, query: &str, credentials: &Credentials) -> cellchat_agent::Result<String> {
        let client_id = credentials.require(Self::ID, CredentialField::ClientId)?;
        let client_secret = credentials.require(Self::ID, CredentialField::ClientSecret)?;
        Ok(self.lookup(query, client_id, client_secret).await?)
    }
}
