//! Shared HTTP plumbing for capabilities.

use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, ToolError};

/// Browser-like User-Agent; some endpoints block default client agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest upstream error body kept in error messages.
const MAX_ERROR_BODY: usize = 300;

pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Send `request` and return the response body, failing on non-2xx.
pub(crate) async fn send_text(capability: &str, request: reqwest::RequestBuilder) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| ToolError::request(capability, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ToolError::request(capability, e))?;

    if !status.is_success() {
        return Err(ToolError::Status {
            capability: capability.to_owned(),
            status: status.as_u16(),
            body: truncate_chars(body.trim(), MAX_ERROR_BODY),
        });
    }

    Ok(body)
}

/// Send `request` and decode the JSON response body.
pub(crate) async fn send_json(capability: &str, request: reqwest::RequestBuilder) -> Result<Value> {
    let body = send_text(capability, request).await?;
    serde_json::from_str(&body).map_err(|e| ToolError::parse(capability, format!("invalid JSON: {e}")))
}

/// At most `max` characters of `input`, cut on a char boundary.
pub(crate) fn truncate_chars(input: &str, max: usize) -> String {
    match input.char_indices().nth(max) {
        Some((idx, _)) => input[..idx].to_owned(),
        None => input.to_owned(),
    }
}

/// Strip HTML tags from a string and decode common HTML entities.
pub(crate) fn strip_html_tags(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut inside_tag = false;

    for ch in input.chars() {
        match ch {
            '<' => inside_tag = true,
            '>' => inside_tag = false,
            _ if !inside_tag => result.push(ch),
            _ => {}
        }
    }

    decode_entities(&result)
}

pub(crate) fn decode_entities(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn squash_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The string at `pointer`, or an empty string for missing or non-string values.
pub(crate) fn str_field<'a>(v: &'a Value, pointer: &str) -> &'a str {
    v.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}
