//! HTTP gateway for cellchat.
//!
//! Exposes the streaming agent turn over axum:
//!
//! - `POST /{v}/chat/agent/completions` runs a tool-using agent turn and
//!   streams its text back as a plain-text body.
//! - `POST /{v}/chat/llm/completions` runs the same turn without tools.
//! - `/{v}/tools` manages capability configuration.
//! - `GET /health` is unauthenticated and reports store reachability.
//!
//! Validation happens before the stream is opened, so malformed requests get
//! a JSON error with a proper status code. Once streaming has begun, every
//! failure is reported in-band by the orchestrator.

pub mod api;
mod auth;
pub mod error;
pub mod server;
pub mod state;
pub mod tools_api;

pub use error::ApiError;
pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
    /// Path prefix of the versioned routes (`v1` gives `/v1/chat/...`).
    pub api_version: String,
    /// When set, versioned routes require this key.
    pub api_key: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8000,
            api_version: "v1".into(),
            api_key: None,
        }
    }
}
