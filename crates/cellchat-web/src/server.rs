//! Main web server setup and startup.
//!
//! [`WebServer`] composes the Axum router, registers all routes, and serves
//! them until ctrl-c.

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::WebConfig;
use crate::api;
use crate::auth;
use crate::state::AppState;
use crate::tools_api;

/// The cellchat gateway.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self {
            config: state.config.clone(),
            state: Arc::new(state),
        }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        let v = self.config.api_version.trim_matches('/');

        let versioned = Router::new()
            .route(
                &format!("/{v}/chat/agent/completions"),
                post(api::agent_completions),
            )
            .route(
                &format!("/{v}/chat/llm/completions"),
                post(api::llm_completions),
            )
            .route(
                &format!("/{v}/tools"),
                get(tools_api::list_tools).post(tools_api::create_tool),
            )
            .route(
                &format!("/{v}/tools/enabled"),
                get(tools_api::list_enabled_tools),
            )
            .route(
                &format!("/{v}/tools/{{id}}"),
                get(tools_api::get_tool)
                    .put(tools_api::update_tool)
                    .delete(tools_api::delete_tool),
            )
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(&self.state),
                auth::require_api_key,
            ));

        Router::new()
            .route("/health", get(api::health))
            .merge(versioned)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.state))
    }

    /// Serve on an already-bound listener until ctrl-c.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails while accepting connections.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let router = self.router();
        tracing::info!(
            addr = %listener.local_addr()?,
            api_version = %self.config.api_version,
            auth = self.config.api_key.is_some(),
            tools = self.state.registry.source_kind(),
            "starting web server"
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }

    /// Bind the configured address and serve.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr()).await?;
        self.serve(listener).await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
