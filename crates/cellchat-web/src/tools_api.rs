//! Capability configuration routes.
//!
//! Reads work against whichever source the registry uses. Writes need the
//! persisted store; when tools come from the environment they return 409.
//! Secrets are always masked in responses.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cellchat_store::{NewToolConfig, ToolConfigPatch, ToolConfigRecord, ToolConfigStore};

use crate::error::ApiError;
use crate::state::AppState;

fn writable(state: &AppState) -> Result<&ToolConfigStore, ApiError> {
    state.tool_store.as_ref().ok_or_else(|| {
        ApiError::Conflict(
            "tool configuration is read from the environment and cannot be changed at runtime"
                .into(),
        )
    })
}

fn redact(records: Vec<ToolConfigRecord>) -> Vec<ToolConfigRecord> {
    records.iter().map(ToolConfigRecord::redacted).collect()
}

/// GET /{v}/tools
pub async fn list_tools(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ToolConfigRecord>>, ApiError> {
    Ok(Json(redact(state.registry.records().await?)))
}

/// GET /{v}/tools/enabled
pub async fn list_enabled_tools(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ToolConfigRecord>>, ApiError> {
    let records = state.registry.records().await?;
    Ok(Json(redact(
        records.into_iter().filter(ToolConfigRecord::is_enabled).collect(),
    )))
}

/// GET /{v}/tools/{id}
pub async fn get_tool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ToolConfigRecord>, ApiError> {
    state
        .registry
        .records()
        .await?
        .into_iter()
        .find(|r| r.id == id)
        .map(|r| Json(r.redacted()))
        .ok_or_else(|| ApiError::NotFound(format!("tool_config not found: {id}")))
}

/// POST /{v}/tools
pub async fn create_tool(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewToolConfig>, JsonRejection>,
) -> Result<(StatusCode, Json<ToolConfigRecord>), ApiError> {
    let store = writable(&state)?;
    let Json(new) = body?;
    let record = store.create(new).await?;
    tracing::info!(id = record.id, name = %record.name, status = %record.status, "tool config created");
    Ok((StatusCode::CREATED, Json(record.redacted())))
}

/// PUT /{v}/tools/{id}
pub async fn update_tool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<ToolConfigPatch>, JsonRejection>,
) -> Result<Json<ToolConfigRecord>, ApiError> {
    let store = writable(&state)?;
    let Json(patch) = body?;
    let record = store.update(id, patch).await?;
    tracing::info!(id, name = %record.name, status = %record.status, "tool config updated");
    Ok(Json(record.redacted()))
}

/// DELETE /{v}/tools/{id}
pub async fn delete_tool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    writable(&state)?.delete(id).await?;
    tracing::info!(id, "tool config deleted");
    Ok(StatusCode::NO_CONTENT)
}
