//! Persisted capability configuration.
//!
//! One row per capability: enable flag plus the optional credential columns
//! a capability may need (`host`, `api_key`, `cse_id`, `client_id`,
//! `client_secret`, `user_agent`).
//!
//! Reads are served from an in-process [`DashMap`] mirror so request
//! handlers never contend on the connection mutex. Every write is a single
//! SQL statement and the mirror is updated while the connection is still
//! held, so mirror order always matches commit order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{Connection, ErrorCode, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// Whether a capability is offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Enable,
    Disable,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            other => Err(StoreError::InvalidArgument(format!(
                "status must be \"enable\" or \"disable\", got \"{other}\""
            ))),
        }
    }
}

/// A stored capability configuration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfigRecord {
    pub id: i64,
    /// Capability identifier, e.g. `duckduckgo`.
    pub name: String,
    pub status: ToolStatus,
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub cse_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
    /// Unix timestamp (seconds).
    pub created_at: i64,
    /// Unix timestamp (seconds).
    pub updated_at: i64,
}

impl ToolConfigRecord {
    pub fn is_enabled(&self) -> bool {
        self.status == ToolStatus::Enable
    }

    /// Copy of the record with secret columns masked, for API responses.
    pub fn redacted(&self) -> Self {
        fn mask(v: &Option<String>) -> Option<String> {
            v.as_ref().map(|_| "***".to_owned())
        }
        Self {
            api_key: mask(&self.api_key),
            client_secret: mask(&self.client_secret),
            ..self.clone()
        }
    }
}

/// Payload for creating a new configuration row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewToolConfig {
    pub name: String,
    /// Defaults to enabled when omitted.
    #[serde(default)]
    pub status: Option<ToolStatus>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub cse_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Partial update. `None` leaves a column unchanged; an empty string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolConfigPatch {
    #[serde(default)]
    pub status: Option<ToolStatus>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub cse_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Rows inserted by [`ToolConfigStore::seed_defaults`] when missing.
pub const DEFAULT_TOOL_SEED: &[(&str, ToolStatus)] = &[
    ("duckduckgo", ToolStatus::Enable),
    ("arxiv", ToolStatus::Enable),
    ("wikipedia", ToolStatus::Enable),
    ("google_search", ToolStatus::Disable),
    ("google_scholar", ToolStatus::Disable),
    ("google_trends", ToolStatus::Disable),
    ("asknews", ToolStatus::Disable),
    ("reddit", ToolStatus::Disable),
    ("searx", ToolStatus::Disable),
    ("openweather", ToolStatus::Disable),
];

const SELECT_COLUMNS: &str = "id, name, status, host, api_key, cse_id, client_id, \
                              client_secret, user_agent, created_at, updated_at";

// ═══════════════════════════════════════════════════════════════════════
//  ToolConfigStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD over the `tool_config` table with a lock-free read mirror.
#[derive(Clone)]
pub struct ToolConfigStore {
    db: Database,
    rows: Arc<DashMap<String, ToolConfigRecord>>,
}

impl ToolConfigStore {
    /// Wrap a migrated database and load the read mirror.
    pub async fn open(db: Database) -> StoreResult<Self> {
        let store = Self {
            db,
            rows: Arc::new(DashMap::new()),
        };
        store.reload().await?;
        Ok(store)
    }

    /// Replace the mirror with the current table contents.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> StoreResult<()> {
        let rows = Arc::clone(&self.rows);
        self.db
            .execute(move |conn| {
                let all = select_all(conn)?;
                rows.clear();
                for record in all {
                    rows.insert(record.name.clone(), record);
                }
                Ok(())
            })
            .await?;
        debug!(count = self.rows.len(), "tool config mirror loaded");
        Ok(())
    }

    /// Insert every row of [`DEFAULT_TOOL_SEED`] that does not exist yet.
    ///
    /// Returns the number of rows inserted. Existing rows are left untouched.
    #[instrument(skip(self))]
    pub async fn seed_defaults(&self) -> StoreResult<usize> {
        let rows = Arc::clone(&self.rows);
        let inserted = self
            .db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                let now = Utc::now().timestamp();
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO tool_config (name, status, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?3)",
                    )?;
                    for (name, status) in DEFAULT_TOOL_SEED {
                        inserted += stmt.execute(rusqlite::params![name, status.as_str(), now])?;
                    }
                }
                tx.commit()?;

                rows.clear();
                for record in select_all(conn)? {
                    rows.insert(record.name.clone(), record);
                }
                Ok(inserted)
            })
            .await?;

        info!(inserted, "tool config seeded");
        Ok(inserted)
    }

    /// Reach the backing file, bypassing the mirror.
    pub async fn schema_version(&self) -> StoreResult<u32> {
        self.db.schema_version().await
    }

    /// All rows ordered by id.
    pub fn list(&self) -> Vec<ToolConfigRecord> {
        let mut all: Vec<ToolConfigRecord> = self.rows.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }

    /// Enabled rows ordered by id.
    pub fn list_enabled(&self) -> Vec<ToolConfigRecord> {
        let mut enabled = self.list();
        enabled.retain(ToolConfigRecord::is_enabled);
        enabled
    }

    pub fn get(&self, id: i64) -> StoreResult<ToolConfigRecord> {
        self.rows
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                entity: "tool config",
                id: id.to_string(),
            })
    }

    pub fn get_by_name(&self, name: &str) -> Option<ToolConfigRecord> {
        self.rows.get(name).map(|r| r.value().clone())
    }

    /// Insert a new row. Fails with [`StoreError::Conflict`] on a duplicate name.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create(&self, new: NewToolConfig) -> StoreResult<ToolConfigRecord> {
        let name = new.name.trim().to_owned();
        if name.is_empty() {
            return Err(StoreError::InvalidArgument("name must not be empty".into()));
        }

        let rows = Arc::clone(&self.rows);
        let status = new.status.unwrap_or(ToolStatus::Enable);
        let now = Utc::now().timestamp();

        let record = self
            .db
            .execute(move |conn| {
                let sql = format!(
                    "INSERT INTO tool_config \
                     (name, status, host, api_key, cse_id, client_id, client_secret, user_agent, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
                     RETURNING {SELECT_COLUMNS}"
                );
                let record = conn
                    .query_row(
                        &sql,
                        rusqlite::params![
                            name,
                            status.as_str(),
                            non_empty(new.host),
                            non_empty(new.api_key),
                            non_empty(new.cse_id),
                            non_empty(new.client_id),
                            non_empty(new.client_secret),
                            non_empty(new.user_agent),
                            now,
                        ],
                        row_to_record,
                    )
                    .map_err(|e| map_constraint(e, &name))?;
                rows.insert(record.name.clone(), record.clone());
                Ok(record)
            })
            .await?;

        debug!(id = record.id, "tool config created");
        Ok(record)
    }

    /// Apply a partial update to the row with `id`.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: i64, patch: ToolConfigPatch) -> StoreResult<ToolConfigRecord> {
        let rows = Arc::clone(&self.rows);
        let now = Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                let sql = format!(
                    "UPDATE tool_config SET \
                        status        = COALESCE(?2, status), \
                        host          = CASE WHEN ?3 IS NULL THEN host ELSE NULLIF(?3, '') END, \
                        api_key       = CASE WHEN ?4 IS NULL THEN api_key ELSE NULLIF(?4, '') END, \
                        cse_id        = CASE WHEN ?5 IS NULL THEN cse_id ELSE NULLIF(?5, '') END, \
                        client_id     = CASE WHEN ?6 IS NULL THEN client_id ELSE NULLIF(?6, '') END, \
                        client_secret = CASE WHEN ?7 IS NULL THEN client_secret ELSE NULLIF(?7, '') END, \
                        user_agent    = CASE WHEN ?8 IS NULL THEN user_agent ELSE NULLIF(?8, '') END, \
                        updated_at    = ?9 \
                     WHERE id = ?1 \
                     RETURNING {SELECT_COLUMNS}"
                );
                let record = conn
                    .query_row(
                        &sql,
                        rusqlite::params![
                            id,
                            patch.status.map(|s| s.as_str()),
                            patch.host,
                            patch.api_key,
                            patch.cse_id,
                            patch.client_id,
                            patch.client_secret,
                            patch.user_agent,
                            now,
                        ],
                        row_to_record,
                    )
                    .map_err(|e| not_found(e, id.to_string()))?;
                rows.insert(record.name.clone(), record.clone());
                Ok(record)
            })
            .await
    }

    /// Flip the status of the row named `name`.
    #[instrument(skip(self))]
    pub async fn set_status(&self, name: &str, status: ToolStatus) -> StoreResult<ToolConfigRecord> {
        let rows = Arc::clone(&self.rows);
        let name = name.to_owned();
        let now = Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                let sql = format!(
                    "UPDATE tool_config SET status = ?2, updated_at = ?3 WHERE name = ?1 \
                     RETURNING {SELECT_COLUMNS}"
                );
                let record = conn
                    .query_row(
                        &sql,
                        rusqlite::params![name, status.as_str(), now],
                        row_to_record,
                    )
                    .map_err(|e| not_found(e, name.clone()))?;
                rows.insert(record.name.clone(), record.clone());
                Ok(record)
            })
            .await
    }

    /// Delete the row with `id`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        let rows = Arc::clone(&self.rows);
        self.db
            .execute(move |conn| {
                let name: String = conn
                    .query_row(
                        "DELETE FROM tool_config WHERE id = ?1 RETURNING name",
                        rusqlite::params![id],
                        |row| row.get(0),
                    )
                    .map_err(|e| not_found(e, id.to_string()))?;
                rows.remove(&name);
                Ok(())
            })
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Row helpers
// ═══════════════════════════════════════════════════════════════════════

fn select_all(conn: &Connection) -> StoreResult<Vec<ToolConfigRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM tool_config ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([], row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ToolConfigRecord> {
    let status: String = row.get(2)?;
    let status = status.parse::<ToolStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ToolConfigRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        status,
        host: row.get(3)?,
        api_key: row.get(4)?,
        cse_id: row.get(5)?,
        client_id: row.get(6)?,
        client_secret: row.get(7)?,
        user_agent: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn not_found(err: rusqlite::Error, id: String) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
            entity: "tool config",
            id,
        },
        other => StoreError::Sqlite(other),
    }
}

fn map_constraint(err: rusqlite::Error, name: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict {
                entity: "tool config",
                id: name.to_owned(),
            }
        }
        other => StoreError::Sqlite(other),
    }
}
