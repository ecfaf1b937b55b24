//! # cellchat-store
//!
//! Persistence for the cellchat gateway.
//!
//! Holds the capability configuration table that decides which tools the
//! agent may call and which credentials they use. SQLite runs in WAL mode
//! behind [`Database`], schema changes go through versioned
//! [`migration`]s, and [`ToolConfigStore`] serves reads from a concurrent
//! in-memory mirror.
//!
//! ```ignore
//! use cellchat_store::{Database, ToolConfigStore};
//!
//! let db = Database::open_and_migrate("data/cellchat.db").await?;
//! let tools = ToolConfigStore::open(db).await?;
//! tools.seed_defaults().await?;
//! ```

pub mod db;
pub mod error;
pub mod migration;
pub mod tool_config;

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use tool_config::{
    DEFAULT_TOOL_SEED, NewToolConfig, ToolConfigPatch, ToolConfigRecord, ToolConfigStore,
    ToolStatus,
};
