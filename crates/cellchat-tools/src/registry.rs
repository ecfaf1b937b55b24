//! Tool registry.
//!
//! Resolves the capability catalog against the current configuration. The
//! configuration comes from a [`ToolConfigSource`] that is read on every
//! [`ToolRegistry::resolve`] call, so enable/disable and credential changes
//! apply to the next request without a restart.
//!
//! Two sources exist:
//!
//! - [`StoreToolSource`] reads the persisted `tool_config` rows. This is the
//!   authoritative source and supports runtime changes.
//! - [`EnvToolSource`] serves a fixed snapshot taken from environment
//!   variables at startup, for deployments without a database.

use std::sync::Arc;

use async_trait::async_trait;
use cellchat_agent::{AgentError, Capability, CapabilityDescriptor, Credentials};
use cellchat_store::{ToolConfigRecord, ToolConfigStore, ToolStatus};
use tracing::debug;

use crate::capabilities::default_catalog;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where capability configuration comes from.
#[async_trait]
pub trait ToolConfigSource: Send + Sync {
    /// Short label for logs (`store`, `env`).
    fn kind(&self) -> &'static str;

    /// Current configuration rows.
    async fn records(&self) -> Result<Vec<ToolConfigRecord>>;
}

/// Reads configuration from the persisted store.
#[derive(Clone)]
pub struct StoreToolSource {
    store: ToolConfigStore,
}

impl StoreToolSource {
    pub fn new(store: ToolConfigStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolConfigSource for StoreToolSource {
    fn kind(&self) -> &'static str {
        "store"
    }

    async fn records(&self) -> Result<Vec<ToolConfigRecord>> {
        Ok(self.store.list())
    }
}

/// One capability's settings as read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvToolEntry {
    pub name: String,
    pub enabled: bool,
    pub credentials: Credentials,
}

/// Environment-derived capability configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolEnvConfig {
    pub entries: Vec<EnvToolEntry>,
}

impl ToolEnvConfig {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let enabled = |key: &str, default: bool| match var(key) {
            Some(v) => v.trim().eq_ignore_ascii_case(ToolStatus::Enable.as_str()),
            None => default,
        };

        let entry = |name: &str, enable_key: &str, default: bool, credentials: Credentials| {
            EnvToolEntry {
                name: name.to_owned(),
                enabled: enabled(enable_key, default),
                credentials,
            }
        };

        Self {
            entries: vec![
                entry("duckduckgo", "DUCKDUCKGO_SEARCH_ENABLE", true, Credentials::default()),
                entry("arxiv", "ARXIV_SEARCH_ENABLE", true, Credentials::default()),
                entry("wikipedia", "WIKIPEDIA_SEARCH_ENABLE", true, Credentials::default()),
                entry(
                    "google_search",
                    "GOOGLE_SEARCH_ENABLE",
                    false,
                    Credentials {
                        api_key: var("GOOGLE_API_KEY"),
                        cse_id: var("GOOGLE_CSE_ID"),
                        ..Credentials::default()
                    },
                ),
                entry(
                    "google_scholar",
                    "GOOGLE_SCHOLAR_SEARCH_ENABLE",
                    false,
                    Credentials {
                        api_key: var("GOOGLE_SCHOLAR_SERP_API_KEY"),
                        ..Credentials::default()
                    },
                ),
                entry(
                    "google_trends",
                    "GOOGLE_TREND_SEARCH_ENABLE",
                    false,
                    Credentials {
                        api_key: var("GOOGLE_TREND_SERP_API_KEY"),
                        ..Credentials::default()
                    },
                ),
                entry(
                    "asknews",
                    "ASKNEWS_SEARCH_ENABLE",
                    false,
                    Credentials {
                        client_id: var("ASKNEWS_CLIENT_ID"),
                        client_secret: var("ASKNEWS_CLIENT_SECRET"),
                        ..Credentials::default()
                    },
                ),
                entry(
                    "reddit",
                    "REDDIT_SEARCH_ENABLE",
                    false,
                    Credentials {
                        client_id: var("REDDIT_CLIENT_ID"),
                        client_secret: var("REDDIT_CLIENT_SECRET"),
                        user_agent: var("REDDIT_USER_AGENT"),
                        ..Credentials::default()
                    },
                ),
                entry(
                    "searx",
                    "SEARX_SEARCH_ENABLE",
                    false,
                    Credentials {
                        host: var("SEARX_HOST"),
                        ..Credentials::default()
                    },
                ),
                entry(
                    "openweather",
                    "OPENWEATHER_SEARCH_ENABLE",
                    false,
                    Credentials {
                        api_key: var("OPENWEATHER_API_KEY"),
                        ..Credentials::default()
                    },
                ),
            ],
        }
    }
}

/// Serves an immutable snapshot built from [`ToolEnvConfig`].
#[derive(Debug, Clone)]
pub struct EnvToolSource {
    records: Vec<ToolConfigRecord>,
}

impl EnvToolSource {
    pub fn new(config: ToolEnvConfig) -> Self {
        let records = config
            .entries
            .into_iter()
            .zip(1..)
            .map(|(entry, id)| ToolConfigRecord {
                id,
                name: entry.name,
                status: if entry.enabled {
                    ToolStatus::Enable
                } else {
                    ToolStatus::Disable
                },
                host: entry.credentials.host,
                api_key: entry.credentials.api_key,
                cse_id: entry.credentials.cse_id,
                client_id: entry.credentials.client_id,
                client_secret: entry.credentials.client_secret,
                user_agent: entry.credentials.user_agent,
                created_at: 0,
                updated_at: 0,
            })
            .collect();
        Self { records }
    }
}

#[async_trait]
impl ToolConfigSource for EnvToolSource {
    fn kind(&self) -> &'static str {
        "env"
    }

    async fn records(&self) -> Result<Vec<ToolConfigRecord>> {
        Ok(self.records.clone())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

fn credentials_of(record: &ToolConfigRecord) -> Credentials {
    Credentials {
        host: record.host.clone(),
        api_key: record.api_key.clone(),
        cse_id: record.cse_id.clone(),
        client_id: record.client_id.clone(),
        client_secret: record.client_secret.clone(),
        user_agent: record.user_agent.clone(),
    }
}

/// The capability catalog joined with a configuration source.
#[derive(Clone)]
pub struct ToolRegistry {
    catalog: Vec<Arc<dyn Capability>>,
    source: Arc<dyn ToolConfigSource>,
}

impl ToolRegistry {
    /// Registry over the built-in catalog.
    pub fn new(source: Arc<dyn ToolConfigSource>) -> Self {
        Self::with_catalog(default_catalog(), source)
    }

    pub fn with_catalog(catalog: Vec<Arc<dyn Capability>>, source: Arc<dyn ToolConfigSource>) -> Self {
        Self { catalog, source }
    }

    pub fn source_kind(&self) -> &'static str {
        self.source.kind()
    }

    /// Capability ids in catalog order.
    pub fn catalog_ids(&self) -> Vec<&str> {
        self.catalog.iter().map(|c| c.id()).collect()
    }

    /// Raw configuration rows, as the source currently reports them.
    pub async fn records(&self) -> Result<Vec<ToolConfigRecord>> {
        self.source.records().await
    }

    /// Join the catalog with the current configuration.
    ///
    /// Missing credentials are not checked here; an enabled capability
    /// without them fails when it is invoked.
    ///
    /// # Errors
    ///
    /// [`AgentError::Configuration`] when the source cannot be read.
    pub async fn resolve(&self, enabled_only: bool) -> cellchat_agent::Result<Vec<CapabilityDescriptor>> {
        let records = self.source.records().await.map_err(AgentError::from)?;

        for record in &records {
            if !self.catalog.iter().any(|c| c.id() == record.name) {
                debug!(name = %record.name, source = self.source.kind(), "skipping config for unknown capability");
            }
        }

        let descriptors: Vec<CapabilityDescriptor> = self
            .catalog
            .iter()
            .map(|capability| {
                let (enabled, credentials) = records
                    .iter()
                    .find(|r| r.name == capability.id())
                    .map(|r| (r.is_enabled(), credentials_of(r)))
                    .unwrap_or_default();
                CapabilityDescriptor::new(Arc::clone(capability), enabled, credentials)
            })
            .filter(|d| !enabled_only || d.enabled)
            .collect();

        debug!(
            source = self.source.kind(),
            enabled_only,
            resolved = descriptors.len(),
            "capabilities resolved"
        );
        Ok(descriptors)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("catalog", &self.catalog_ids())
            .field("source", &self.source.kind())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cellchat_agent::CredentialField;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> ToolEnvConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ToolEnvConfig::from_lookup(|k| map.get(k).cloned())
    }

    fn ids(descriptors: &[CapabilityDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn env_defaults_enable_free_capabilities() {
        let config = env(&[]);
        let enabled: Vec<&str> = config
            .entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(enabled, vec!["duckduckgo", "arxiv", "wikipedia"]);
    }

    #[test]
    fn env_flags_and_credentials_are_read() {
        let config = env(&[
            ("ARXIV_SEARCH_ENABLE", "disable"),
            ("GOOGLE_SEARCH_ENABLE", "ENABLE"),
            ("GOOGLE_API_KEY", "gk"),
            ("GOOGLE_CSE_ID", "cx"),
            ("SEARX_SEARCH_ENABLE", "yes"),
        ]);
        let by_name = |n: &str| config.entries.iter().find(|e| e.name == n).unwrap();

        assert!(!by_name("arxiv").enabled);
        assert!(by_name("google_search").enabled);
        assert_eq!(by_name("google_search").credentials.cse_id.as_deref(), Some("cx"));
        // Only the literal `enable` turns a capability on.
        assert!(!by_name("searx").enabled);
    }

    #[tokio::test]
    async fn resolve_follows_catalog_order() {
        let registry = ToolRegistry::new(Arc::new(EnvToolSource::new(env(&[
            ("OPENWEATHER_SEARCH_ENABLE", "enable"),
        ]))));

        let all = registry.resolve(false).await.unwrap();
        assert_eq!(all.len(), 10);

        let enabled = registry.resolve(true).await.unwrap();
        assert_eq!(
            ids(&enabled),
            vec!["duckduckgo", "arxiv", "wikipedia", "openweather"]
        );
    }

    #[tokio::test]
    async fn enabled_capability_without_credentials_still_resolves() {
        let registry = ToolRegistry::new(Arc::new(EnvToolSource::new(env(&[
            ("GOOGLE_SCHOLAR_SEARCH_ENABLE", "enable"),
        ]))));

        let enabled = registry.resolve(true).await.unwrap();
        let scholar = enabled.iter().find(|d| d.id == "google_scholar").unwrap();
        assert_eq!(scholar.missing_credentials(), vec![CredentialField::ApiKey]);

        let text = scholar.run("anything").await;
        assert!(text.starts_with("Error: google_scholar failed: configuration error:"));
    }

    struct FixedSource(Vec<ToolConfigRecord>);

    #[async_trait]
    impl ToolConfigSource for FixedSource {
        fn kind(&self) -> &'static str {
            "fixed"
        }
        async fn records(&self) -> Result<Vec<ToolConfigRecord>> {
            Ok(self.0.clone())
        }
    }

    fn record(name: &str, status: ToolStatus) -> ToolConfigRecord {
        ToolConfigRecord {
            id: 1,
            name: name.into(),
            status,
            host: None,
            api_key: None,
            cse_id: None,
            client_id: None,
            client_secret: None,
            user_agent: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn unknown_records_are_skipped_and_missing_rows_are_disabled() {
        let registry = ToolRegistry::new(Arc::new(FixedSource(vec![
            record("wikipedia", ToolStatus::Enable),
            record("bing", ToolStatus::Enable),
        ])));

        let enabled = registry.resolve(true).await.unwrap();
        assert_eq!(ids(&enabled), vec!["wikipedia"]);

        let all = registry.resolve(false).await.unwrap();
        assert!(all.iter().filter(|d| d.id != "wikipedia").all(|d| !d.enabled));
    }
}
