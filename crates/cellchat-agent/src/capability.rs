//! Capability contract.
//!
//! A capability is an external search/lookup function the reasoning loop can
//! call mid-turn. Concrete capabilities live in `cellchat-tools`; this module
//! defines the uniform interface and the [`CapabilityDescriptor`] that pairs a
//! capability with the configuration snapshot it runs under.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{AgentError, Result};
use crate::llm::types::ToolDefinition;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A credential slot a capability may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    Host,
    ApiKey,
    CseId,
    ClientId,
    ClientSecret,
    UserAgent,
}

impl CredentialField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::ApiKey => "api_key",
            Self::CseId => "cse_id",
            Self::ClientId => "client_id",
            Self::ClientSecret => "client_secret",
            Self::UserAgent => "user_agent",
        }
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential values for one capability. Empty strings count as unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub cse_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: Option<String>,
}

impl Credentials {
    pub fn get(&self, field: CredentialField) -> Option<&str> {
        let value = match field {
            CredentialField::Host => &self.host,
            CredentialField::ApiKey => &self.api_key,
            CredentialField::CseId => &self.cse_id,
            CredentialField::ClientId => &self.client_id,
            CredentialField::ClientSecret => &self.client_secret,
            CredentialField::UserAgent => &self.user_agent,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// The value of `field`, or a configuration error naming `capability`.
    pub fn require(&self, capability: &str, field: CredentialField) -> Result<&str> {
        self.get(field).ok_or_else(|| {
            AgentError::configuration(format!(
                "capability {capability} is enabled but credential {field} is not set"
            ))
        })
    }
}

// Secrets never reach logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("api_key", &mask(&self.api_key))
            .field("cse_id", &self.cse_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &mask(&self.client_secret))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// A named, invocable external lookup.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Stable identifier; also the tool name the model sees.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// Credential fields that must be set before [`Capability::search`] runs.
    fn required_credentials(&self) -> &'static [CredentialField] {
        &[]
    }

    /// Run the lookup and render the result as text for the model.
    async fn search(&self, query: &str, credentials: &Credentials) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// A capability together with the configuration it was resolved with.
///
/// Descriptors are snapshots: later configuration writes do not affect a
/// descriptor that has already been handed to an agent.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub credentials: Credentials,
    capability: Arc<dyn Capability>,
}

impl CapabilityDescriptor {
    pub fn new(capability: Arc<dyn Capability>, enabled: bool, credentials: Credentials) -> Self {
        Self {
            id: capability.id().to_owned(),
            name: capability.name().to_owned(),
            description: capability.description().to_owned(),
            enabled,
            credentials,
            capability,
        }
    }

    /// Required credential fields that are not set.
    pub fn missing_credentials(&self) -> Vec<CredentialField> {
        self.capability
            .required_credentials()
            .iter()
            .copied()
            .filter(|f| self.credentials.get(*f).is_none())
            .collect()
    }

    /// Invoke the capability.
    ///
    /// # Errors
    ///
    /// [`AgentError::Configuration`] when a required credential is unset, and
    /// [`AgentError::ToolExecution`] for any failure of the lookup itself.
    pub async fn invoke(&self, query: &str) -> Result<String> {
        if let Some(field) = self.missing_credentials().first() {
            return Err(AgentError::configuration(format!(
                "capability {} is enabled but credential {field} is not set",
                self.id
            )));
        }

        self.capability
            .search(query, &self.credentials)
            .await
            .map_err(|e| match e {
                AgentError::ToolExecution { .. } | AgentError::Configuration { .. } => e,
                other => AgentError::ToolExecution {
                    capability: self.id.clone(),
                    reason: other.to_string(),
                },
            })
    }

    /// Invoke the capability and fold any failure into a result string the
    /// model can reason about. Never fails.
    pub async fn run(&self, query: &str) -> String {
        tracing::debug!(capability = %self.id, query, "invoking capability");
        match self.invoke(query).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(capability = %self.id, error = %e, "capability failed");
                match e {
                    AgentError::ToolExecution { .. } => format!("Error: {e}"),
                    other => format!("Error: {} failed: {other}", self.id),
                }
            }
        }
    }

    /// The tool definition advertised to the model.
    pub fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.id.clone(),
            description: self.description.clone(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query."
                    }
                },
                "required": ["query"]
            }),
        }
    }
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("credentials", &self.credentials)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
