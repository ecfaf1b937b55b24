//! Agent Builder.
//!
//! Wires a bound model, a system prompt and a capability snapshot into an
//! [`AgentHandle`]. Building only moves configuration around; the first
//! network call happens when the handle's event stream is polled.

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::capability::CapabilityDescriptor;
use crate::error::Result;
use crate::llm::types::Message;
use crate::model::{ModelBinding, ModelKind, ModelProvider};
use crate::runtime::{DEFAULT_MAX_TURNS, LoopConfig, StreamEvent, reasoning_loop};

/// Outcome of [`AgentBuilder::build`].
#[derive(Debug)]
pub enum AgentBinding {
    Ready(AgentHandle),
    Unavailable(ModelKind),
}

/// A ready-to-run agent for a single turn.
pub struct AgentHandle {
    config: LoopConfig,
}

impl AgentHandle {
    pub fn capabilities(&self) -> &[CapabilityDescriptor] {
        &self.config.capabilities
    }

    /// Start the reasoning loop over `messages`.
    pub fn run(self, messages: Vec<Message>) -> BoxStream<'static, Result<StreamEvent>> {
        reasoning_loop(self.config, messages)
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("model", &self.config.model.name())
            .field("capabilities", &self.config.capabilities.len())
            .field("max_turns", &self.config.max_turns)
            .finish()
    }
}

/// Builds agents against a shared [`ModelProvider`].
#[derive(Debug, Clone)]
pub struct AgentBuilder {
    provider: Arc<ModelProvider>,
    max_turns: u32,
}

impl AgentBuilder {
    pub fn new(provider: Arc<ModelProvider>) -> Self {
        Self {
            provider,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Build an agent for `model_name`. An empty capability list gives a
    /// tool-free conversational agent.
    ///
    /// # Errors
    ///
    /// Propagates [`ModelProvider::bind`] errors.
    pub async fn build(
        &self,
        model_name: &str,
        system_prompt: &str,
        capabilities: Vec<CapabilityDescriptor>,
    ) -> Result<AgentBinding> {
        let model = match self.provider.bind(model_name).await? {
            ModelBinding::Ready(model) => model,
            ModelBinding::Unavailable(kind) => return Ok(AgentBinding::Unavailable(kind)),
        };

        Ok(AgentBinding::Ready(AgentHandle {
            config: LoopConfig {
                model,
                system_prompt: system_prompt.to_owned(),
                capabilities,
                max_turns: self.max_turns,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::model::ModelSettings;

    fn builder() -> AgentBuilder {
        let provider = ModelProvider::new(ModelSettings {
            api_key: "test-key".into(),
            // Unroutable; building must never touch it.
            base_url: "http://127.0.0.1:9".into(),
            ..ModelSettings::default()
        });
        AgentBuilder::new(Arc::new(provider)).with_max_turns(3)
    }

    #[tokio::test]
    async fn build_with_zero_capabilities_is_valid() {
        match builder().build("claude", "prompt", vec![]).await.unwrap() {
            AgentBinding::Ready(handle) => {
                assert!(handle.capabilities().is_empty());
                assert_eq!(handle.config.max_turns, 3);
                assert_eq!(handle.config.system_prompt, "prompt");
            }
            other => panic!("unexpected binding: {other:?}"),
        }
    }

    #[tokio::test]
    async fn build_is_repeatable() {
        let b = builder();
        for _ in 0..3 {
            assert!(matches!(
                b.build("claude", "p", vec![]).await.unwrap(),
                AgentBinding::Ready(_)
            ));
        }
    }

    #[tokio::test]
    async fn build_unimplemented_model_is_unavailable() {
        let binding = builder().build("gpt-oss", "p", vec![]).await.unwrap();
        assert!(matches!(binding, AgentBinding::Unavailable(ModelKind::GptOss)));
    }

    #[tokio::test]
    async fn build_unknown_model_fails() {
        let err = builder().build("mistral", "p", vec![]).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedModel { .. }));
    }

    #[test]
    fn max_turns_is_at_least_one() {
        assert_eq!(builder().with_max_turns(0).max_turns, 1);
    }
}
