//! System prompt resources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// A system prompt read once at startup.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    path: PathBuf,
    text: Arc<str>,
}

impl SystemPrompt {
    /// Read the prompt at `path`.
    ///
    /// # Errors
    ///
    /// [`AgentError::Configuration`] when the file is missing, unreadable or
    /// blank. Callers treat this as fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AgentError::configuration(format!(
                "cannot read system prompt {}: {e}",
                path.display()
            ))
        })?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::configuration(format!(
                "system prompt {} is empty",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), chars = text.len(), "system prompt loaded");
        Ok(Self {
            path: path.to_path_buf(),
            text: Arc::from(text),
        })
    }

    /// A prompt that did not come from a file.
    pub fn inline(text: impl AsRef<str>) -> Self {
        Self {
            path: PathBuf::new(),
            text: Arc::from(text.as_ref()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
