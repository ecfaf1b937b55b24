//! Capabilities and the tool registry for cellchat.
//!
//! Every capability in [`capabilities`] implements
//! [`Capability`](cellchat_agent::Capability): one free-text query in, one
//! text result out. [`ToolRegistry`] joins that catalog with the current
//! configuration, taken from the store or from the environment, and hands the
//! agent the capabilities it may call for a single turn.

pub mod capabilities;
pub mod error;
mod http;
pub mod registry;

pub use capabilities::default_catalog;
pub use error::{Result, ToolError};
pub use registry::{
    EnvToolEntry, EnvToolSource, StoreToolSource, ToolConfigSource, ToolEnvConfig, ToolRegistry,
};
