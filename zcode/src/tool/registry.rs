//! Central registry of available tools.
//!
//! Owns the tool objects, validates required arguments before dispatch, and
//! exposes descriptors in the shape the model provider expects. Safe for
//! concurrent `execute` across distinct tools; mutation takes the write
//! lock, reads take the shared lock.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{SharedTool, ToolDescriptor, ToolOutput};
use crate::error::ToolError;
use crate::message::ToolCall;

/// Registry of tools keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, SharedTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the given tools.
    #[must_use]
    pub fn with_tools(tools: Vec<SharedTool>) -> Self {
        let map = tools
            .into_iter()
            .map(|t| (t.name().to_owned(), t))
            .collect();
        Self {
            tools: RwLock::new(map),
        }
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub async fn register(&self, tool: SharedTool) {
        self.tools
            .write()
            .await
            .insert(tool.name().to_owned(), tool);
    }

    /// Look up a tool by name.
    pub async fn get(&self, name: &str) -> Option<SharedTool> {
        self.tools.read().await.get(name).cloned()
    }

    /// Whether a tool with the given name is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Names of all registered tools, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    /// Descriptors of all registered tools, sorted by name.
    pub async fn list(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .tools
            .read()
            .await
            .values()
            .map(|t| t.descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Descriptors rendered as OpenAI-shaped `function` definitions.
    pub async fn openai_definitions(&self) -> Vec<Value> {
        self.list()
            .await
            .iter()
            .map(ToolDescriptor::to_openai)
            .collect()
    }

    /// Build a registry containing only the named tools.
    ///
    /// An empty `names` slice means all tools are permitted. Unknown names
    /// are skipped.
    pub async fn subset(&self, names: &[String]) -> Self {
        let tools = self.tools.read().await;
        let filtered: HashMap<String, SharedTool> = if names.is_empty() {
            tools.clone()
        } else {
            names
                .iter()
                .filter_map(|n| tools.get(n).map(|t| (n.clone(), t.clone())))
                .collect()
        };
        Self {
            tools: RwLock::new(filtered),
        }
    }

    /// Execute a tool call: look up, validate required arguments, dispatch.
    ///
    /// An unknown tool or a missing required argument is reported in the
    /// returned [`ToolOutput`] without reaching the tool.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.get(&call.name).await else {
            return ToolError::Unknown(call.name.clone()).into();
        };

        let empty = serde_json::Map::new();
        let args = call.arguments_object().unwrap_or(&empty);

        // Schema-required-key check before dispatch.
        for required in tool.descriptor().required_arguments() {
            if !args.contains_key(required) {
                return ToolError::MissingArgument(required.to_owned()).into();
            }
        }

        debug!(tool = %call.name, id = %call.id, "Executing tool");
        tool.execute(args).await
    }
}
