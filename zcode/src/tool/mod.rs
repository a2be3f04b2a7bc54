//! Tool trait, descriptors, and the registry.
//!
//! Tools are the agent's only way to act on the world. Each tool exposes a
//! stable name, a JSON-schema parameter descriptor, and an async
//! [`Tool::execute`] taking the decoded argument object. Execution never
//! fails at the `Result` level; failures are carried in the returned
//! [`ToolOutput`] so the loop can feed them back to the model.
//!
//! Destructive tools hold an optional [`ConfirmFn`] acquired at
//! construction; they consult it before any side effect and fail with a
//! "user denied" error when it returns `false`.

pub mod fs;
pub mod registry;
pub mod search;
pub mod shell;
pub mod swarm;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use fs::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
pub use registry::ToolRegistry;
pub use search::{GlobTool, GrepTool};
pub use shell::RunCommandTool;
pub use swarm::{SendMessageTool, SwarmLink};

/// Confirmation callback consulted before destructive side effects.
///
/// Receives a short human-readable preview of the pending operation and
/// returns whether it may proceed. Supplied by the embedder (the
/// interactive prompt lives outside this crate).
pub type ConfirmFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Argument object passed to [`Tool::execute`].
pub type ToolArgs = Map<String, Value>;

/// Outcome of a tool execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool succeeded.
    pub success: bool,
    /// Output text on success.
    pub output: String,
    /// Error text on failure.
    pub error: String,
}

impl ToolOutput {
    /// A successful output.
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
        }
    }

    /// A failed output.
    #[must_use]
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
        }
    }

    /// The text fed back to the model: output on success, error otherwise.
    #[must_use]
    pub fn content(&self) -> &str {
        if self.success { &self.output } else { &self.error }
    }
}

impl From<crate::error::ToolError> for ToolOutput {
    fn from(err: crate::error::ToolError) -> Self {
        Self::err(err.to_string())
    }
}

/// Descriptor of a tool for model function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Stable tool name.
    pub name: String,
    /// Human description shown to the model.
    pub description: String,
    /// JSON-schema parameter object (`type: object`, `properties`, `required`).
    pub parameters: Value,
}

impl ToolDescriptor {
    /// Render the descriptor in the shape the model API expects:
    /// a `function` wrapper around name/description/parameters.
    #[must_use]
    pub fn to_openai(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    /// Names listed in the schema's `required` array.
    #[must_use]
    pub fn required_arguments(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// The core trait for all agent tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable, unique tool name.
    fn name(&self) -> &str;

    /// Human description of what the tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the decoded argument object.
    async fn execute(&self, args: &ToolArgs) -> ToolOutput;

    /// Descriptor for inclusion in model requests.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A shared tool handle.
pub type SharedTool = Arc<dyn Tool>;

/// Build a registry holding every built-in tool.
///
/// The confirmation callback is threaded into the destructive tools
/// (`write_file`, `edit_file`, `run_command`) at construction.
#[must_use]
pub fn builtin_registry(confirm: Option<ConfirmFn>) -> ToolRegistry {
    ToolRegistry::with_tools(vec![
        Arc::new(ReadFileTool),
        Arc::new(ListDirTool),
        Arc::new(WriteFileTool::new(confirm.clone())),
        Arc::new(EditFileTool::new(confirm.clone())),
        Arc::new(RunCommandTool::new(confirm)),
        Arc::new(GlobTool),
        Arc::new(GrepTool),
    ])
}

/// Extract a required string argument.
pub(crate) fn required_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str, ToolOutput> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| crate::error::ToolError::MissingArgument(key.to_owned()).into())
}

/// Extract an optional string argument.
pub(crate) fn optional_str<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}
