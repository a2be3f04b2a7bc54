//! Model-provider traits and streaming types.
//!
//! The runtime drives any backend that implements [`Provider`]. Concrete
//! HTTP clients live outside this crate; the trait captures exactly the
//! four operations the agent loop needs: plain generation, streamed
//! generation, and the tool-aware variants of both.
//!
//! Streaming is modelled as a single-producer channel of
//! [`ProviderEvent`]s: zero or more text deltas followed by exactly one
//! `Done` carrying the accumulated text and any tool-call directives.

pub mod mock;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};
use crate::message::Message;

pub use mock::MockProvider;

/// A raw tool-call directive as produced by the model API.
///
/// `arguments` is the undecoded JSON text; the agent loop performs the
/// two-phase decode (and drives the repair path when it fails).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToolCall {
    /// Model-supplied correlation id.
    pub id: String,
    /// The function being called.
    pub function: RawFunctionCall,
}

/// Function name and argument text of a [`RawToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFunctionCall {
    /// Tool name.
    pub name: String,
    /// Arguments as a JSON string.
    pub arguments: String,
}

impl RawToolCall {
    /// Create a raw tool call from its parts.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function: RawFunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A complete model response: text plus tool-call directives.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    /// Assistant text content.
    pub content: String,
    /// Tool calls requested by the model, in emission order.
    pub tool_calls: Vec<RawToolCall>,
}

impl ProviderResponse {
    /// A text-only response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Whether the model requested any tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One item of a provider stream.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// Incremental assistant text.
    Delta(String),
    /// Terminal item: the accumulated response.
    Done(ProviderResponse),
}

/// A pinned, boxed stream of provider events.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent, LlmError>> + Send>>;

/// A shared provider handle.
pub type SharedProvider = Arc<dyn Provider>;

/// The model-provider seam.
///
/// The tool-aware methods default to [`LlmError::NotSupported`] so that
/// text-only backends remain usable through the plain paths.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of the provider, for logging.
    fn name(&self) -> &'static str;

    /// Generate a completion for the conversation.
    async fn generate(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// Generate a streamed completion for the conversation.
    ///
    /// The terminal `Done` event carries the accumulated text.
    async fn generate_stream(&self, messages: &[Message]) -> Result<ProviderStream, LlmError>;

    /// Generate a completion with tool definitions offered to the model.
    ///
    /// `tools` holds OpenAI-shaped function descriptors (see
    /// [`crate::tool::ToolRegistry::openai_definitions`]).
    async fn generate_with_tools(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<ProviderResponse, LlmError> {
        let _ = (messages, tools);
        Err(LlmError::not_supported("tool calling"))
    }

    /// Streamed variant of [`Provider::generate_with_tools`].
    async fn generate_stream_with_tools(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<ProviderStream, LlmError> {
        let _ = (messages, tools);
        Err(LlmError::not_supported("streaming tool calling"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_response_text_has_no_calls() {
        let resp = ProviderResponse::text("hi");
        assert!(!resp.has_tool_calls());
        assert_eq!(resp.content, "hi");
    }

    #[test]
    fn raw_tool_call_serde_shape() {
        let call = RawToolCall::new("call_1", "read_file", r#"{"path":"x"}"#);
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["id"], "call_1");
        assert_eq!(json["function"]["name"], "read_file");
        assert_eq!(json["function"]["arguments"], r#"{"path":"x"}"#);
    }
}
