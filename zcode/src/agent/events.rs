//! Streaming events and observer hooks for the agent loop.

use serde_json::Value;

use crate::handoff::HandoffInstruction;
use crate::tool::ToolOutput;

/// A typed event emitted by [`Agent::chat_stream`](super::Agent::chat_stream).
///
/// Ordering contract per stream: exactly one `Start`, then any number of
/// `Chunk`s and tool frames (`ToolBatchStart` only when a batch holds more
/// than one call, each `ToolStart` immediately followed by its
/// `ToolResult`, `ToolBatchEnd` iff `ToolBatchStart` was emitted), and
/// exactly one terminal `Done` or `Error`.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The stream has begun.
    Start,
    /// Incremental assistant text.
    Chunk {
        /// The text delta.
        text: String,
    },
    /// More than one tool call is about to execute.
    ToolBatchStart {
        /// Number of calls in the batch.
        batch_size: usize,
    },
    /// A tool call is starting.
    ToolStart {
        /// Model-supplied call id.
        id: String,
        /// Tool name.
        name: String,
        /// Decoded arguments (or the raw text when undecodable).
        args: Value,
    },
    /// A tool call finished.
    ToolResult {
        /// Model-supplied call id.
        id: String,
        /// Tool name.
        name: String,
        /// The execution outcome.
        result: ToolOutput,
        /// Whether the outcome is an error.
        is_error: bool,
    },
    /// The batch opened by `ToolBatchStart` is complete.
    ToolBatchEnd,
    /// The agent requested transfer of control.
    Handoff {
        /// The parsed directive.
        instruction: HandoffInstruction,
    },
    /// Terminal: the loop finished naturally.
    Done {
        /// Final assistant response.
        response: String,
    },
    /// Terminal: the loop failed.
    Error {
        /// Error description.
        message: String,
    },
}

impl StreamEvent {
    /// Whether this event terminates the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Record of one executed tool call within a chat turn.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    /// Model-supplied call id.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Decoded arguments.
    pub arguments: Value,
    /// The execution outcome.
    pub result: ToolOutput,
}

/// Observer hooks fired during a chat turn.
///
/// Implementations must be safe for concurrent invocation: during parallel
/// tool dispatch `on_tool_use` / `on_tool_result` fire from multiple tasks.
pub trait EventHandler: Send + Sync {
    /// The model is being consulted.
    fn on_thinking(&self) {}

    /// A tool is about to execute.
    fn on_tool_use(&self, name: &str, args: &Value) {
        let _ = (name, args);
    }

    /// A tool finished executing.
    fn on_tool_result(&self, name: &str, result: &ToolOutput) {
        let _ = (name, result);
    }
}

/// Result of a completed [`Agent::chat`](super::Agent::chat) call.
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    /// Final assistant response text.
    pub response: String,
    /// Every tool execution observed during the turn, in dispatch order.
    pub tool_calls: Vec<ToolExecution>,
    /// A handoff directive, when detection is enabled and one was found.
    pub handoff: Option<HandoffInstruction>,
}
