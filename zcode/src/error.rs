//! Error types for the zcode runtime.
//!
//! Each subsystem owns a `thiserror` enum; the crate-level [`Error`] unifies
//! them so public APIs can return a single [`Result`] alias. Error display
//! strings double as the wire-visible diagnostics fed back to models and
//! surfaced to the UI, so their wording is part of the contract.

use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The top-level error type for the runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Error from the model provider.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Error from tool lookup or execution.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Error from the agent loop.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Error loading or validating a definition file.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Error from the workflow engine.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Error from room management.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Error from the swarm transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Error from room persistence.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the model provider seam.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LlmError {
    /// The provider does not implement the requested capability.
    #[error("provider does not support {0}")]
    NotSupported(&'static str),

    /// The provider failed to produce a completion.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The provider's stream terminated abnormally.
    #[error("stream error: {0}")]
    Stream(String),
}

impl LlmError {
    /// Create a not-supported error for a capability name.
    #[must_use]
    pub const fn not_supported(capability: &'static str) -> Self {
        Self::NotSupported(capability)
    }
}

/// Errors from tool lookup, validation, and execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// No tool is registered under the requested name.
    #[error("unknown tool: {0}")]
    Unknown(String),

    /// A schema-required argument is absent from the call.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// The arguments could not be decoded.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The confirmation callback refused the operation.
    #[error("{0}")]
    Denied(String),

    /// The tool ran but failed.
    #[error("{0}")]
    Execution(String),
}

/// Errors from the agent loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    /// The loop ran for its full iteration budget without a final answer.
    #[error("max iterations reached ({0})")]
    MaxIterations(usize),

    /// Every tool call in a response failed argument parsing too many times.
    #[error("max tool retries exceeded ({0})")]
    MaxToolRetries(usize),

    /// Internal runtime failure.
    #[error("agent error: {0}")]
    Runtime(String),
}

/// Errors from agent, workflow, and skill definition files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DefinitionError {
    /// The definition has an empty `name`.
    #[error("missing name")]
    MissingName,

    /// The agent definition body (system prompt) is empty.
    #[error("missing system prompt")]
    MissingSystemPrompt,

    /// The name collides with a reserved command or built-in agent.
    #[error("reserved name: {0}")]
    ReservedName(String),

    /// The file does not start with a frontmatter block.
    #[error("no frontmatter block")]
    NoFrontmatter,

    /// The frontmatter block failed to parse.
    #[error("invalid frontmatter: {0}")]
    InvalidFrontmatter(String),

    /// The workflow has no steps.
    #[error("workflow has no steps")]
    NoSteps,

    /// A workflow step references no agent.
    #[error("step '{0}' references no agent")]
    StepMissingAgent(String),
}

/// Errors from the workflow engine and handoff chains.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// No workflow is registered under the requested name.
    #[error("workflow not found: {0}")]
    NotFound(String),

    /// A step references an agent definition that is not registered.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// A routing target names a step that does not exist.
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// A loop exhausted its iteration cap without its condition holding.
    #[error("maximum loop iterations exceeded")]
    MaxLoops,

    /// A condition expression could not be evaluated.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// The shared context was cancelled.
    #[error("workflow aborted")]
    Aborted,
}

/// Errors from room management.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RoomError {
    /// No room with the given id or code.
    #[error("room not found: {0}")]
    NotFound(String),

    /// A room with the code already exists.
    #[error("room already exists: {0}")]
    AlreadyExists(String),

    /// The room has been closed.
    #[error("room is closed")]
    Closed,

    /// The room has reached its agent capacity.
    #[error("room is at capacity")]
    Full,

    /// No agent occupies the role.
    #[error("role not found: {0}")]
    RoleNotFound(String),

    /// Another agent already occupies the role.
    #[error("role is already taken: {0}")]
    RoleTaken(String),

    /// The room config excludes the role.
    #[error("role not allowed: {0}")]
    RoleNotAllowed(String),

    /// The string does not name a role.
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// The operation requires the orchestrator role.
    #[error("not orchestrator")]
    NotOrchestrator,
}

/// Errors from the pub/sub transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Could not establish the connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The connect attempt timed out.
    #[error("connection timeout")]
    ConnectionTimeout,

    /// The transport is mid-reconnect; retry later.
    #[error("reconnecting")]
    Reconnecting,

    /// Reconnection attempts are exhausted.
    #[error("max reconnects exceeded ({0})")]
    MaxReconnects(u32),

    /// The payload exceeds the transport's frame limit.
    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// An inbound frame failed to decode.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A publish failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A direct message has no recipient role.
    #[error("no recipient")]
    NoRecipient,

    /// A bounded delivery channel is full; the message was dropped.
    #[error("channel full: {0}")]
    ChannelFull(&'static str),

    /// The transport is not connected.
    #[error("not connected")]
    NotConnected,
}

/// Errors from room persistence.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error("store codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// No snapshot exists for the room code.
    #[error("no snapshot for room: {0}")]
    Missing(String),

    /// The data directory could not be resolved.
    #[error("no data directory available")]
    NoDataDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_strings_match_wire_contract() {
        assert_eq!(
            ToolError::Unknown("frobnicate".into()).to_string(),
            "unknown tool: frobnicate"
        );
        assert_eq!(
            ToolError::MissingArgument("path".into()).to_string(),
            "missing required argument: path"
        );
    }

    #[test]
    fn agent_error_strings() {
        assert!(
            AgentError::MaxIterations(10)
                .to_string()
                .starts_with("max iterations reached")
        );
        assert!(
            AgentError::MaxToolRetries(3)
                .to_string()
                .starts_with("max tool retries exceeded")
        );
    }

    #[test]
    fn room_error_ladder_strings() {
        assert_eq!(RoomError::Closed.to_string(), "room is closed");
        assert_eq!(RoomError::Full.to_string(), "room is at capacity");
        assert_eq!(
            RoomError::RoleTaken("QA".into()).to_string(),
            "role is already taken: QA"
        );
        assert_eq!(
            RoomError::RoleNotAllowed("DBA".into()).to_string(),
            "role not allowed: DBA"
        );
    }

    #[test]
    fn workflow_error_strings() {
        assert_eq!(
            WorkflowError::MaxLoops.to_string(),
            "maximum loop iterations exceeded"
        );
        assert_eq!(WorkflowError::Aborted.to_string(), "workflow aborted");
    }

    #[test]
    fn errors_unify_into_top_level() {
        let e: Error = ToolError::Unknown("x".into()).into();
        assert!(matches!(e, Error::Tool(_)));
        let e: Error = TransportError::NoRecipient.into();
        assert!(matches!(e, Error::Transport(_)));
    }
}
