//! zcode: a multi-agent orchestration and collaboration runtime.
//!
//! The crate is organised around four coupled subsystems:
//!
//! - **Agent loop** ([`agent`]): drives a model provider through the
//!   tool-use cycle (model call, tool-call parsing, dispatch, result
//!   feedback) with streaming events and parse repair.
//! - **Tools** ([`tool`]): a uniform registry with schema validation,
//!   confirmation gating, and the built-in coding tools.
//! - **Workflows** ([`workflow`] and [`handoff`]): declarative chains of
//!   custom agents with conditions, loops, routing, and bounded handoff
//!   chains over a shared context.
//! - **Swarm** ([`swarm`]): rooms, roles, presence, and typed messages
//!   over a pub/sub bus, with reconnection, heartbeat, persistence, and
//!   the autopilot control plane.
//!
//! Model providers are external: implement [`provider::Provider`] and
//! hand it to [`agent::Agent`]. The [`provider::MockProvider`] drives the
//! whole runtime in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zcode::prelude::*;
//!
//! let provider = Arc::new(MockProvider::with_texts(["Hello!"]));
//! let mut agent = Agent::new(provider, None);
//! let outcome = agent.chat("hi").await?;
//! assert_eq!(outcome.response, "Hello!");
//! ```

pub mod agent;
pub mod error;
pub mod handoff;
pub mod message;
pub mod provider;
pub mod skill;
pub mod swarm;
pub mod tool;
pub mod workflow;

pub use error::{Error, Result};

/// Curated re-exports for embedders.
pub mod prelude {
    pub use crate::agent::{
        Agent, AgentDefinition, ChatOutcome, CustomAgentExecutor, EventHandler, StreamEvent,
        ToolExecution,
    };
    pub use crate::error::{Error, Result};
    pub use crate::handoff::{
        HandoffInstruction, HandoffManager, format_handoff, parse_handoff,
    };
    pub use crate::message::{Message, MessageRole, ToolCall};
    pub use crate::provider::{MockProvider, Provider, ProviderResponse, SharedProvider};
    pub use crate::skill::SkillDefinition;
    pub use crate::swarm::{
        AgentSink, Bus, ClientEvent, MemoryBus, MessageType, PresenceStatus, PromptSink, Role,
        Room, RoomConfig, RoomManager, RoomStore, SwarmClient, SwarmMessage, SwarmTransport,
        TransportConfig,
    };
    pub use crate::tool::{
        ConfirmFn, SwarmLink, Tool, ToolOutput, ToolRegistry, builtin_registry,
    };
    pub use crate::workflow::{
        WorkflowContext, WorkflowDefinition, WorkflowEngine, WorkflowEvent, WorkflowStep,
    };
}
