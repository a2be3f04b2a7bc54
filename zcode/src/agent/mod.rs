//! The agent loop and its declarative wrappers.
//!
//! [`Agent`] drives one model↔tools conversation (see [`runner`]).
//! [`definition`] holds declarative custom-agent definitions loaded from
//! markdown files, and [`executor`] runs them on top of the loop with
//! per-definition tool subsets and handoff detection.

pub mod definition;
pub mod events;
pub mod executor;
pub mod runner;

pub use definition::{AgentDefinition, load_agents_from_dir, parse_agent_markdown};
pub use events::{ChatOutcome, EventHandler, StreamEvent, ToolExecution};
pub use executor::CustomAgentExecutor;
pub use runner::{Agent, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_TOOL_RETRIES};
