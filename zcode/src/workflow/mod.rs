//! The workflow engine: declarative chains of custom agents with
//! conditions, loops, and explicit success/failure routing.

pub mod condition;
pub mod context;
pub mod definition;
pub mod engine;

pub use context::{CancelHandle, ContextEvent, StepResult, WorkflowContext};
pub use definition::{
    WorkflowDefinition, WorkflowStep, load_workflows_from_dir, parse_workflow_yaml,
};
pub use engine::{WorkflowEngine, WorkflowEvent, WorkflowOutcome};
