//! Swarm tool: `send_message`.
//!
//! Tools that talk to the swarm receive a narrow [`SwarmLink`] at
//! construction rather than the full client, which breaks the
//! client → registry → tool → client reference cycle.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Tool, ToolArgs, ToolOutput, required_str};
use crate::error::TransportError;
use crate::swarm::role::Role;

/// The narrow client surface exposed to swarm-aware tools.
#[async_trait]
pub trait SwarmLink: Send + Sync {
    /// Broadcast a message to every role in the room.
    async fn broadcast(&self, content: &str) -> Result<(), TransportError>;

    /// Send a request to a specific role.
    async fn send_to(&self, role: Role, content: &str) -> Result<(), TransportError>;

    /// Roles currently online in the room.
    async fn online_roles(&self) -> Vec<Role>;
}

/// `send_message`: send a message to another role in the current room.
#[derive(Clone)]
pub struct SendMessageTool {
    link: Arc<dyn SwarmLink>,
}

impl std::fmt::Debug for SendMessageTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendMessageTool").finish_non_exhaustive()
    }
}

impl SendMessageTool {
    /// Create the tool over a swarm link.
    #[must_use]
    pub fn new(link: Arc<dyn SwarmLink>) -> Self {
        Self { link }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to another role in the current swarm room. Use to='ALL' to broadcast."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": {
                    "type": "string",
                    "description": "Target role (ORCH, SA, BE_DEV, FE_DEV, QA, DEVOPS, DBA, SEC, HUMAN, ALL)."
                },
                "content": {"type": "string", "description": "Message body."}
            },
            "required": ["to", "content"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutput {
        let to = match required_str(args, "to") {
            Ok(t) => t,
            Err(e) => return e,
        };
        let content = match required_str(args, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };

        let Ok(role) = to.parse::<Role>() else {
            return ToolOutput::err(format!("invalid role: {to}"));
        };

        let result = if role == Role::All {
            self.link.broadcast(content).await
        } else {
            self.link.send_to(role, content).await
        };

        match result {
            Ok(()) => ToolOutput::ok(format!("message sent to {role}")),
            Err(e) => ToolOutput::err(format!("send failed: {e}")),
        }
    }
}
