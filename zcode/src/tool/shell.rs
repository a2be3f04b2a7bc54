//! Shell tool: `run_command`.
//!
//! Executes under the default shell with a wall-clock deadline. The
//! confirmation callback gates every invocation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::warn;

use super::{ConfirmFn, Tool, ToolArgs, ToolOutput, required_str};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// `run_command`: execute a shell command with a 30 second deadline.
#[derive(Clone)]
pub struct RunCommandTool {
    confirm: Option<ConfirmFn>,
    timeout: Duration,
}

impl std::fmt::Debug for RunCommandTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCommandTool")
            .field("confirm", &self.confirm.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RunCommandTool {
    /// Create the tool with an optional confirmation callback.
    #[must_use]
    pub const fn new(confirm: Option<ConfirmFn>) -> Self {
        Self {
            confirm,
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Override the deadline (used by tests).
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its combined output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The shell command to execute."}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutput {
        let command = match required_str(args, "command") {
            Ok(c) => c,
            Err(e) => return e,
        };

        if let Some(confirm) = &self.confirm
            && !confirm(&format!("run command: {command}"))
        {
            return crate::error::ToolError::Denied("user denied command execution".to_owned())
                .into();
        }

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolOutput::err(format!("failed to run command: {e}")),
            Err(_) => {
                warn!(command, "command timed out");
                return ToolOutput::err("command timed out");
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut combined = String::new();
        combined.push_str(stdout.trim_end());
        if !stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stderr.trim_end());
        }
        if combined.is_empty() {
            combined.push_str("(no output)");
        }

        if output.status.success() {
            ToolOutput::ok(combined)
        } else {
            ToolOutput::err(format!(
                "command exited with {}: {combined}",
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_owned(), |c| c.to_string())
            ))
        }
    }
}
