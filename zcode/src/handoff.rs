//! Handoff directives and the bounded chain executor.
//!
//! An agent requests transfer of control by embedding a directive in its
//! output:
//!
//! ```text
//! <handoff agent="NAME" reason="TEXT">
//!   <context key="K">VALUE</context>
//! </handoff>
//! ```
//!
//! Attributes are XML-escaped on output and decoded on parse; context
//! values round-trip modulo whitespace trimming. Later keys overwrite
//! earlier ones.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::definition::AgentDefinition;
use crate::agent::executor::CustomAgentExecutor;
use crate::error::{Result, WorkflowError};
use crate::workflow::context::{StepResult, WorkflowContext};

/// Default bound on successive handoff invocations.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10;

static HANDOFF_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<handoff\s+agent="([^"]*)"\s+reason="([^"]*)"\s*>(.*?)</handoff>"#)
        .expect("handoff block regex is valid")
});

static HANDOFF_EMPTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<handoff\s+agent="([^"]*)"\s+reason="([^"]*)"\s*/>"#)
        .expect("handoff empty regex is valid")
});

static CONTEXT_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<context\s+key="([^"]*)"\s*>(.*?)</context>"#)
        .expect("context entry regex is valid")
});

/// A request to transfer control to another agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffInstruction {
    /// Name of the agent definition to continue with.
    pub target_agent: String,
    /// Why control is being transferred.
    pub reason: String,
    /// Key/value context passed to the target. Ordered for stable output.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl HandoffInstruction {
    /// Create an instruction without context.
    #[must_use]
    pub fn new(target_agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target_agent: target_agent.into(),
            reason: reason.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// Find and decode the first handoff directive in `text`.
#[must_use]
pub fn parse_handoff(text: &str) -> Option<HandoffInstruction> {
    if let Some(caps) = HANDOFF_BLOCK.captures(text) {
        let mut context = BTreeMap::new();
        for entry in CONTEXT_ENTRY.captures_iter(&caps[3]) {
            context.insert(unescape(&entry[1]), unescape(entry[2].trim()));
        }
        return Some(HandoffInstruction {
            target_agent: unescape(&caps[1]),
            reason: unescape(&caps[2]),
            context,
        });
    }
    HANDOFF_EMPTY.captures(text).map(|caps| HandoffInstruction {
        target_agent: unescape(&caps[1]),
        reason: unescape(&caps[2]),
        context: BTreeMap::new(),
    })
}

/// Render an instruction back into directive form.
#[must_use]
pub fn format_handoff(instruction: &HandoffInstruction) -> String {
    let mut out = format!(
        "<handoff agent=\"{}\" reason=\"{}\">",
        escape(&instruction.target_agent),
        escape(&instruction.reason),
    );
    for (key, value) in &instruction.context {
        out.push_str(&format!(
            "\n  <context key=\"{}\">{}</context>",
            escape(key),
            escape(value),
        ));
    }
    out.push_str("\n</handoff>");
    out
}

/// Record of one executed link in a handoff chain.
#[derive(Debug, Clone)]
pub struct HandoffRecord {
    /// The agent that ran.
    pub agent: String,
    /// Its final response text.
    pub response: String,
}

/// Executes handoff chains with a depth bound.
#[derive(Debug, Clone, Copy)]
pub struct HandoffManager {
    max_chain_depth: usize,
}

impl Default for HandoffManager {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }
}

impl HandoffManager {
    /// Create a manager with the default depth bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the depth bound.
    #[must_use]
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Build the prompt handed to a chain link.
    fn build_prompt(instruction: &HandoffInstruction) -> String {
        let mut prompt = format!("Handoff reason: {}\n\n", instruction.reason);
        if instruction.context.is_empty() {
            prompt.push_str("Continue from the previous agent's work.");
        } else {
            for (key, value) in &instruction.context {
                prompt.push_str(&format!("{key}:\n{value}\n\n"));
            }
        }
        prompt
    }

    /// Execute at most `max_chain_depth` successive agent invocations.
    ///
    /// Each link's result is stored in the workflow context under
    /// `handoff_{target}`. The chain continues while responses carry a new
    /// directive; if one is still pending when the bound is reached it is
    /// dropped with a warning.
    pub async fn process_chain(
        &self,
        executor: &CustomAgentExecutor,
        agents: &std::collections::HashMap<String, AgentDefinition>,
        initial: HandoffInstruction,
        context: &mut WorkflowContext,
    ) -> Result<Vec<HandoffRecord>> {
        let mut records = Vec::new();
        let mut current = initial;

        for depth in 1..=self.max_chain_depth {
            let Some(definition) = agents.get(&current.target_agent) else {
                return Err(WorkflowError::AgentNotFound(current.target_agent).into());
            };

            info!(agent = %current.target_agent, depth, "Processing handoff link");
            let prompt = Self::build_prompt(&current);
            let outcome = executor.execute(definition, &prompt).await?;

            context.record_result(
                format!("handoff_{}", current.target_agent),
                StepResult {
                    success: true,
                    output: outcome.response.clone(),
                    error: String::new(),
                    loop_count: 1,
                },
            );
            records.push(HandoffRecord {
                agent: current.target_agent.clone(),
                response: outcome.response.clone(),
            });

            match outcome.handoff {
                Some(next) => current = next,
                None => return Ok(records),
            }
        }

        warn!(
            max_depth = self.max_chain_depth,
            next = %current.target_agent,
            "Handoff chain reached its depth bound; dropping pending handoff",
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_directive() {
        let text = r#"Work done.
<handoff agent="reviewer" reason="code complete">
  <context key="files">src/main.rs</context>
  <context key="notes">check error paths</context>
</handoff>"#;
        let instruction = parse_handoff(text).unwrap();
        assert_eq!(instruction.target_agent, "reviewer");
        assert_eq!(instruction.reason, "code complete");
        assert_eq!(instruction.context["files"], "src/main.rs");
        assert_eq!(instruction.context["notes"], "check error paths");
    }

    #[test]
    fn parse_self_closing_directive() {
        let instruction =
            parse_handoff(r#"<handoff agent="fixer" reason="tests failing"/>"#).unwrap();
        assert_eq!(instruction.target_agent, "fixer");
        assert!(instruction.context.is_empty());
    }

    #[test]
    fn parse_returns_none_without_directive() {
        assert!(parse_handoff("just a normal reply").is_none());
    }

    #[test]
    fn later_context_keys_overwrite_earlier() {
        let text = r#"<handoff agent="a" reason="r">
  <context key="k">first</context>
  <context key="k">second</context>
</handoff>"#;
        let instruction = parse_handoff(text).unwrap();
        assert_eq!(instruction.context["k"], "second");
    }

    #[test]
    fn format_then_parse_round_trips() {
        let original = HandoffInstruction::new("builder", "design \"done\" & approved")
            .with_context("spec", "use <generics>")
            .with_context("priority", "high");
        let rendered = format_handoff(&original);
        let parsed = parse_handoff(&rendered).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn build_prompt_includes_reason_and_context() {
        let instruction =
            HandoffInstruction::new("a", "why").with_context("key", "value");
        let prompt = HandoffManager::build_prompt(&instruction);
        assert!(prompt.starts_with("Handoff reason: why\n\n"));
        assert!(prompt.contains("key:\nvalue\n\n"));
    }

    #[test]
    fn build_prompt_empty_context_uses_continuation() {
        let prompt = HandoffManager::build_prompt(&HandoffInstruction::new("a", "why"));
        assert!(prompt.contains("Continue from the previous agent's work."));
    }
}
