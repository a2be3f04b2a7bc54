//! Executes declarative agent definitions on top of the agent loop.
//!
//! The executor narrows the tool registry to the definition's subset,
//! assembles the system prompt (definition prompt + working directory +
//! handoff protocol when a target is declared), and runs the loop with the
//! definition's iteration cap. Handoff directives in the assistant text
//! abort the loop and surface on the outcome.

use std::sync::Arc;

use futures::Stream;
use tracing::info;

use super::definition::AgentDefinition;
use super::events::{ChatOutcome, StreamEvent};
use super::runner::Agent;
use crate::error::Result;
use crate::provider::SharedProvider;
use crate::tool::ToolRegistry;

/// Runs [`AgentDefinition`]s against a shared provider and tool registry.
#[derive(Clone)]
pub struct CustomAgentExecutor {
    provider: SharedProvider,
    registry: Arc<ToolRegistry>,
}

impl std::fmt::Debug for CustomAgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomAgentExecutor")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl CustomAgentExecutor {
    /// Create an executor over a provider and the full tool registry.
    #[must_use]
    pub fn new(provider: SharedProvider, registry: Arc<ToolRegistry>) -> Self {
        Self { provider, registry }
    }

    /// Assemble the system prompt for a definition.
    fn compose_system_prompt(definition: &AgentDefinition) -> String {
        let mut prompt = definition.system_prompt.trim().to_owned();

        let cwd = std::env::current_dir()
            .map_or_else(|_| ".".to_owned(), |p| p.display().to_string());
        prompt.push_str(&format!("\n\nCurrent working directory: {cwd}"));

        if definition.has_handoff_target() {
            let target = definition.handoff_to.trim();
            prompt.push_str(&format!(
                "\n\nWhen your task is complete, hand control to the \"{target}\" agent \
by ending your reply with:\n\
<handoff agent=\"{target}\" reason=\"brief reason\">\n\
  <context key=\"summary\">what you did</context>\n\
</handoff>"
            ));
        }
        prompt
    }

    /// Build a fresh loop for one definition run.
    async fn build_agent(&self, definition: &AgentDefinition) -> Agent {
        let subset = Arc::new(self.registry.subset(&definition.tools).await);
        Agent::new(Arc::clone(&self.provider), None)
            .with_registry(subset)
            .with_system_prompt(Self::compose_system_prompt(definition))
            .with_max_iterations(definition.effective_max_iterations())
            .with_handoff_detection(true)
    }

    /// Run a definition to completion.
    pub async fn execute(
        &self,
        definition: &AgentDefinition,
        prompt: &str,
    ) -> Result<ChatOutcome> {
        info!(agent = %definition.name, "Running custom agent");
        let mut agent = self.build_agent(definition).await;
        agent.chat(prompt).await
    }

    /// Run a definition as a stream of loop events.
    ///
    /// When the agent hands off, a `Handoff` event precedes the terminal
    /// `Done`.
    pub fn execute_stream<'a>(
        &'a self,
        definition: &'a AgentDefinition,
        prompt: &'a str,
    ) -> impl Stream<Item = StreamEvent> + Send + 'a {
        async_stream::stream! {
            let mut agent = self.build_agent(definition).await;
            let inner = agent.chat_stream(prompt);
            futures::pin_mut!(inner);
            while let Some(event) = futures::StreamExt::next(&mut inner).await {
                yield event;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockProvider, mock::MockTurn};
    use crate::tool::builtin_registry;
    use futures::StreamExt;

    fn definition(tools: &[&str], handoff_to: &str) -> AgentDefinition {
        AgentDefinition {
            name: "tester".into(),
            system_prompt: "You test things.".into(),
            tools: tools.iter().map(|s| (*s).to_owned()).collect(),
            handoff_to: handoff_to.into(),
            ..AgentDefinition::default()
        }
    }

    fn executor(turns: Vec<MockTurn>) -> CustomAgentExecutor {
        CustomAgentExecutor::new(
            Arc::new(MockProvider::new(turns)),
            Arc::new(builtin_registry(None)),
        )
    }

    #[tokio::test]
    async fn restricts_tools_to_subset() {
        let exec = executor(vec![MockTurn::text("done")]);
        let def = definition(&["read_file"], "");
        let agent = exec.build_agent(&def).await;
        assert_eq!(agent.registry().names().await, vec!["read_file"]);
    }

    #[tokio::test]
    async fn empty_tool_list_permits_all() {
        let exec = executor(vec![MockTurn::text("done")]);
        let def = definition(&[], "");
        let agent = exec.build_agent(&def).await;
        assert!(agent.registry().len().await >= 7);
    }

    #[test]
    fn system_prompt_includes_cwd_and_handoff_block() {
        let with_target = CustomAgentExecutor::compose_system_prompt(&definition(&[], "fixer"));
        assert!(with_target.contains("Current working directory:"));
        assert!(with_target.contains("<handoff agent=\"fixer\""));

        let without = CustomAgentExecutor::compose_system_prompt(&definition(&[], ""));
        assert!(without.contains("Current working directory:"));
        assert!(!without.contains("<handoff"));
    }

    #[tokio::test]
    async fn detects_handoff_in_response() {
        let exec = executor(vec![MockTurn::text(
            "All done.\n<handoff agent=\"fixer\" reason=\"bugs remain\">\n  <context key=\"file\">main.rs</context>\n</handoff>",
        )]);
        let outcome = exec.execute(&definition(&[], "fixer"), "go").await.unwrap();
        let handoff = outcome.handoff.unwrap();
        assert_eq!(handoff.target_agent, "fixer");
        assert_eq!(handoff.context["file"], "main.rs");
    }

    #[tokio::test]
    async fn stream_emits_handoff_before_done() {
        let exec = executor(vec![MockTurn::text(
            "<handoff agent=\"next\" reason=\"continue\"/>",
        )]);
        let def = definition(&[], "next");
        let events: Vec<StreamEvent> = exec.execute_stream(&def, "go").collect().await;
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                StreamEvent::Start => "start",
                StreamEvent::Handoff { .. } => "handoff",
                StreamEvent::Done { .. } => "done",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["start", "handoff", "done"]);
    }
}
