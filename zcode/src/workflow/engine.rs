//! The workflow engine: interprets a step list with conditions, loops, and
//! success/failure routing over a shared context.

use std::collections::HashMap;

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::condition::evaluate;
use super::context::{StepResult, WorkflowContext, substitute};
use super::definition::{WorkflowDefinition, WorkflowStep};
use crate::agent::definition::AgentDefinition;
use crate::agent::executor::CustomAgentExecutor;
use crate::error::{Result, WorkflowError};
use crate::handoff::HandoffManager;

/// Events emitted by [`WorkflowEngine::run_stream`].
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// The run began.
    WorkflowStart {
        /// Workflow name.
        name: String,
    },
    /// A step began.
    StepStart {
        /// Step name.
        step: String,
    },
    /// A step finished.
    StepDone {
        /// Step name.
        step: String,
        /// Whether it succeeded.
        success: bool,
    },
    /// Terminal: the run finished.
    WorkflowDone {
        /// Whether every executed path succeeded.
        success: bool,
    },
    /// Terminal: the run failed with an engine error.
    Error {
        /// Error description.
        message: String,
    },
}

/// Outcome of a completed workflow run.
#[derive(Debug)]
pub struct WorkflowOutcome {
    /// Whether the run completed without an unrouted failure.
    pub success: bool,
    /// The failure that terminated the run, when `success` is false.
    pub error: Option<String>,
    /// Executed steps with their results, in execution order.
    pub step_results: Vec<(String, StepResult)>,
    /// The final shared context.
    pub context: WorkflowContext,
}

/// Interprets workflow definitions over registered agent definitions.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    executor: CustomAgentExecutor,
    agents: HashMap<String, AgentDefinition>,
    workflows: HashMap<String, WorkflowDefinition>,
    handoff: HandoffManager,
}

impl WorkflowEngine {
    /// Create an engine over an executor and the known agent definitions.
    #[must_use]
    pub fn new(executor: CustomAgentExecutor, agents: HashMap<String, AgentDefinition>) -> Self {
        Self {
            executor,
            agents,
            workflows: HashMap::new(),
            handoff: HandoffManager::new(),
        }
    }

    /// Register or replace an agent definition.
    pub fn register_agent(&mut self, definition: AgentDefinition) {
        self.agents.insert(definition.name.clone(), definition);
    }

    /// Register or replace a workflow definition.
    ///
    /// Dangling routing targets are tolerated (fallthrough) but flagged.
    pub fn register_workflow(&mut self, definition: WorkflowDefinition) {
        if let Err(e) = definition.validate_routes() {
            warn!(workflow = %definition.name, error = %e, "Workflow has a dangling route");
        }
        self.workflows.insert(definition.name.clone(), definition);
    }

    /// Run a registered workflow by name.
    pub async fn run_by_name(&self, name: &str, initial_prompt: &str) -> Result<WorkflowOutcome> {
        let Some(definition) = self.workflows.get(name) else {
            return Err(WorkflowError::NotFound(name.to_owned()).into());
        };
        self.run(definition, initial_prompt).await
    }

    /// Build the prompt for one step iteration.
    fn build_prompt(
        step: &WorkflowStep,
        initial_prompt: &str,
        context: &WorkflowContext,
    ) -> String {
        let mut prompt = if step.prompt.trim().is_empty() {
            initial_prompt.to_owned()
        } else {
            substitute(&step.prompt, initial_prompt, context)
        };

        if !step.input.trim().is_empty()
            && let Some(value) = context.lookup(&step.input)
            && let Some(text) = value.as_str()
            && !text.is_empty()
        {
            prompt = format!("Context from previous step:\n{text}\n\nTask:\n{prompt}");
        }
        prompt
    }

    /// Run one step, honouring its loop settings.
    async fn run_step(
        &self,
        step: &WorkflowStep,
        initial_prompt: &str,
        context: &mut WorkflowContext,
    ) -> Result<StepResult> {
        let Some(agent) = self.agents.get(&step.agent) else {
            return Err(WorkflowError::AgentNotFound(step.agent.clone()).into());
        };

        let cap = step.effective_loop_cap();
        let looped = !step.loop_until.trim().is_empty();
        let mut result = StepResult::default();

        for iteration in 1..=cap {
            debug!(step = %step.name, iteration, "Running step iteration");
            let prompt = Self::build_prompt(step, initial_prompt, context);

            match self.executor.execute(agent, &prompt).await {
                Ok(outcome) => {
                    result = StepResult {
                        success: true,
                        output: outcome.response,
                        error: String::new(),
                        loop_count: iteration,
                    };
                    if let Some(instruction) = outcome.handoff {
                        self.handoff
                            .process_chain(&self.executor, &self.agents, instruction, context)
                            .await?;
                    }
                }
                Err(e) => {
                    result = StepResult {
                        success: false,
                        output: String::new(),
                        error: e.to_string(),
                        loop_count: iteration,
                    };
                    break;
                }
            }

            if !looped {
                break;
            }
            // The step's latest result is visible to its own loop condition.
            context.record_result(step.name.clone(), result.clone());
            if evaluate(&step.loop_until, context)? {
                break;
            }
            if iteration == cap {
                warn!(step = %step.name, cap, "Loop cap exhausted");
                result.success = false;
                result.error = WorkflowError::MaxLoops.to_string();
            }
        }

        Ok(result)
    }

    async fn run_inner(
        &self,
        definition: &WorkflowDefinition,
        initial_prompt: &str,
        cancel: Option<super::context::CancelHandle>,
        events: Option<&mpsc::Sender<WorkflowEvent>>,
    ) -> Result<WorkflowOutcome> {
        definition.validate()?;
        info!(workflow = %definition.name, "Starting workflow");

        let mut context = match cancel {
            Some(handle) => WorkflowContext::with_cancel(initial_prompt, handle),
            None => WorkflowContext::new(initial_prompt),
        };
        let mut step_results: Vec<(String, StepResult)> = Vec::new();
        let mut index = 0usize;

        while index < definition.steps.len() {
            if context.is_cancelled() {
                return Err(WorkflowError::Aborted.into());
            }
            let step = &definition.steps[index];

            if !step.condition.trim().is_empty() && !evaluate(&step.condition, &context)? {
                debug!(step = %step.name, "Condition false; skipping");
                context.record_event(&step.name, "skipped (condition false)");
                index += 1;
                continue;
            }

            if let Some(tx) = events {
                let _ = tx
                    .send(WorkflowEvent::StepStart {
                        step: step.name.clone(),
                    })
                    .await;
            }

            let result = self.run_step(step, initial_prompt, &mut context).await?;

            if result.success && !step.output.trim().is_empty() {
                context.set_value(
                    step.output.clone(),
                    serde_json::Value::String(result.output.clone()),
                );
            }
            context.record_result(step.name.clone(), result.clone());
            step_results.push((step.name.clone(), result.clone()));

            if let Some(tx) = events {
                let _ = tx
                    .send(WorkflowEvent::StepDone {
                        step: step.name.clone(),
                        success: result.success,
                    })
                    .await;
            }

            if result.success {
                if !step.on_success.trim().is_empty()
                    && let Some(target) = definition.step_index(&step.on_success)
                {
                    index = target;
                    continue;
                }
                index += 1;
            } else {
                if !step.on_failure.trim().is_empty()
                    && let Some(target) = definition.step_index(&step.on_failure)
                {
                    index = target;
                    continue;
                }
                // No failure route: terminate with the failure propagated.
                return Ok(WorkflowOutcome {
                    success: false,
                    error: Some(result.error),
                    step_results,
                    context,
                });
            }
        }

        info!(workflow = %definition.name, steps = step_results.len(), "Workflow complete");
        Ok(WorkflowOutcome {
            success: true,
            error: None,
            step_results,
            context,
        })
    }

    /// Run a workflow to completion.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        initial_prompt: &str,
    ) -> Result<WorkflowOutcome> {
        self.run_inner(definition, initial_prompt, None, None).await
    }

    /// Run a workflow whose cancellation is driven by an external handle.
    pub async fn run_cancellable(
        &self,
        definition: &WorkflowDefinition,
        initial_prompt: &str,
        cancel: super::context::CancelHandle,
    ) -> Result<WorkflowOutcome> {
        self.run_inner(definition, initial_prompt, Some(cancel), None)
            .await
    }

    /// Run a workflow, emitting progress events.
    ///
    /// The stream yields `WorkflowStart`, step events, and a terminal
    /// `WorkflowDone` or `Error`.
    pub fn run_stream(
        &self,
        definition: WorkflowDefinition,
        initial_prompt: String,
    ) -> impl Stream<Item = WorkflowEvent> + Send + use<> {
        let (tx, mut rx) = mpsc::channel(32);
        let engine = self.clone();

        tokio::spawn(async move {
            let _ = tx
                .send(WorkflowEvent::WorkflowStart {
                    name: definition.name.clone(),
                })
                .await;
            match engine
                .run_inner(&definition, &initial_prompt, None, Some(&tx))
                .await
            {
                Ok(outcome) => {
                    let _ = tx
                        .send(WorkflowEvent::WorkflowDone {
                            success: outcome.success,
                        })
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(WorkflowEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });

        async_stream::stream! {
            while let Some(event) = rx.recv().await {
                let terminal = matches!(
                    event,
                    WorkflowEvent::WorkflowDone { .. } | WorkflowEvent::Error { .. }
                );
                yield event;
                if terminal {
                    break;
                }
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
    use std::sync::Arc;

    fn agent(name: &str) -> AgentDefinition {
        AgentDefinition {
            name: name.into(),
            system_prompt: format!("You are {name}."),
            ..AgentDefinition::default()
        }
    }

    fn engine_with(turns: Vec<MockTurn>, agent_names: &[&str]) -> WorkflowEngine {
        let executor = CustomAgentExecutor::new(
            Arc::new(MockProvider::new(turns)),
            Arc::new(builtin_registry(None)),
        );
        let agents = agent_names
            .iter()
            .map(|n| ((*n).to_owned(), agent(n)))
            .collect();
        WorkflowEngine::new(executor, agents)
    }

    fn step(name: &str, agent: &str) -> WorkflowStep {
        WorkflowStep {
            name: name.into(),
            agent: agent.into(),
            ..WorkflowStep::default()
        }
    }

    fn workflow(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
        WorkflowDefinition {
            name: "test".into(),
            steps,
            ..WorkflowDefinition::default()
        }
    }

    #[tokio::test]
    async fn linear_workflow_runs_every_step() {
        let engine = engine_with(
            vec![MockTurn::text("one"), MockTurn::text("two")],
            &["a", "b"],
        );
        let def = workflow(vec![step("first", "a"), step("second", "b")]);
        let outcome = engine.run(&def, "go").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.step_results.len(), 2);
        assert_eq!(outcome.step_results[0].1.output, "one");
        assert_eq!(outcome.step_results[1].1.output, "two");
    }

    #[tokio::test]
    async fn branch_on_context_value() {
        // review sets has_issues via its output key; fix runs only when true.
        let engine = engine_with(
            vec![MockTurn::text("true"), MockTurn::text("patched")],
            &["review", "fix", "finish"],
        );
        let mut review = step("review", "review");
        review.output = "has_issues".into();
        let mut fix = step("fix", "fix");
        fix.condition = r#"has_issues == "true""#.into();
        let mut finish = step("finish", "finish");
        finish.condition = r#"has_issues == "false""#.into();

        let def = workflow(vec![review, fix, finish]);
        let outcome = engine.run(&def, "review the code").await.unwrap();
        assert!(outcome.success);
        let executed: Vec<&str> = outcome
            .step_results
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(executed, vec!["review", "fix"]);
    }

    #[tokio::test]
    async fn loop_until_satisfied() {
        // Output "not yet" twice, then "done"; loop_until checks the output.
        let engine = engine_with(
            vec![
                MockTurn::text("not yet"),
                MockTurn::text("not yet"),
                MockTurn::text("done"),
            ],
            &["worker"],
        );
        let mut looping = step("work", "worker");
        looping.loop_until = r#"work.output == "done""#.into();
        looping.max_loops = 5;

        let def = workflow(vec![looping]);
        let outcome = engine.run(&def, "work").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.step_results[0].1.loop_count, 3);
    }

    #[tokio::test]
    async fn loop_cap_exhaustion_fails_step() {
        let engine = engine_with(vec![MockTurn::text("never")], &["worker"]);
        let mut looping = step("work", "worker");
        looping.loop_until = r#"work.output == "done""#.into();
        looping.max_loops = 3;

        let def = workflow(vec![looping]);
        let outcome = engine.run(&def, "work").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("maximum loop iterations exceeded")
        );
        assert_eq!(outcome.step_results[0].1.loop_count, 3);
    }

    #[tokio::test]
    async fn on_failure_routes_to_named_step() {
        let engine = engine_with(
            vec![MockTurn::text("never"), MockTurn::text("escalated")],
            &["worker", "escalator"],
        );
        let mut failing = step("work", "worker");
        failing.loop_until = r#"work.output == "done""#.into();
        failing.max_loops = 1;
        failing.on_failure = "escalate".into();
        let def = workflow(vec![failing, step("escalate", "escalator")]);

        let outcome = engine.run(&def, "try").await.unwrap();
        assert!(outcome.success);
        let executed: Vec<&str> = outcome
            .step_results
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(executed, vec!["work", "escalate"]);
    }

    #[tokio::test]
    async fn run_by_name_requires_registration() {
        let mut engine = engine_with(vec![MockTurn::text("one")], &["a"]);
        let err = engine.run_by_name("missing", "go").await.unwrap_err();
        assert_eq!(err.to_string(), "workflow not found: missing");

        engine.register_workflow(workflow(vec![step("only", "a")]));
        let outcome = engine.run_by_name("test", "go").await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn unknown_agent_is_fatal() {
        let engine = engine_with(vec![MockTurn::text("x")], &["known"]);
        let def = workflow(vec![step("s", "missing")]);
        let err = engine.run(&def, "go").await.unwrap_err();
        assert!(err.to_string().contains("agent not found: missing"));
    }

    #[tokio::test]
    async fn cancelled_run_aborts_before_next_step() {
        use crate::workflow::context::CancelHandle;
        let engine = engine_with(vec![MockTurn::text("x")], &["a"]);
        let def = workflow(vec![step("s", "a")]);
        let handle = CancelHandle::default();
        handle.cancel();
        let err = engine
            .run_cancellable(&def, "go", handle)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "workflow aborted");
    }

    #[tokio::test]
    async fn input_key_prefixes_prompt() {
        let mut ctx = WorkflowContext::new("initial");
        ctx.set_value("notes", serde_json::Value::String("prior findings".into()));
        let mut with_input = step("s", "a");
        with_input.input = "notes".into();
        with_input.prompt = "Do the thing with {user_input}".into();
        let prompt = WorkflowEngine::build_prompt(&with_input, "initial", &ctx);
        assert!(prompt.starts_with("Context from previous step:\nprior findings\n\nTask:\n"));
        assert!(prompt.ends_with("Do the thing with initial"));
    }

    #[tokio::test]
    async fn stream_emits_lifecycle_events() {
        let engine = engine_with(vec![MockTurn::text("one")], &["a"]);
        let def = workflow(vec![step("only", "a")]);
        let events: Vec<WorkflowEvent> =
            engine.run_stream(def, "go".into()).collect().await;
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                WorkflowEvent::WorkflowStart { .. } => "start",
                WorkflowEvent::StepStart { .. } => "step_start",
                WorkflowEvent::StepDone { .. } => "step_done",
                WorkflowEvent::WorkflowDone { .. } => "done",
                WorkflowEvent::Error { .. } => "error",
            })
            .collect();
        assert_eq!(kinds, vec!["start", "step_start", "step_done", "done"]);
    }
}
