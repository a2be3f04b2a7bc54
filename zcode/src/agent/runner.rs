//! The agent loop: model call → parse tool calls → dispatch → feed results → repeat.
//!
//! [`Agent`] owns one conversation. Each [`Agent::chat`] turn drives the
//! provider until it produces a final text answer, executing tool calls
//! along the way: concurrently in the blocking path, sequentially in the
//! streaming path so UI event order is preserved.
//!
//! History invariants maintained here: the first entry is always the system
//! message; a model turn with tool calls appends exactly one assistant
//! message carrying the raw directives followed by one tool message per
//! executed call, each correlated by the model-supplied id.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::events::{ChatOutcome, EventHandler, StreamEvent, ToolExecution};
use crate::error::{AgentError, Result};
use crate::handoff::parse_handoff;
use crate::message::{Message, ToolCall};
use crate::provider::{ProviderEvent, ProviderResponse, RawToolCall, SharedProvider};
use crate::tool::{ConfirmFn, ToolOutput, ToolRegistry, builtin_registry};

/// Default cap on loop iterations per user message.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default cap on argument parse-repair attempts per user message.
pub const DEFAULT_MAX_TOOL_RETRIES: usize = 3;

const DEFAULT_SYSTEM_PROMPT: &str = "You are zcode, an AI coding assistant. \
Use the available tools to inspect, modify, and run code. \
Be precise, and report what you changed.";

/// A tool call with its argument decode status.
#[derive(Debug, Clone)]
struct ParsedCall {
    call: ToolCall,
    parse_error: Option<String>,
}

fn decode_calls(raw: &[RawToolCall]) -> Vec<ParsedCall> {
    raw.iter()
        .map(|rc| {
            let text = rc.function.arguments.trim();
            let decoded: std::result::Result<Value, String> = if text.is_empty() {
                Ok(Value::Object(serde_json::Map::new()))
            } else {
                match serde_json::from_str::<Value>(text) {
                    Ok(value) if value.is_object() => Ok(value),
                    Ok(_) => Err("arguments are not a JSON object".to_owned()),
                    Err(e) => Err(e.to_string()),
                }
            };
            match decoded {
                Ok(arguments) => ParsedCall {
                    call: ToolCall::new(&rc.id, &rc.function.name, arguments),
                    parse_error: None,
                },
                Err(message) => ParsedCall {
                    call: ToolCall::new(
                        &rc.id,
                        &rc.function.name,
                        Value::String(rc.function.arguments.clone()),
                    ),
                    parse_error: Some(message),
                },
            }
        })
        .collect()
}

fn repair_prompt(failed: &[ParsedCall]) -> String {
    let mut prompt =
        String::from("Your tool call arguments could not be parsed as JSON objects:\n");
    for parsed in failed {
        if let Some(err) = &parsed.parse_error {
            prompt.push_str(&format!("- {}: {err}\n", parsed.call.name));
        }
    }
    prompt.push_str("Please issue the tool calls again with valid JSON arguments.");
    prompt
}

/// A single model↔tools conversation.
pub struct Agent {
    provider: SharedProvider,
    registry: Arc<ToolRegistry>,
    messages: Vec<Message>,
    max_iterations: usize,
    max_tool_retries: usize,
    handler: Option<Arc<dyn EventHandler>>,
    detect_handoff: bool,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.provider.name())
            .field("messages", &self.messages.len())
            .field("max_iterations", &self.max_iterations)
            .field("max_tool_retries", &self.max_tool_retries)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create an agent over a provider, with the built-in tools registered.
    ///
    /// `confirm` is handed to the destructive tools; `None` means the
    /// embedder accepts every side effect.
    #[must_use]
    pub fn new(provider: SharedProvider, confirm: Option<ConfirmFn>) -> Self {
        Self {
            provider,
            registry: Arc::new(builtin_registry(confirm)),
            messages: vec![Message::system(DEFAULT_SYSTEM_PROMPT)],
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_retries: DEFAULT_MAX_TOOL_RETRIES,
            handler: None,
            detect_handoff: false,
        }
    }

    /// Replace the tool registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the system prompt (the first history entry).
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.messages[0] = Message::system(prompt);
        self
    }

    /// Set the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Set the parse-repair retry cap.
    #[must_use]
    pub fn with_max_tool_retries(mut self, max_tool_retries: usize) -> Self {
        self.max_tool_retries = max_tool_retries;
        self
    }

    /// Attach an event observer.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Enable handoff-directive detection on assistant replies.
    #[must_use]
    pub fn with_handoff_detection(mut self, detect: bool) -> Self {
        self.detect_handoff = detect;
        self
    }

    /// The conversation history.
    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// The tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Truncate history back to the system message.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    async fn model_turn(&self, tools: &[Value]) -> Result<ProviderResponse> {
        if let Some(handler) = &self.handler {
            handler.on_thinking();
        }
        let response = if tools.is_empty() {
            ProviderResponse::text(self.provider.generate(&self.messages).await?)
        } else {
            self.provider
                .generate_with_tools(&self.messages, tools)
                .await?
        };
        Ok(response)
    }

    async fn execute_one(&self, parsed: &ParsedCall) -> ToolExecution {
        if let Some(handler) = &self.handler {
            handler.on_tool_use(&parsed.call.name, &parsed.call.arguments);
        }
        let result = match &parsed.parse_error {
            Some(err) => ToolOutput::err(format!("invalid arguments: {err}")),
            None => self.registry.execute(&parsed.call).await,
        };
        if !result.success {
            warn!(tool = %parsed.call.name, error = %result.error, "Tool failed");
        }
        if let Some(handler) = &self.handler {
            handler.on_tool_result(&parsed.call.name, &result);
        }
        ToolExecution {
            id: parsed.call.id.clone(),
            name: parsed.call.name.clone(),
            arguments: parsed.call.arguments.clone(),
            result,
        }
    }

    /// Run one chat turn to completion.
    ///
    /// Tool calls within one model turn execute concurrently; their results
    /// are appended to history in the model's emission order.
    pub async fn chat(&mut self, user_message: &str) -> Result<ChatOutcome> {
        self.messages.push(Message::user(user_message));
        let tools = self.registry.openai_definitions().await;
        let mut executions: Vec<ToolExecution> = Vec::new();
        let mut repair_attempts = 0usize;

        for iteration in 1..=self.max_iterations {
            debug!(iteration, "Agent iteration");
            let response = self.model_turn(&tools).await?;

            if self.detect_handoff
                && let Some(instruction) = parse_handoff(&response.content)
            {
                self.messages.push(Message::assistant(&response.content));
                return Ok(ChatOutcome {
                    response: response.content,
                    tool_calls: executions,
                    handoff: Some(instruction),
                });
            }

            if !response.has_tool_calls() {
                self.messages.push(Message::assistant(&response.content));
                return Ok(ChatOutcome {
                    response: response.content,
                    tool_calls: executions,
                    handoff: None,
                });
            }

            let parsed = decode_calls(&response.tool_calls);
            if parsed.iter().all(|p| p.parse_error.is_some()) {
                repair_attempts += 1;
                if repair_attempts > self.max_tool_retries {
                    error!(attempts = repair_attempts, "Tool argument repair exhausted");
                    return Err(AgentError::MaxToolRetries(self.max_tool_retries).into());
                }
                self.messages.push(Message::assistant(&response.content));
                self.messages.push(Message::user(repair_prompt(&parsed)));
                continue;
            }

            let calls: Vec<ToolCall> = parsed.iter().map(|p| p.call.clone()).collect();
            self.messages
                .push(Message::assistant_with_tool_calls(&response.content, calls));

            let records =
                futures::future::join_all(parsed.iter().map(|p| self.execute_one(p))).await;
            for record in records {
                self.messages
                    .push(Message::tool(&record.id, &record.name, record.result.content()));
                executions.push(record);
            }
        }

        error!(max_iterations = self.max_iterations, "Agent loop exhausted");
        Err(AgentError::MaxIterations(self.max_iterations).into())
    }

    /// Run one chat turn as a stream of [`StreamEvent`]s.
    ///
    /// Tool calls execute sequentially here so `ToolStart`/`ToolResult`
    /// pairs stay adjacent in UI order.
    pub fn chat_stream(
        &mut self,
        user_message: impl Into<String>,
    ) -> impl futures::Stream<Item = StreamEvent> + Send + '_ {
        let user_message = user_message.into();
        async_stream::stream! {
            yield StreamEvent::Start;
            self.messages.push(Message::user(user_message));
            let tools = self.registry.openai_definitions().await;
            let mut repair_attempts = 0usize;

            for iteration in 1..=self.max_iterations {
                debug!(iteration, "Agent stream iteration");
                if let Some(handler) = &self.handler {
                    handler.on_thinking();
                }

                let stream_result = if tools.is_empty() {
                    self.provider.generate_stream(&self.messages).await
                } else {
                    self.provider
                        .generate_stream_with_tools(&self.messages, &tools)
                        .await
                };
                let mut provider_stream = match stream_result {
                    Ok(stream) => stream,
                    Err(e) => {
                        yield StreamEvent::Error { message: e.to_string() };
                        return;
                    }
                };

                let mut response: Option<ProviderResponse> = None;
                while let Some(event) = provider_stream.next().await {
                    match event {
                        Ok(ProviderEvent::Delta(text)) => {
                            yield StreamEvent::Chunk { text };
                        }
                        Ok(ProviderEvent::Done(resp)) => {
                            response = Some(resp);
                            break;
                        }
                        Err(e) => {
                            yield StreamEvent::Error { message: e.to_string() };
                            return;
                        }
                    }
                }
                let Some(response) = response else {
                    yield StreamEvent::Error {
                        message: "provider stream ended without completion".to_owned(),
                    };
                    return;
                };

                if self.detect_handoff
                    && let Some(instruction) = parse_handoff(&response.content)
                {
                    self.messages.push(Message::assistant(&response.content));
                    yield StreamEvent::Handoff { instruction };
                    yield StreamEvent::Done { response: response.content };
                    return;
                }

                if !response.has_tool_calls() {
                    self.messages.push(Message::assistant(&response.content));
                    yield StreamEvent::Done { response: response.content };
                    return;
                }

                let parsed = decode_calls(&response.tool_calls);
                if parsed.iter().all(|p| p.parse_error.is_some()) {
                    repair_attempts += 1;
                    if repair_attempts > self.max_tool_retries {
                        yield StreamEvent::Error {
                            message: AgentError::MaxToolRetries(self.max_tool_retries).to_string(),
                        };
                        return;
                    }
                    self.messages.push(Message::assistant(&response.content));
                    self.messages.push(Message::user(repair_prompt(&parsed)));
                    continue;
                }

                let calls: Vec<ToolCall> = parsed.iter().map(|p| p.call.clone()).collect();
                self.messages
                    .push(Message::assistant_with_tool_calls(&response.content, calls));

                let batched = parsed.len() > 1;
                if batched {
                    yield StreamEvent::ToolBatchStart { batch_size: parsed.len() };
                }
                for item in &parsed {
                    yield StreamEvent::ToolStart {
                        id: item.call.id.clone(),
                        name: item.call.name.clone(),
                        args: item.call.arguments.clone(),
                    };
                    let record = self.execute_one(item).await;
                    self.messages
                        .push(Message::tool(&record.id, &record.name, record.result.content()));
                    yield StreamEvent::ToolResult {
                        id: record.id,
                        name: record.name,
                        is_error: !record.result.success,
                        result: record.result,
                    };
                }
                if batched {
                    yield StreamEvent::ToolBatchEnd;
                }
            }

            yield StreamEvent::Error {
                message: AgentError::MaxIterations(self.max_iterations).to_string(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageRole;
    use crate::provider::{MockProvider, mock::MockTurn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn agent_with(turns: Vec<MockTurn>) -> Agent {
        Agent::new(Arc::new(MockProvider::new(turns)), None)
    }

    #[tokio::test]
    async fn single_shot_chat() {
        let mut agent = agent_with(vec![MockTurn::text("Hello")]);
        let outcome = agent.chat("hi").await.unwrap();
        assert_eq!(outcome.response, "Hello");
        assert!(outcome.tool_calls.is_empty());
        // system, user, assistant
        assert_eq!(agent.history().len(), 3);
        assert_eq!(agent.history()[0].role, MessageRole::System);
    }

    #[tokio::test]
    async fn parallel_tool_calls_preserve_order() {
        let mut agent = agent_with(vec![
            MockTurn::default()
                .with_tool_call("a", "list_dir", r#"{"path":"."}"#)
                .with_tool_call("b", "list_dir", r#"{"path":".."}"#),
            MockTurn::text("done"),
        ]);
        let outcome = agent.chat("look around").await.unwrap();
        assert_eq!(outcome.response, "done");
        assert_eq!(outcome.tool_calls.len(), 2);
        assert_eq!(outcome.tool_calls[0].id, "a");
        assert_eq!(outcome.tool_calls[1].id, "b");
    }

    #[tokio::test]
    async fn history_invariants_after_tool_turn() {
        let mut agent = agent_with(vec![
            MockTurn::default().with_tool_call("call_1", "list_dir", r#"{"path":"."}"#),
            MockTurn::text("ok"),
        ]);
        agent.chat("ls").await.unwrap();

        let history = agent.history();
        assert_eq!(history[0].role, MessageRole::System);
        for (i, msg) in history.iter().enumerate() {
            if msg.role == MessageRole::Tool {
                let id = msg.tool_call_id.as_deref().unwrap();
                let preceding = &history[..i];
                assert!(preceding.iter().any(|m| {
                    m.role == MessageRole::Assistant
                        && m.tool_calls
                            .as_ref()
                            .is_some_and(|calls| calls.iter().any(|c| c.id == id))
                }));
            }
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back_not_fatal() {
        let mut agent = agent_with(vec![
            MockTurn::default().with_tool_call("x", "no_such_tool", "{}"),
            MockTurn::text("recovered"),
        ]);
        let outcome = agent.chat("go").await.unwrap();
        assert_eq!(outcome.response, "recovered");
        assert!(!outcome.tool_calls[0].result.success);
        assert!(
            outcome.tool_calls[0]
                .result
                .error
                .contains("unknown tool: no_such_tool")
        );
    }

    #[tokio::test]
    async fn max_iterations_is_enforced() {
        // Provider always asks for another tool call; the loop must stop.
        let mut agent = agent_with(vec![
            MockTurn::default().with_tool_call("t", "list_dir", r#"{"path":"."}"#),
        ])
        .with_max_iterations(3);
        let err = agent.chat("loop forever").await.unwrap_err();
        assert!(err.to_string().contains("max iterations reached"));
    }

    #[tokio::test]
    async fn parse_repair_then_recovery() {
        let mut agent = agent_with(vec![
            MockTurn::default().with_tool_call("bad", "list_dir", "not json"),
            MockTurn::default().with_tool_call("good", "list_dir", r#"{"path":"."}"#),
            MockTurn::text("fixed"),
        ]);
        let outcome = agent.chat("try").await.unwrap();
        assert_eq!(outcome.response, "fixed");
        // The repair turn injected a synthesized user message.
        assert!(
            agent
                .history()
                .iter()
                .any(|m| m.role == MessageRole::User
                    && m.content.contains("could not be parsed"))
        );
    }

    #[tokio::test]
    async fn repair_exhaustion_errors() {
        let mut agent = agent_with(vec![
            MockTurn::default().with_tool_call("bad", "list_dir", "{{{"),
        ])
        .with_max_tool_retries(2);
        let err = agent.chat("never parses").await.unwrap_err();
        assert!(err.to_string().contains("max tool retries exceeded"));
    }

    #[tokio::test]
    async fn partial_parse_failure_executes_good_calls() {
        let mut agent = agent_with(vec![
            MockTurn::default()
                .with_tool_call("ok", "list_dir", r#"{"path":"."}"#)
                .with_tool_call("bad", "list_dir", "not json"),
            MockTurn::text("done"),
        ]);
        let outcome = agent.chat("mixed").await.unwrap();
        assert_eq!(outcome.tool_calls.len(), 2);
        assert!(outcome.tool_calls[0].result.success);
        assert!(!outcome.tool_calls[1].result.success);
        assert!(outcome.tool_calls[1].result.error.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn reset_truncates_to_system() {
        let mut agent = agent_with(vec![MockTurn::text("a"), MockTurn::text("b")]);
        agent.chat("one").await.unwrap();
        agent.reset();
        assert_eq!(agent.history().len(), 1);
        assert_eq!(agent.history()[0].role, MessageRole::System);
    }

    #[tokio::test]
    async fn handler_observes_tool_lifecycle() {
        struct Counter {
            uses: AtomicUsize,
            results: AtomicUsize,
        }
        impl EventHandler for Counter {
            fn on_tool_use(&self, _name: &str, _args: &Value) {
                self.uses.fetch_add(1, Ordering::SeqCst);
            }
            fn on_tool_result(&self, _name: &str, _result: &ToolOutput) {
                self.results.fetch_add(1, Ordering::SeqCst);
            }
        }
        let counter = Arc::new(Counter {
            uses: AtomicUsize::new(0),
            results: AtomicUsize::new(0),
        });
        let mut agent = agent_with(vec![
            MockTurn::default()
                .with_tool_call("a", "list_dir", r#"{"path":"."}"#)
                .with_tool_call("b", "list_dir", r#"{"path":"."}"#),
            MockTurn::text("ok"),
        ])
        .with_handler(Arc::clone(&counter) as Arc<dyn EventHandler>);
        agent.chat("go").await.unwrap();
        assert_eq!(counter.uses.load(Ordering::SeqCst), 2);
        assert_eq!(counter.results.load(Ordering::SeqCst), 2);
    }

    mod streaming {
        use super::*;
        use futures::StreamExt;

        async fn collect(agent: &mut Agent, message: &str) -> Vec<StreamEvent> {
            agent.chat_stream(message).collect().await
        }

        fn shape(events: &[StreamEvent]) -> String {
            events
                .iter()
                .map(|e| match e {
                    StreamEvent::Start => "start",
                    StreamEvent::Chunk { .. } => "chunk",
                    StreamEvent::ToolBatchStart { .. } => "batch_start",
                    StreamEvent::ToolStart { .. } => "tool_start",
                    StreamEvent::ToolResult { .. } => "tool_result",
                    StreamEvent::ToolBatchEnd => "batch_end",
                    StreamEvent::Handoff { .. } => "handoff",
                    StreamEvent::Done { .. } => "done",
                    StreamEvent::Error { .. } => "error",
                })
                .collect::<Vec<_>>()
                .join(" ")
        }

        #[tokio::test]
        async fn streamed_tool_loop_event_order() {
            let mut agent = agent_with(vec![
                MockTurn::deltas(["OK"]).with_tool_call("r", "read_file", r#"{"path":"x"}"#),
                MockTurn::deltas(["content is …"]),
            ]);
            let events = collect(&mut agent, "stream it").await;
            assert_eq!(
                shape(&events),
                "start chunk tool_start tool_result chunk done"
            );
        }

        #[tokio::test]
        async fn batch_framing_only_for_multiple_calls() {
            let mut agent = agent_with(vec![
                MockTurn::default()
                    .with_tool_call("a", "list_dir", r#"{"path":"."}"#)
                    .with_tool_call("b", "list_dir", r#"{"path":"."}"#),
                MockTurn::text("done"),
            ]);
            let events = collect(&mut agent, "both").await;
            assert_eq!(
                shape(&events),
                "start batch_start tool_start tool_result tool_start tool_result batch_end done"
            );
        }

        #[tokio::test]
        async fn exactly_one_terminal_event() {
            let mut agent = agent_with(vec![MockTurn::text("fin")]);
            let events = collect(&mut agent, "hello").await;
            let terminals = events.iter().filter(|e| e.is_terminal()).count();
            assert_eq!(terminals, 1);
            assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
        }

        #[tokio::test]
        async fn stream_error_on_iteration_exhaustion() {
            let mut agent = agent_with(vec![
                MockTurn::default().with_tool_call("t", "list_dir", r#"{"path":"."}"#),
            ])
            .with_max_iterations(2);
            let events = collect(&mut agent, "forever").await;
            match events.last() {
                Some(StreamEvent::Error { message }) => {
                    assert!(message.contains("max iterations reached"));
                }
                other => panic!("expected error terminal, got {other:?}"),
            }
        }
    }
}
