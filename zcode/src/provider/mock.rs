//! Scripted provider implementation for testing.
//!
//! Returns predefined turns in sequence, cycling when exhausted. Each turn
//! can carry text deltas (streamed one per chunk) and tool-call directives,
//! which makes the full agent loop, including parallel dispatch, repair,
//! and streaming event ordering, exercisable without a network.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{Provider, ProviderEvent, ProviderResponse, ProviderStream, RawToolCall};
use crate::error::{LlmError, Result};
use crate::message::Message;

/// One scripted model turn.
#[derive(Debug, Clone, Default)]
pub struct MockTurn {
    /// Text deltas, streamed in order; their concatenation is the content.
    pub deltas: Vec<String>,
    /// Tool calls attached to this turn.
    pub tool_calls: Vec<RawToolCall>,
}

impl MockTurn {
    /// A plain text turn.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            deltas: vec![content.into()],
            tool_calls: Vec::new(),
        }
    }

    /// A turn with explicit deltas.
    #[must_use]
    pub fn deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            tool_calls: Vec::new(),
        }
    }

    /// Attach a tool call to the turn.
    #[must_use]
    pub fn with_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        self.tool_calls.push(RawToolCall::new(id, name, arguments));
        self
    }

    fn content(&self) -> String {
        self.deltas.concat()
    }

    fn response(&self) -> ProviderResponse {
        ProviderResponse {
            content: self.content(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}

/// A scripted provider that serves [`MockTurn`]s in order.
#[derive(Debug, Default)]
pub struct MockProvider {
    turns: Vec<MockTurn>,
    index: AtomicUsize,
}

impl MockProvider {
    /// Create a provider from scripted turns.
    #[must_use]
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns,
            index: AtomicUsize::new(0),
        }
    }

    /// Shorthand for a provider of plain-text turns.
    #[must_use]
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(MockTurn::text).collect())
    }

    /// Number of turns consumed so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    fn next_turn(&self) -> MockTurn {
        if self.turns.is_empty() {
            return MockTurn::text("");
        }
        let index = self.index.fetch_add(1, Ordering::SeqCst);
        self.turns[index % self.turns.len()].clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, _messages: &[Message]) -> Result<String, LlmError> {
        Ok(self.next_turn().content())
    }

    async fn generate_stream(&self, _messages: &[Message]) -> Result<ProviderStream, LlmError> {
        let turn = self.next_turn();
        Ok(Box::pin(async_stream::stream! {
            for delta in &turn.deltas {
                yield Ok(ProviderEvent::Delta(delta.clone()));
            }
            yield Ok(ProviderEvent::Done(ProviderResponse::text(turn.content())));
        }))
    }

    async fn generate_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[serde_json::Value],
    ) -> Result<ProviderResponse, LlmError> {
        Ok(self.next_turn().response())
    }

    async fn generate_stream_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[serde_json::Value],
    ) -> Result<ProviderStream, LlmError> {
        let turn = self.next_turn();
        Ok(Box::pin(async_stream::stream! {
            for delta in &turn.deltas {
                yield Ok(ProviderEvent::Delta(delta.clone()));
            }
            yield Ok(ProviderEvent::Done(turn.response()));
        }))
    }
}
