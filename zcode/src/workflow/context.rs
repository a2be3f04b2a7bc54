//! Shared workflow context: values, step results, history, cancellation.
//!
//! The context is pre-seeded with `user_input` and grows as steps record
//! results. Step results export as nested maps (`success`, `output`,
//! `error`, `loop_count`) so conditions and templates can address them
//! with dotted paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Result of one executed workflow step.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    /// Whether the step succeeded.
    pub success: bool,
    /// The agent's final response.
    pub output: String,
    /// Error text when failed.
    pub error: String,
    /// Number of loop iterations consumed.
    pub loop_count: usize,
}

impl StepResult {
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(self.success));
        map.insert("output".into(), Value::String(self.output.clone()));
        map.insert("error".into(), Value::String(self.error.clone()));
        map.insert("loop_count".into(), Value::from(self.loop_count));
        Value::Object(map)
    }
}

/// One entry of the context's execution history.
#[derive(Debug, Clone)]
pub struct ContextEvent {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Which step it concerns.
    pub step: String,
    /// What happened.
    pub description: String,
}

/// Cooperative cancellation handle for a running workflow.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request cancellation; the engine aborts before its next step.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The mutable state shared across a workflow run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    /// Free-form values, seeded with `user_input`.
    pub values: HashMap<String, Value>,
    /// Results recorded per step name.
    pub results: HashMap<String, StepResult>,
    /// Ordered execution history.
    pub history: Vec<ContextEvent>,
    cancel: CancelHandle,
}

impl WorkflowContext {
    /// Create a context seeded with the initial prompt.
    #[must_use]
    pub fn new(initial_prompt: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(
            "user_input".to_owned(),
            Value::String(initial_prompt.to_owned()),
        );
        Self {
            values,
            results: HashMap::new(),
            history: Vec::new(),
            cancel: CancelHandle::default(),
        }
    }

    /// Create a context whose cancellation is driven by an external handle.
    #[must_use]
    pub fn with_cancel(initial_prompt: &str, cancel: CancelHandle) -> Self {
        let mut context = Self::new(initial_prompt);
        context.cancel = cancel;
        context
    }

    /// A handle that can cancel the run from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Store a free-form value.
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Record a step result and note it in history.
    pub fn record_result(&mut self, step: impl Into<String>, result: StepResult) {
        let step = step.into();
        self.record_event(
            &step,
            if result.success {
                "completed".to_owned()
            } else {
                format!("failed: {}", result.error)
            },
        );
        self.results.insert(step, result);
    }

    /// Append a history event.
    pub fn record_event(&mut self, step: &str, description: impl Into<String>) {
        self.history.push(ContextEvent {
            timestamp: Utc::now(),
            step: step.to_owned(),
            description: description.into(),
        });
    }

    /// Export values and step results as one addressable map.
    #[must_use]
    pub fn export_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in &self.values {
            map.insert(key.clone(), value.clone());
        }
        for (name, result) in &self.results {
            map.insert(name.clone(), result.to_value());
        }
        map
    }

    /// Resolve a possibly-dotted path against the exported map.
    ///
    /// Unresolved segments yield `None`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let map = self.export_map();
        let mut current = Value::Object(map);
        for segment in path.split('.') {
            current = current.get(segment)?.clone();
        }
        Some(current)
    }
}

/// Render a value the way conditions and templates see it.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Anything not nil, not empty string, and not `false` is truthy.
#[must_use]
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Expand `{user_input}`, `{key}`, and `{key.field}` references.
///
/// `{user_input}` is replaced first with the initial prompt; remaining
/// references resolve against the context. Unknown references are left
/// literal.
#[must_use]
pub fn substitute(template: &str, initial_prompt: &str, context: &WorkflowContext) -> String {
    use std::sync::LazyLock;
    static REFERENCE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"\{([A-Za-z0-9_][A-Za-z0-9_.]*)\}").expect("reference regex is valid")
    });

    let seeded = template.replace("{user_input}", initial_prompt);
    REFERENCE
        .replace_all(&seeded, |caps: &regex::Captures<'_>| {
            context.lookup(&caps[1]).map_or_else(
                || caps[0].to_owned(),
                |value| render_value(&value),
            )
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with_result() -> WorkflowContext {
        let mut ctx = WorkflowContext::new("build it");
        ctx.record_result(
            "review",
            StepResult {
                success: true,
                output: "looks good".into(),
                error: String::new(),
                loop_count: 2,
            },
        );
        ctx.set_value("has_issues", json!("true"));
        ctx
    }

    #[test]
    fn seeded_with_user_input() {
        let ctx = WorkflowContext::new("hello");
        assert_eq!(ctx.lookup("user_input"), Some(json!("hello")));
    }

    #[test]
    fn dotted_lookup_into_step_results() {
        let ctx = context_with_result();
        assert_eq!(ctx.lookup("review.success"), Some(json!(true)));
        assert_eq!(ctx.lookup("review.output"), Some(json!("looks good")));
        assert_eq!(ctx.lookup("review.loop_count"), Some(json!(2)));
        assert_eq!(ctx.lookup("review.missing"), None);
        assert_eq!(ctx.lookup("absent.field"), None);
    }

    #[test]
    fn truthiness_rules() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&Value::Null)));
        assert!(!truthy(Some(&json!(""))));
        assert!(!truthy(Some(&json!(false))));
        assert!(truthy(Some(&json!("x"))));
        assert!(truthy(Some(&json!(0))));
        assert!(truthy(Some(&json!(true))));
    }

    #[test]
    fn substitute_user_input_first_then_context() {
        let ctx = context_with_result();
        let rendered = substitute(
            "Task: {user_input}. Review said: {review.output}. Unknown: {nope}",
            "build it",
            &ctx,
        );
        assert_eq!(
            rendered,
            "Task: build it. Review said: looks good. Unknown: {nope}"
        );
    }

    #[test]
    fn cancel_handle_crosses_clones() {
        let ctx = WorkflowContext::new("x");
        let handle = ctx.cancel_handle();
        assert!(!ctx.is_cancelled());
        handle.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn record_result_appends_history() {
        let ctx = context_with_result();
        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.history[0].step, "review");
    }
}
