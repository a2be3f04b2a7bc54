//! The step condition grammar.
//!
//! `true | false | a == b | a != b | expr`. Quoted strings are literals,
//! bare `true`/`false` are booleans, anything else is a (possibly dotted)
//! context lookup. Comparison renders both sides to text and compares the
//! renderings, so `review.success == "true"` holds for a boolean result.

use serde_json::Value;

use super::context::{WorkflowContext, render_value, truthy};
use crate::error::WorkflowError;

/// Resolve one operand to a value.
fn resolve(operand: &str, context: &WorkflowContext) -> Option<Value> {
    let operand = operand.trim();
    if (operand.starts_with('"') && operand.ends_with('"') && operand.len() >= 2)
        || (operand.starts_with('\'') && operand.ends_with('\'') && operand.len() >= 2)
    {
        return Some(Value::String(operand[1..operand.len() - 1].to_owned()));
    }
    match operand {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        path => context.lookup(path),
    }
}

fn render(value: Option<Value>) -> String {
    value.as_ref().map(render_value).unwrap_or_default()
}

/// Evaluate a condition expression against the context.
///
/// An empty expression is vacuously true.
pub fn evaluate(expression: &str, context: &WorkflowContext) -> Result<bool, WorkflowError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Ok(true);
    }

    for (operator, negate) in [("==", false), ("!=", true)] {
        if let Some((left, right)) = expression.split_once(operator) {
            if left.trim().is_empty() || right.trim().is_empty() {
                return Err(WorkflowError::InvalidCondition(expression.to_owned()));
            }
            let equal = render(resolve(left, context)) == render(resolve(right, context));
            return Ok(equal != negate);
        }
    }

    // Bare expression: existence / truthiness.
    Ok(truthy(resolve(expression, context).as_ref()))
}
