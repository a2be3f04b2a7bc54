//! Declarative workflow definitions.
//!
//! Workflows are YAML documents with top-level `name`, `description`, and
//! `steps`. Unset string fields stay empty; `max_loops` ≤ 0 means unset.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DefinitionError;

/// Loop cap applied when `loop_until` is set but `max_loops` is not.
pub const DEFAULT_LOOP_CAP: usize = 10;

/// One step of a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step name; routing targets refer to it.
    pub name: String,
    /// Agent definition to run.
    pub agent: String,
    /// Context key whose value is prepended to the prompt.
    #[serde(default)]
    pub input: String,
    /// Context key the step's response is stored under.
    #[serde(default)]
    pub output: String,
    /// Prompt template; falls back to the workflow's initial prompt.
    #[serde(default)]
    pub prompt: String,
    /// Condition gating the step; false skips it.
    #[serde(default)]
    pub condition: String,
    /// Loop until this condition holds.
    #[serde(default)]
    pub loop_until: String,
    /// Loop iteration cap; ≤ 0 means unset.
    #[serde(default)]
    pub max_loops: i64,
    /// Step to jump to on success.
    #[serde(default)]
    pub on_success: String,
    /// Step to jump to on failure.
    #[serde(default)]
    pub on_failure: String,
}

impl WorkflowStep {
    /// The effective loop cap: `max_loops` when set, else 1, raised to
    /// [`DEFAULT_LOOP_CAP`] when a `loop_until` condition is present.
    #[must_use]
    pub fn effective_loop_cap(&self) -> usize {
        let cap = if self.max_loops > 0 {
            usize::try_from(self.max_loops).unwrap_or(1)
        } else {
            1
        };
        if !self.loop_until.trim().is_empty() && cap == 1 {
            DEFAULT_LOOP_CAP
        } else {
            cap
        }
    }
}

/// A named, ordered sequence of workflow steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow name.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// Whether the definition came from the global directory.
    #[serde(default)]
    pub is_global: bool,
    /// Source file, for diagnostics.
    #[serde(default)]
    pub file_path: String,
}

impl WorkflowDefinition {
    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::MissingName);
        }
        if self.steps.is_empty() {
            return Err(DefinitionError::NoSteps);
        }
        for step in &self.steps {
            if step.agent.trim().is_empty() {
                return Err(DefinitionError::StepMissingAgent(step.name.clone()));
            }
        }
        Ok(())
    }

    /// Index of the step with the given name.
    #[must_use]
    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Check that every routing target resolves to a step.
    ///
    /// Dangling targets are legal at run time (the engine falls through),
    /// so loaders call this as a lint and warn rather than reject.
    pub fn validate_routes(&self) -> Result<(), crate::error::WorkflowError> {
        for step in &self.steps {
            for target in [&step.on_success, &step.on_failure] {
                if !target.trim().is_empty() && self.step_index(target).is_none() {
                    return Err(crate::error::WorkflowError::StepNotFound(target.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Parse a workflow definition from YAML.
pub fn parse_workflow_yaml(
    source: &str,
    file_path: &str,
) -> Result<WorkflowDefinition, DefinitionError> {
    let mut definition: WorkflowDefinition = serde_yaml::from_str(source)
        .map_err(|e| DefinitionError::InvalidFrontmatter(e.to_string()))?;
    definition.file_path = file_path.to_owned();
    definition.validate()?;
    Ok(definition)
}

/// Load every `.yaml`/`.yml` workflow under `dir`, skipping bad files.
pub fn load_workflows_from_dir(dir: &Path, is_global: bool) -> Vec<WorkflowDefinition> {
    let mut definitions = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return definitions;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("yaml" | "yml")) {
            continue;
        }
        let Ok(source) = std::fs::read_to_string(&path) else {
            warn!(path = %path.display(), "Could not read workflow definition");
            continue;
        };
        match parse_workflow_yaml(&source, &path.display().to_string()) {
            Ok(mut definition) => {
                definition.is_global = is_global;
                definitions.push(definition);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping workflow definition");
            }
        }
    }
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    definitions
}
