//! Declarative custom-agent definitions.
//!
//! Definitions live in markdown files: a `---`-delimited YAML frontmatter
//! block (`name`, `description`, `tools`, `max_iterations`, `handoff_to`)
//! followed by a body that becomes the system prompt. Directory loaders
//! skip unparseable files with a warning rather than failing the load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DefinitionError, Result};

/// Names that user agents may not take: built-in commands of the shell.
const RESERVED_NAMES: &[&str] = &[
    "help",
    "exit",
    "quit",
    "clear",
    "reset",
    "agents",
    "workflows",
    "skills",
    "tools",
    "swarm",
    "rooms",
];

/// Default iteration cap applied when a definition leaves it unset.
pub const DEFAULT_DEFINITION_MAX_ITERATIONS: usize = 10;

/// A declarative custom agent: prompt, tool subset, and limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique agent name.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// System prompt (the markdown body).
    #[serde(default)]
    pub system_prompt: String,
    /// Permitted tool names; empty means all tools.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Iteration cap; values ≤ 0 fall back to the default.
    #[serde(default)]
    pub max_iterations: i64,
    /// Agent to hand off to when the task completes.
    #[serde(default)]
    pub handoff_to: String,
    /// Whether the definition came from the global (user-level) directory.
    #[serde(default)]
    pub is_global: bool,
    /// Source file, for diagnostics.
    #[serde(default)]
    pub file_path: String,
}

/// Frontmatter keys accepted in agent definition files.
#[derive(Debug, Deserialize)]
struct AgentFrontmatter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    max_iterations: i64,
    #[serde(default)]
    handoff_to: String,
}

impl AgentDefinition {
    /// The effective iteration cap.
    #[must_use]
    pub fn effective_max_iterations(&self) -> usize {
        if self.max_iterations <= 0 {
            DEFAULT_DEFINITION_MAX_ITERATIONS
        } else {
            usize::try_from(self.max_iterations).unwrap_or(DEFAULT_DEFINITION_MAX_ITERATIONS)
        }
    }

    /// Whether the definition requests a handoff target.
    #[must_use]
    pub fn has_handoff_target(&self) -> bool {
        !self.handoff_to.trim().is_empty()
    }

    /// Validate name and prompt invariants.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::MissingName);
        }
        if RESERVED_NAMES
            .iter()
            .any(|r| r.eq_ignore_ascii_case(&self.name))
        {
            return Err(DefinitionError::ReservedName(self.name.clone()));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(DefinitionError::MissingSystemPrompt);
        }
        Ok(())
    }
}

/// Split a markdown document into its frontmatter and body.
fn split_frontmatter(source: &str) -> Result<(&str, &str), DefinitionError> {
    let source = source.trim_start_matches('\u{feff}');
    let rest = source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
        .ok_or(DefinitionError::NoFrontmatter)?;
    let close = rest
        .find("\n---")
        .ok_or(DefinitionError::NoFrontmatter)?;
    let frontmatter = &rest[..close];
    let body = rest[close + 4..].trim_start_matches(['-']).trim_start_matches(['\r', '\n']);
    Ok((frontmatter, body))
}

/// Parse an agent definition from markdown with YAML frontmatter.
pub fn parse_agent_markdown(
    source: &str,
    file_path: &str,
) -> Result<AgentDefinition, DefinitionError> {
    let (frontmatter, body) = split_frontmatter(source)?;
    let meta: AgentFrontmatter = serde_yaml::from_str(frontmatter)
        .map_err(|e| DefinitionError::InvalidFrontmatter(e.to_string()))?;

    let definition = AgentDefinition {
        name: meta.name,
        description: meta.description,
        system_prompt: body.trim().to_owned(),
        tools: meta.tools,
        max_iterations: meta.max_iterations,
        handoff_to: meta.handoff_to,
        is_global: false,
        file_path: file_path.to_owned(),
    };
    definition.validate()?;
    Ok(definition)
}

/// Load every `.md` agent definition under `dir`.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_agents_from_dir(dir: &Path, is_global: bool) -> Vec<AgentDefinition> {
    let mut definitions = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return definitions;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Ok(source) = std::fs::read_to_string(&path) else {
            warn!(path = %path.display(), "Could not read agent definition");
            continue;
        };
        match parse_agent_markdown(&source, &path.display().to_string()) {
            Ok(mut definition) => {
                definition.is_global = is_global;
                definitions.push(definition);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping agent definition");
            }
        }
    }
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    definitions
}
