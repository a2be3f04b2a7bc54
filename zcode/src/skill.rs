//! Prompt-template skills.
//!
//! A skill is a markdown file: YAML frontmatter (`name`, `description`,
//! `variables`, `tags`) and a body template expanded with `{user_input}`
//! and `{variable}` placeholders, then executed through the base agent
//! loop by the embedder.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DefinitionError;

/// A named prompt template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillDefinition {
    /// Unique skill name.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Variable names the template expects.
    #[serde(default)]
    pub variables: Vec<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// The body template.
    #[serde(default)]
    pub template: String,
    /// Whether the skill came from the global directory.
    #[serde(default)]
    pub is_global: bool,
    /// Source file, for diagnostics.
    #[serde(default)]
    pub file_path: String,
}

#[derive(Debug, Deserialize)]
struct SkillFrontmatter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    variables: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl SkillDefinition {
    /// Expand the template with the user input and variable values.
    ///
    /// Unknown placeholders are left literal.
    #[must_use]
    pub fn render(&self, user_input: &str, variables: &HashMap<String, String>) -> String {
        let mut rendered = self.template.replace("{user_input}", user_input);
        for (name, value) in variables {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        rendered
    }

    /// Validate name and template invariants.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::MissingName);
        }
        if self.template.trim().is_empty() {
            return Err(DefinitionError::MissingSystemPrompt);
        }
        Ok(())
    }
}

/// Parse a skill from markdown with YAML frontmatter.
pub fn parse_skill_markdown(
    source: &str,
    file_path: &str,
) -> Result<SkillDefinition, DefinitionError> {
    let source = source.trim_start_matches('\u{feff}');
    let rest = source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
        .ok_or(DefinitionError::NoFrontmatter)?;
    let close = rest.find("\n---").ok_or(DefinitionError::NoFrontmatter)?;

    let meta: SkillFrontmatter = serde_yaml::from_str(&rest[..close])
        .map_err(|e| DefinitionError::InvalidFrontmatter(e.to_string()))?;
    let body = rest[close + 4..].trim_start_matches(['\r', '\n']);

    let skill = SkillDefinition {
        name: meta.name,
        description: meta.description,
        variables: meta.variables,
        tags: meta.tags,
        template: body.trim().to_owned(),
        is_global: false,
        file_path: file_path.to_owned(),
    };
    skill.validate()?;
    Ok(skill)
}

/// Load every `.md` skill under `dir`, skipping bad files with a warning.
pub fn load_skills_from_dir(dir: &Path, is_global: bool) -> Vec<SkillDefinition> {
    let mut skills = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return skills;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Ok(source) = std::fs::read_to_string(&path) else {
            warn!(path = %path.display(), "Could not read skill");
            continue;
        };
        match parse_skill_markdown(&source, &path.display().to_string()) {
            Ok(mut skill) => {
                skill.is_global = is_global;
                skills.push(skill);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping skill");
            }
        }
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\nname: explain\ndescription: Explain code\nvariables:\n  - depth\ntags:\n  - docs\n---\n\nExplain {user_input} at {depth} depth.\n";

    #[test]
    fn parses_frontmatter_and_template() {
        let skill = parse_skill_markdown(SAMPLE, "explain.md").unwrap();
        assert_eq!(skill.name, "explain");
        assert_eq!(skill.variables, vec!["depth"]);
        assert_eq!(skill.tags, vec!["docs"]);
        assert_eq!(skill.template, "Explain {user_input} at {depth} depth.");
    }

    #[test]
    fn render_expands_placeholders() {
        let skill = parse_skill_markdown(SAMPLE, "explain.md").unwrap();
        let mut vars = HashMap::new();
        vars.insert("depth".to_owned(), "expert".to_owned());
        assert_eq!(
            skill.render("the parser", &vars),
            "Explain the parser at expert depth."
        );
    }

    #[test]
    fn unknown_placeholders_stay_literal() {
        let skill = parse_skill_markdown(SAMPLE, "explain.md").unwrap();
        assert_eq!(
            skill.render("x", &HashMap::new()),
            "Explain x at {depth} depth."
        );
    }

    #[test]
    fn missing_frontmatter_rejected() {
        assert!(matches!(
            parse_skill_markdown("no frontmatter", "x.md"),
            Err(DefinitionError::NoFrontmatter)
        ));
    }

    #[test]
    fn empty_name_rejected() {
        assert!(matches!(
            parse_skill_markdown("---\ndescription: d\n---\nbody", "x.md"),
            Err(DefinitionError::MissingName)
        ));
    }
}
