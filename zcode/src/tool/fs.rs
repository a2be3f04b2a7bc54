//! Filesystem tools: `read_file`, `list_dir`, `write_file`, `edit_file`.
//!
//! The write-side tools hold an optional confirmation callback and consult
//! it with a short preview before touching the filesystem.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ConfirmFn, Tool, ToolArgs, ToolOutput, optional_str, required_str};

const WRITE_PREVIEW_LEN: usize = 200;

/// `read_file`: return the contents of a file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to read."}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutput {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        match fs::read_to_string(path) {
            Ok(contents) => ToolOutput::ok(contents),
            Err(e) => ToolOutput::err(format!("failed to read {path}: {e}")),
        }
    }
}

/// `list_dir`: list directory entries, directories suffixed with `/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories are suffixed with '/'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list (default: current)."}
            },
            "required": []
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutput {
        let path = optional_str(args, "path").unwrap_or(".");
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => return ToolOutput::err(format!("failed to list {path}: {e}")),
        };

        let mut names = Vec::new();
        for entry in entries.flatten() {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        ToolOutput::ok(names.join("\n"))
    }
}

/// `write_file`: create or overwrite a file, with confirmation.
#[derive(Clone)]
pub struct WriteFileTool {
    confirm: Option<ConfirmFn>,
}

impl std::fmt::Debug for WriteFileTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteFileTool")
            .field("confirm", &self.confirm.is_some())
            .finish()
    }
}

impl WriteFileTool {
    /// Create the tool with an optional confirmation callback.
    #[must_use]
    pub const fn new(confirm: Option<ConfirmFn>) -> Self {
        Self { confirm }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it if needed and overwriting it otherwise."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to write."},
                "content": {"type": "string", "description": "Content to write."}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutput {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let content = match required_str(args, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };

        if let Some(confirm) = &self.confirm {
            let preview: String = content.chars().take(WRITE_PREVIEW_LEN).collect();
            let ellipsis = if content.len() > preview.len() { "…" } else { "" };
            let prompt = format!("write {} bytes to {path}:\n{preview}{ellipsis}", content.len());
            if !confirm(&prompt) {
                return crate::error::ToolError::Denied("user denied write permission".to_owned())
                    .into();
            }
        }

        if let Err(e) = fs::write(path, content) {
            return ToolOutput::err(format!("failed to write {path}: {e}"));
        }
        set_default_mode(Path::new(path));
        ToolOutput::ok(format!("wrote {} bytes to {path}", content.len()))
    }
}

/// `edit_file`: replace exactly one occurrence of a string in a file.
#[derive(Clone)]
pub struct EditFileTool {
    confirm: Option<ConfirmFn>,
}

impl std::fmt::Debug for EditFileTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditFileTool")
            .field("confirm", &self.confirm.is_some())
            .finish()
    }
}

impl EditFileTool {
    /// Create the tool with an optional confirmation callback.
    #[must_use]
    pub const fn new(confirm: Option<ConfirmFn>) -> Self {
        Self { confirm }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace a unique occurrence of old_string with new_string in a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to edit."},
                "old_string": {"type": "string", "description": "Exact text to replace. Must occur exactly once."},
                "new_string": {"type": "string", "description": "Replacement text."}
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutput {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let old_string = match required_str(args, "old_string") {
            Ok(s) => s,
            Err(e) => return e,
        };
        let new_string = match required_str(args, "new_string") {
            Ok(s) => s,
            Err(e) => return e,
        };

        if old_string == new_string {
            return ToolOutput::err("old_string and new_string are identical");
        }

        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(format!("failed to read {path}: {e}")),
        };

        let occurrences = contents.matches(old_string).count();
        match occurrences {
            0 => return ToolOutput::err(format!("old_string not found in {path}")),
            1 => {}
            n => {
                return ToolOutput::err(format!(
                    "old_string occurs {n} times in {path}; it must be unique"
                ));
            }
        }

        if let Some(confirm) = &self.confirm {
            let prompt = format!("edit {path}:\n- {old_string}\n+ {new_string}");
            if !confirm(&prompt) {
                return crate::error::ToolError::Denied("user denied edit permission".to_owned())
                    .into();
            }
        }

        // Capture permissions before writing so the edit never changes them.
        let permissions = fs::metadata(path).ok().map(|m| m.permissions());

        let updated = contents.replacen(old_string, new_string, 1);
        if let Err(e) = fs::write(path, updated) {
            return ToolOutput::err(format!("failed to write {path}: {e}"));
        }
        if let Some(perms) = permissions
            && let Err(e) = fs::set_permissions(path, perms)
        {
            return ToolOutput::err(format!("failed to restore permissions on {path}: {e}"));
        }
        ToolOutput::ok(format!("edited {path}"))
    }
}

/// Set 0644 on freshly written files where the platform supports it.
fn set_default_mode(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o644));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
