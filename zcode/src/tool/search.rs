//! Search tools: `glob` and `grep`.
//!
//! Both walk the tree themselves so they can enforce the shared skip rules:
//! hidden directories and common vendor/build directories are never entered,
//! so their contents can never appear in results.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::Pattern;
use regex::RegexBuilder;
use serde_json::{Value, json};

use super::{Tool, ToolArgs, ToolOutput, optional_str, required_str};

const GLOB_MATCH_CAP: usize = 100;
const GREP_MATCH_CAP: usize = 50;
const GREP_LINE_CAP: usize = 200;

/// Directories that are never entered by the search tools.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "__pycache__",
    ".git",
    "dist",
    "build",
];

/// File extensions treated as binary and never grepped.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "pdf", "zip", "tar", "gz", "bz2", "xz", "7z",
    "exe", "bin", "so", "dylib", "dll", "a", "o", "class", "jar", "woff", "woff2", "ttf", "otf",
    "mp3", "mp4", "avi", "mov", "wasm", "db", "sqlite",
];

fn skip_dir(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

fn is_binary(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            BINARY_EXTENSIONS
                .iter()
                .any(|b| b.eq_ignore_ascii_case(ext))
        })
}

/// Walk `root`, yielding files, without entering skipped directories.
fn walk_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);
    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            if !skip_dir(&name) {
                walk_files(&path, out);
            }
        } else {
            out.push(path);
        }
    }
}

/// `glob`: find files matching a glob pattern.
///
/// The pattern is tested against both the file's base name and its path
/// relative to the search root, so `*.rs` and `src/**/*.rs` both behave
/// as agents expect.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (supports ** recursion)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern, e.g. '**/*.rs'."},
                "path": {"type": "string", "description": "Directory to search (default: current)."}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutput {
        let pattern_text = match required_str(args, "pattern") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let root = PathBuf::from(optional_str(args, "path").unwrap_or("."));

        let pattern = match Pattern::new(pattern_text) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(format!("invalid glob pattern: {e}")),
        };

        let mut files = Vec::new();
        walk_files(&root, &mut files);

        let mut matches = Vec::new();
        let mut truncated = false;
        for path in files {
            let relative = path.strip_prefix(&root).unwrap_or(&path);
            let base = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if pattern.matches(&base) || pattern.matches(&relative.to_string_lossy()) {
                if matches.len() == GLOB_MATCH_CAP {
                    truncated = true;
                    break;
                }
                matches.push(relative.display().to_string());
            }
        }

        if matches.is_empty() {
            return ToolOutput::ok(format!("no files match {pattern_text}"));
        }
        let mut output = matches.join("\n");
        if truncated {
            output.push_str("\n…");
        }
        ToolOutput::ok(output)
    }
}

/// `grep`: search file contents by regex, falling back to literal search.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Invalid patterns fall back to literal search."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression to search for."},
                "path": {"type": "string", "description": "Directory to search (default: current)."},
                "glob": {"type": "string", "description": "Only search files whose name matches this glob."},
                "case_insensitive": {"type": "boolean", "description": "Match case-insensitively."}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutput {
        let pattern_text = match required_str(args, "pattern") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let root = PathBuf::from(optional_str(args, "path").unwrap_or("."));
        let case_insensitive = args
            .get("case_insensitive")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let name_filter = match optional_str(args, "glob") {
            Some(g) => match Pattern::new(g) {
                Ok(p) => Some(p),
                Err(e) => return ToolOutput::err(format!("invalid glob filter: {e}")),
            },
            None => None,
        };

        // Compile as regex; on a syntax error fall back to literal search.
        let (regex, literal_fallback) = match RegexBuilder::new(pattern_text)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(re) => (re, false),
            Err(_) => {
                let escaped = regex::escape(pattern_text);
                match RegexBuilder::new(&escaped)
                    .case_insensitive(case_insensitive)
                    .build()
                {
                    Ok(re) => (re, true),
                    Err(e) => return ToolOutput::err(format!("invalid pattern: {e}")),
                }
            }
        };

        let mut files = Vec::new();
        walk_files(&root, &mut files);

        let mut lines_out = Vec::new();
        let mut truncated = false;
        'files: for path in files {
            if is_binary(&path) {
                continue;
            }
            if let Some(filter) = &name_filter {
                let base = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !filter.matches(&base) {
                    continue;
                }
            }
            // Files that cannot be opened or read (permissions, invalid
            // UTF-8 mid-stream) are skipped, not errors.
            let Ok(file) = File::open(&path) else {
                continue;
            };
            let relative = path.strip_prefix(&root).unwrap_or(&path).to_path_buf();
            let mut reader = BufReader::new(file);
            let mut line_no = 0usize;
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(_) => continue 'files,
                }
                line_no += 1;
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if regex.is_match(line) {
                    if lines_out.len() == GREP_MATCH_CAP {
                        truncated = true;
                        break 'files;
                    }
                    let shown: String = line.chars().take(GREP_LINE_CAP).collect();
                    lines_out.push(format!("{}:{line_no}: {shown}", relative.display()));
                }
            }
        }

        if lines_out.is_empty() {
            return ToolOutput::ok(format!("no matches for {pattern_text}"));
        }
        let mut output = String::new();
        if literal_fallback {
            output.push_str("(pattern is not a valid regex; searched literally)\n");
        }
        output.push_str(&lines_out.join("\n"));
        if truncated {
            output.push_str("\n…");
        }
        ToolOutput::ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap_or_default()
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/inner")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("src/inner/lib.rs"), "pub fn lib() {}\n").unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x\n").unwrap();
        fs::write(dir.path().join(".hidden/secret.rs"), "fn hidden() {}\n").unwrap();
        fs::write(dir.path().join("README.md"), "hello grep\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn glob_matches_recursively() {
        let dir = tree();
        let out = GlobTool
            .execute(&args(json!({
                "pattern": "**/*.rs",
                "path": dir.path().display().to_string()
            })))
            .await;
        assert!(out.success);
        assert!(out.output.contains("src/main.rs"));
        assert!(out.output.contains("src/inner/lib.rs"));
        assert!(!out.output.contains(".hidden"));
        assert!(!out.output.contains("node_modules"));
    }

    #[tokio::test]
    async fn glob_matches_base_name() {
        let dir = tree();
        let out = GlobTool
            .execute(&args(json!({
                "pattern": "*.rs",
                "path": dir.path().display().to_string()
            })))
            .await;
        // Base-name matching finds nested .rs files even without `**`.
        assert!(out.output.contains("main.rs"));
    }

    #[tokio::test]
    async fn glob_caps_output() {
        let dir = TempDir::new().unwrap();
        for i in 0..150 {
            fs::write(dir.path().join(format!("f{i:03}.txt")), "").unwrap();
        }
        let out = GlobTool
            .execute(&args(json!({
                "pattern": "*.txt",
                "path": dir.path().display().to_string()
            })))
            .await;
        let lines = out.output.lines().count();
        assert_eq!(lines, GLOB_MATCH_CAP + 1);
        assert!(out.output.ends_with('…'));
    }

    #[tokio::test]
    async fn grep_finds_matches_with_location() {
        let dir = tree();
        let out = GrepTool
            .execute(&args(json!({
                "pattern": "fn \\w+",
                "path": dir.path().display().to_string()
            })))
            .await;
        assert!(out.success);
        assert!(out.output.contains("src/main.rs:1:"));
        assert!(!out.output.contains(".hidden"));
        assert!(!out.output.contains("node_modules"));
    }

    #[tokio::test]
    async fn grep_invalid_regex_falls_back_to_literal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "value [unclosed\n").unwrap();
        let out = GrepTool
            .execute(&args(json!({
                "pattern": "[unclosed",
                "path": dir.path().display().to_string()
            })))
            .await;
        assert!(out.success);
        assert!(out.output.starts_with("(pattern is not a valid regex"));
        assert!(out.output.contains("a.txt:1:"));
    }

    #[tokio::test]
    async fn grep_case_insensitive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "Hello World\n").unwrap();
        let out = GrepTool
            .execute(&args(json!({
                "pattern": "hello",
                "path": dir.path().display().to_string(),
                "case_insensitive": true
            })))
            .await;
        assert!(out.output.contains("a.txt:1:"));
    }

    #[tokio::test]
    async fn grep_truncates_long_lines() {
        let dir = TempDir::new().unwrap();
        let long = format!("needle {}", "x".repeat(5000));
        fs::write(dir.path().join("long.txt"), long).unwrap();
        let out = GrepTool
            .execute(&args(json!({
                "pattern": "needle",
                "path": dir.path().display().to_string()
            })))
            .await;
        let line = out.output.lines().next().unwrap();
        assert!(line.chars().count() <= GREP_LINE_CAP + "long.txt:1: ".len());
    }

    #[tokio::test]
    async fn grep_handles_huge_lines() {
        let dir = TempDir::new().unwrap();
        // A single line of 1 MiB must not break the scanner.
        let huge = format!("{}needle", "y".repeat(1024 * 1024));
        fs::write(dir.path().join("huge.txt"), huge).unwrap();
        let out = GrepTool
            .execute(&args(json!({
                "pattern": "needle",
                "path": dir.path().display().to_string()
            })))
            .await;
        assert!(out.output.contains("huge.txt:1:"));
    }

    #[tokio::test]
    async fn grep_skips_binary_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("image.png"), "needle\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "needle\n").unwrap();
        let out = GrepTool
            .execute(&args(json!({
                "pattern": "needle",
                "path": dir.path().display().to_string()
            })))
            .await;
        assert!(out.output.contains("notes.txt"));
        assert!(!out.output.contains("image.png"));
    }

    #[tokio::test]
    async fn grep_glob_filter_restricts_files() {
        let dir = tree();
        let out = GrepTool
            .execute(&args(json!({
                "pattern": "hello",
                "path": dir.path().display().to_string(),
                "glob": "*.md"
            })))
            .await;
        assert!(out.output.contains("README.md"));
    }
}
