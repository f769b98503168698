//! Unified-diff patch application, used by the `patch` tool.
//!
//! Parses the subset of unified diff format produced by `similar`'s
//! `unified_diff()` (and by `git diff`/`diff -u`): one or more `@@ -a,b
//! +c,d @@` hunks, each followed by context/` `, removed/`-`, and
//! added/`+` lines.

use serde::Deserialize;
use serde_json::{json, Value};

use kory_domain::change::ChangeOperation;

use crate::context::{ToolContext, ToolRole};
use crate::file_ops::{self, FileWriteRequest};
use crate::fs_tools::record_write;
use crate::registry::Tool;

const WORKER_AND_MANAGER: &[ToolRole] = &[ToolRole::Manager, ToolRole::Worker];

#[derive(Debug)]
struct Hunk {
    old_start: usize,
    lines: Vec<(char, String)>,
}

fn parse_hunks(diff: &str) -> Result<Vec<Hunk>, String> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("@@ ") {
            if let Some(h) = current.take() {
                hunks.push(h);
            }
            let header = rest.split(" @@").next().unwrap_or(rest);
            let old_part = header
                .split_whitespace()
                .find(|p| p.starts_with('-'))
                .ok_or_else(|| format!("malformed hunk header: {line}"))?;
            let old_start: usize = old_part
                .trim_start_matches('-')
                .split(',')
                .next()
                .unwrap_or("1")
                .parse()
                .map_err(|_| format!("malformed hunk header: {line}"))?;
            current = Some(Hunk { old_start: old_start.saturating_sub(1), lines: Vec::new() });
            continue;
        }
        if line.starts_with("---") || line.starts_with("+++") {
            continue;
        }
        if let Some(hunk) = current.as_mut() {
            if let Some(content) = line.strip_prefix('+') {
                hunk.lines.push(('+', content.to_string()));
            } else if let Some(content) = line.strip_prefix('-') {
                hunk.lines.push(('-', content.to_string()));
            } else {
                let content = line.strip_prefix(' ').unwrap_or(line);
                hunk.lines.push((' ', content.to_string()));
            }
        }
    }
    if let Some(h) = current.take() {
        hunks.push(h);
    }
    if hunks.is_empty() {
        return Err("diff contains no hunks".to_string());
    }
    Ok(hunks)
}

/// Apply a unified diff to `original`, returning the patched text.
pub fn apply_unified_diff(original: &str, diff: &str) -> Result<String, String> {
    let hunks = parse_hunks(diff)?;
    let original_lines: Vec<&str> = original.lines().collect();
    let mut result: Vec<String> = Vec::new();
    let mut cursor = 0usize;

    for hunk in hunks {
        if hunk.old_start < cursor {
            return Err("hunks are out of order or overlapping".to_string());
        }
        // Copy untouched lines before this hunk.
        while cursor < hunk.old_start {
            result.push(original_lines.get(cursor).map(|s| s.to_string()).unwrap_or_default());
            cursor += 1;
        }
        for (tag, content) in &hunk.lines {
            match tag {
                ' ' => {
                    let actual = original_lines.get(cursor).copied().unwrap_or("");
                    if actual != content {
                        return Err(format!(
                            "context mismatch at line {}: expected '{content}', found '{actual}'",
                            cursor + 1
                        ));
                    }
                    result.push(content.clone());
                    cursor += 1;
                }
                '-' => {
                    let actual = original_lines.get(cursor).copied().unwrap_or("");
                    if actual != content {
                        return Err(format!(
                            "removal mismatch at line {}: expected '{content}', found '{actual}'",
                            cursor + 1
                        ));
                    }
                    cursor += 1;
                }
                '+' => {
                    result.push(content.clone());
                }
                _ => unreachable!(),
            }
        }
    }
    while cursor < original_lines.len() {
        result.push(original_lines[cursor].to_string());
        cursor += 1;
    }

    let mut text = result.join("\n");
    if original.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchFileRequest {
    pub path: String,
    /// Unified diff text (`@@ -a,b +c,d @@` hunks) to apply against the file.
    pub diff: String,
}

pub struct PatchFileTool;

#[async_trait::async_trait]
impl Tool for PatchFileTool {
    fn name(&self) -> &'static str {
        "patch_file"
    }
    fn description(&self) -> &'static str {
        "Apply a unified diff patch to a file."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "diff": {"type": "string"}},
            "required": ["path", "diff"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: PatchFileRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let root = ctx.sandbox_root();
        let path = file_ops::validate_path(root, &req.path)?;
        let before = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

        let after = apply_unified_diff(&before, &req.diff)?;

        file_ops::file_write(root, FileWriteRequest { path: req.path.clone(), content: after.clone() }).await?;
        record_write(ctx, &req.path, &before, &after, ChangeOperation::Edit);

        Ok(json!({"path": req.path, "success": true}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_simple_hunk() {
        let original = "line1\nline2\nline3\n";
        let diff = "@@ -1,3 +1,3 @@\n line1\n-line2\n+line2 modified\n line3\n";
        let patched = apply_unified_diff(original, diff).unwrap();
        assert_eq!(patched, "line1\nline2 modified\nline3\n");
    }

    #[test]
    fn rejects_context_mismatch() {
        let original = "a\nb\nc\n";
        let diff = "@@ -1,3 +1,3 @@\n a\n-z\n+y\n c\n";
        assert!(apply_unified_diff(original, diff).is_err());
    }
}
