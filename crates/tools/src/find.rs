//! Recursive glob and content-grep tools.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::{ToolContext, ToolRole};
use crate::registry::Tool;

const WORKER_AND_MANAGER: &[ToolRole] = &[ToolRole::Manager, ToolRole::Worker];

fn contains_within(root: &Path, path: &Path) -> bool {
    path.canonicalize().map(|p| p.starts_with(root)).unwrap_or(false)
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobRequest {
    /// Glob pattern relative to the workspace root, e.g. `"**/*.rs"`.
    pub pattern: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct GlobTool;

#[async_trait::async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }
    fn description(&self) -> &'static str {
        "Find files matching a glob pattern, rooted at the workspace root."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"pattern": {"type": "string"}, "limit": {"type": "integer"}},
            "required": ["pattern"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: GlobRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let root = ctx
            .sandbox_root()
            .canonicalize()
            .map_err(|e| format!("cannot resolve workspace root: {e}"))?;
        let full_pattern = root.join(&req.pattern);
        let limit = req.limit.unwrap_or(500);

        let mut matches = Vec::new();
        for entry in glob::glob(&full_pattern.to_string_lossy())
            .map_err(|e| format!("invalid glob pattern '{}': {e}", req.pattern))?
        {
            let path = entry.map_err(|e| e.to_string())?;
            if ctx.is_sandboxed && !contains_within(&root, &path) {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(&root) {
                matches.push(rel.to_string_lossy().replace('\\', "/"));
            }
            if matches.len() >= limit {
                break;
            }
        }
        matches.sort();

        Ok(json!({"matches": matches, "count": matches.len()}))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrepRequest {
    pub pattern: String,
    #[serde(default = "default_dot")]
    pub path: String,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub max_matches: Option<usize>,
}

fn default_dot() -> String {
    ".".into()
}

#[derive(Debug, Clone, serde::Serialize)]
struct GrepHit {
    path: String,
    line: usize,
    text: String,
}

pub struct GrepTool;

#[async_trait::async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }
    fn description(&self) -> &'static str {
        "Search file contents recursively for a regex pattern."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "path": {"type": "string", "default": "."},
                "case_insensitive": {"type": "boolean", "default": false},
                "max_matches": {"type": "integer"},
            },
            "required": ["pattern"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: GrepRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let root = ctx
            .sandbox_root()
            .canonicalize()
            .map_err(|e| format!("cannot resolve workspace root: {e}"))?;
        let start = root.join(&req.path);
        if ctx.is_sandboxed && !contains_within(&root, &start) {
            return Err(format!("path '{}' escapes the workspace root", req.path));
        }

        let pattern = if req.case_insensitive {
            format!("(?i){}", req.pattern)
        } else {
            req.pattern.clone()
        };
        let re = Regex::new(&pattern).map_err(|e| format!("invalid regex '{}': {e}", req.pattern))?;
        let limit = req.max_matches.unwrap_or(200);

        let mut hits = Vec::new();
        walk(&start, &root, ctx.is_sandboxed, &mut |file_path| {
            if hits.len() >= limit {
                return;
            }
            let Ok(content) = std::fs::read_to_string(file_path) else { return };
            let rel = file_path.strip_prefix(&root).unwrap_or(file_path).to_string_lossy().replace('\\', "/");
            for (idx, line) in content.lines().enumerate() {
                if hits.len() >= limit {
                    break;
                }
                if re.is_match(line) {
                    hits.push(GrepHit { path: rel.clone(), line: idx + 1, text: line.to_string() });
                }
            }
        });

        Ok(json!({"matches": hits, "count": hits.len()}))
    }
}

fn walk(dir: &Path, root: &Path, sandboxed: bool, on_file: &mut impl FnMut(&Path)) {
    let Ok(metadata) = std::fs::metadata(dir) else { return };
    if metadata.is_file() {
        on_file(dir);
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if sandboxed && !contains_within(root, &path) {
            continue;
        }
        if path.is_dir() {
            if path.file_name().map(|n| n == ".git" || n == "target").unwrap_or(false) {
                continue;
            }
            walk(&path, root, sandboxed, on_file);
        } else {
            on_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(root: &Path) -> ToolContext {
        ToolContext::for_worker("s1", root.to_path_buf(), std::time::Duration::from_secs(5))
    }

    #[tokio::test]
    async fn glob_finds_rust_files() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("src")).unwrap();
        std::fs::write(ws.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(ws.path().join("README.md"), "hi").unwrap();

        let result = GlobTool.run(&ctx(ws.path()), json!({"pattern": "**/*.rs"})).await.unwrap();
        let matches = result["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].as_str().unwrap().ends_with("main.rs"));
    }

    #[tokio::test]
    async fn grep_finds_matching_lines() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("a.txt"), "hello\nworld\nhello again\n").unwrap();

        let result = GrepTool.run(&ctx(ws.path()), json!({"pattern": "hello"})).await.unwrap();
        assert_eq!(result["count"], 2);
    }
}
