//! `Tool` wrappers around [`crate::file_ops`], adding change-tracking and
//! file-stream events on top of the raw, path-validated primitives.

use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};

use kory_domain::change::{ChangeOperation, ChangeSummary};

use crate::context::{ToolContext, ToolRole};
use crate::file_ops::{
    self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest, FileReadRequest,
    FileWriteRequest,
};
use crate::registry::Tool;

const WORKER_AND_MANAGER: &[ToolRole] = &[ToolRole::Manager, ToolRole::Worker];

/// Line additions/deletions between two file contents (empty string = absent file).
fn diff_counts(before: &str, after: &str) -> (u32, u32) {
    let diff = TextDiff::from_lines(before, after);
    let mut added = 0u32;
    let mut deleted = 0u32;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => deleted += 1,
            ChangeTag::Equal => {}
        }
    }
    (added, deleted)
}

async fn read_before(root: &Path, path: &str) -> String {
    let full = root.join(path);
    tokio::fs::read_to_string(&full).await.unwrap_or_default()
}

pub(crate) fn record_write(ctx: &ToolContext, path: &str, before: &str, after: &str, operation: ChangeOperation) {
    let (lines_added, lines_deleted) = diff_counts(before, after);
    ctx.sink.emit_file_edit(path, after, after.len(), operation_str(operation));
    ctx.sink.emit_file_complete(path, after.lines().count(), operation_str(operation));
    ctx.sink.record_change(ChangeSummary {
        session_id: ctx.session_id.clone(),
        path: path.to_owned(),
        operation,
        lines_added,
        lines_deleted,
        timestamp: Utc::now(),
    });
}

fn operation_str(op: ChangeOperation) -> &'static str {
    match op {
        ChangeOperation::Create => "create",
        ChangeOperation::Edit => "edit",
        ChangeOperation::Delete => "delete",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read_file / list_files — read-only, no change tracking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReadFileTool;

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }
    fn description(&self) -> &'static str {
        "Read a file's contents, optionally from a line offset with a line limit."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "offset": {"type": "integer"},
                "limit": {"type": "integer"},
            },
            "required": ["path"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: FileReadRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        file_ops::file_read(ctx.sandbox_root(), req).await
    }
}

pub struct ListFilesTool;

#[async_trait::async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list_files"
    }
    fn description(&self) -> &'static str {
        "List a directory's entries with size and modification time."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string", "default": "."}},
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: FileListRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        file_ops::file_list(ctx.sandbox_root(), req).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// write_file / delete_file / move_file — write-class, change-tracked
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WriteFileTool;

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }
    fn description(&self) -> &'static str {
        "Create or overwrite a file with the given content."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
            "required": ["path", "content"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: FileWriteRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let root = ctx.sandbox_root();
        let before = read_before(root, &req.path).await;
        let existed = root.join(&req.path).exists();
        let after = req.content.clone();
        let result = file_ops::file_write(root, req.clone()).await?;
        record_write(
            ctx,
            &req.path,
            &before,
            &after,
            if existed { ChangeOperation::Edit } else { ChangeOperation::Create },
        );
        Ok(result)
    }
}

pub struct AppendFileTool;

#[async_trait::async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &'static str {
        "append_file"
    }
    fn description(&self) -> &'static str {
        "Append content to an existing (or new) file."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
            "required": ["path", "content"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: FileAppendRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let root = ctx.sandbox_root();
        let before = read_before(root, &req.path).await;
        let existed = root.join(&req.path).exists();
        let result = file_ops::file_append(root, req.clone()).await?;
        let after = read_before(root, &req.path).await;
        record_write(
            ctx,
            &req.path,
            &before,
            &after,
            if existed { ChangeOperation::Edit } else { ChangeOperation::Create },
        );
        Ok(result)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditFileRequest {
    pub path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

pub struct EditFileTool;

#[async_trait::async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }
    fn description(&self) -> &'static str {
        "Replace an exact substring match within a file (optionally all occurrences)."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "old_string": {"type": "string"},
                "new_string": {"type": "string"},
                "replace_all": {"type": "boolean", "default": false},
            },
            "required": ["path", "old_string", "new_string"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: EditFileRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let root = ctx.sandbox_root();
        let path = file_ops::validate_path(root, &req.path)?;
        let before = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

        let occurrences = before.matches(req.old_string.as_str()).count();
        if occurrences == 0 {
            return Err(format!("old_string not found in '{}'", req.path));
        }
        if !req.replace_all && occurrences > 1 {
            return Err(format!(
                "old_string matches {occurrences} times in '{}'; pass replace_all or narrow the match",
                req.path
            ));
        }

        let after = if req.replace_all {
            before.replace(&req.old_string, &req.new_string)
        } else {
            before.replacen(&req.old_string, &req.new_string, 1)
        };

        file_ops::file_write(
            root,
            FileWriteRequest { path: req.path.clone(), content: after.clone() },
        )
        .await?;

        record_write(ctx, &req.path, &before, &after, ChangeOperation::Edit);

        Ok(json!({"path": req.path, "replacements": if req.replace_all { occurrences } else { 1 }}))
    }
}

pub struct DeleteFileTool;

#[async_trait::async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &'static str {
        "delete_file"
    }
    fn description(&self) -> &'static str {
        "Delete a file or empty directory."
    }
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]})
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: FileDeleteRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let root = ctx.sandbox_root();
        let before = read_before(root, &req.path).await;
        let result = file_ops::file_delete(root, req.clone()).await?;
        record_write(ctx, &req.path, &before, "", ChangeOperation::Delete);
        Ok(result)
    }
}

pub struct MoveFileTool;

#[async_trait::async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &'static str {
        "move_file"
    }
    fn description(&self) -> &'static str {
        "Move or rename a file."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"source": {"type": "string"}, "destination": {"type": "string"}},
            "required": ["source", "destination"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        WORKER_AND_MANAGER
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: FileMoveRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let root = ctx.sandbox_root();
        let content = read_before(root, &req.source).await;
        let result = file_ops::file_move(root, req.clone()).await?;
        record_write(ctx, &req.source, &content, "", ChangeOperation::Delete);
        record_write(ctx, &req.destination, "", &content, ChangeOperation::Create);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ToolSink, NullSink};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        changes: Mutex<Vec<ChangeSummary>>,
    }

    impl ToolSink for RecordingSink {
        fn emit_file_edit(&self, _path: &str, _delta: &str, _total_length: usize, _operation: &str) {}
        fn emit_file_complete(&self, _path: &str, _total_lines: usize, _operation: &str) {}
        fn record_change(&self, change: ChangeSummary) {
            self.changes.lock().unwrap().push(change);
        }
    }

    fn ctx(root: &Path, sink: Arc<dyn ToolSink>) -> ToolContext {
        ToolContext::for_worker("s1", root.to_path_buf(), std::time::Duration::from_secs(5)).with_sink(sink)
    }

    #[tokio::test]
    async fn write_new_file_records_create() {
        let ws = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let c = ctx(ws.path(), sink.clone());

        WriteFileTool
            .run(&c, json!({"path": "a.txt", "content": "hello\nworld\n"}))
            .await
            .unwrap();

        let changes = sink.changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].operation, ChangeOperation::Create);
        assert_eq!(changes[0].lines_added, 2);
    }

    #[tokio::test]
    async fn edit_file_replaces_unique_match() {
        let ws = TempDir::new().unwrap();
        let sink: Arc<dyn ToolSink> = Arc::new(NullSink);
        let c = ctx(ws.path(), sink);
        std::fs::write(ws.path().join("a.txt"), "foo bar\n").unwrap();

        let result = EditFileTool
            .run(&c, json!({"path": "a.txt", "old_string": "bar", "new_string": "baz"}))
            .await
            .unwrap();

        assert_eq!(result["replacements"], 1);
        let content = std::fs::read_to_string(ws.path().join("a.txt")).unwrap();
        assert_eq!(content, "foo baz\n");
    }

    #[tokio::test]
    async fn edit_file_rejects_ambiguous_match() {
        let ws = TempDir::new().unwrap();
        let sink: Arc<dyn ToolSink> = Arc::new(NullSink);
        let c = ctx(ws.path(), sink);
        std::fs::write(ws.path().join("a.txt"), "foo foo\n").unwrap();

        let result = EditFileTool
            .run(&c, json!({"path": "a.txt", "old_string": "foo", "new_string": "bar"}))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_file_records_delete() {
        let ws = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let c = ctx(ws.path(), sink.clone());
        std::fs::write(ws.path().join("a.txt"), "bye\n").unwrap();

        DeleteFileTool.run(&c, json!({"path": "a.txt"})).await.unwrap();

        let changes = sink.changes.lock().unwrap();
        assert_eq!(changes[0].operation, ChangeOperation::Delete);
    }
}
