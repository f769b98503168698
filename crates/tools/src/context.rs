//! Per-call execution context handed to every tool invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use kory_bus::EventBus;
use kory_domain::change::ChangeSummary;
use kory_prompts::PendingPromptTable;

/// Which caller is invoking a tool — gates which tools are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolRole {
    /// The orchestrator itself (unsandboxed, full filesystem access).
    Manager,
    /// A complex-path domain worker (sandboxed to its workdir).
    Worker,
}

/// Callbacks a tool uses to report filesystem edits as they happen.
pub trait ToolSink: Send + Sync {
    fn emit_file_edit(&self, path: &str, delta: &str, total_length: usize, operation: &str);
    fn emit_file_complete(&self, path: &str, total_lines: usize, operation: &str);
    fn record_change(&self, change: ChangeSummary);
}

/// A no-op sink, useful for tests and for tools that never touch files.
pub struct NullSink;

impl ToolSink for NullSink {
    fn emit_file_edit(&self, _path: &str, _delta: &str, _total_length: usize, _operation: &str) {}
    fn emit_file_complete(&self, _path: &str, _total_lines: usize, _operation: &str) {}
    fn record_change(&self, _change: ChangeSummary) {}
}

/// Everything a `Tool::run` needs besides its own input.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub workdir: PathBuf,
    pub is_sandboxed: bool,
    pub allowed_paths: Vec<PathBuf>,
    pub cancellation: CancellationToken,
    pub timeout: Duration,
    pub sink: Arc<dyn ToolSink>,
    /// Wired in when the `ask_user`/`ask_manager` tools are registered.
    pub prompts: Option<Arc<PendingPromptTable>>,
    pub bus: Option<Arc<EventBus>>,
}

impl ToolContext {
    /// Context for a sandboxed complex-path worker, confined to its workdir.
    pub fn for_worker(session_id: impl Into<String>, workdir: PathBuf, timeout: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            allowed_paths: vec![workdir.clone()],
            workdir,
            is_sandboxed: true,
            cancellation: CancellationToken::new(),
            timeout,
            sink: Arc::new(NullSink),
            prompts: None,
            bus: None,
        }
    }

    /// Context for the Manager itself — unsandboxed, full filesystem access.
    pub fn for_manager(session_id: impl Into<String>, workdir: PathBuf, timeout: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            allowed_paths: vec![PathBuf::from("/")],
            workdir,
            is_sandboxed: false,
            cancellation: CancellationToken::new(),
            timeout,
            sink: Arc::new(NullSink),
            prompts: None,
            bus: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ToolSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<PendingPromptTable>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The root a sandboxed tool must confine path resolution to.
    ///
    /// Manager contexts are never sandboxed, so callers should check
    /// `is_sandboxed` before relying on this for enforcement.
    pub fn sandbox_root(&self) -> &Path {
        self.allowed_paths.first().unwrap_or(&self.workdir)
    }
}
