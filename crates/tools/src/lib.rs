//! Tool Registry & Execution (C5).
//!
//! A tool has a stable name, a JSON-schema input definition, an allowed
//! caller-role set, and an async `run(ctx, input)`. Sandboxed (worker)
//! calls are confined to their workdir; the Manager runs unsandboxed.
//! `ToolContext` carries the session id, sandbox root, cancellation
//! signal, change/event callbacks, and (for the interaction tools) the
//! pending-prompt table and event bus.

use std::sync::Arc;
use std::time::Duration;

pub mod context;
pub mod exec;
pub mod file_ops;
pub mod find;
pub mod fs_tools;
pub mod interaction;
pub mod manager;
pub mod patch;
pub mod process;
pub mod registry;
pub mod security;
pub mod shell;
pub mod web;

pub use context::{ToolContext, ToolRole, ToolSink};
pub use manager::ProcessManager;
pub use registry::{Tool, ToolOutcome, ToolRegistry};

use kory_domain::config::{ExecConfig, ExecSecurityConfig};

/// Timeout `ask_user`/`ask_manager` wait for a correlated reply before
/// treating the prompt as abandoned.
pub const DEFAULT_ASK_TIMEOUT: Duration = kory_prompts::DEFAULT_TIMEOUT;

/// Build a registry with every required built-in tool registered.
///
/// Returns the shared `ProcessManager` too, so the caller can wire it into
/// a `process`-only admin surface if it needs one outside tool calls.
pub fn build_registry(exec_config: ExecConfig, security_config: ExecSecurityConfig) -> (ToolRegistry, Arc<ProcessManager>) {
    let manager = Arc::new(ProcessManager::new(exec_config));
    let mut registry = ToolRegistry::new();

    registry
        .register(fs_tools::ReadFileTool)
        .register(fs_tools::ListFilesTool)
        .register(fs_tools::WriteFileTool)
        .register(fs_tools::AppendFileTool)
        .register(fs_tools::EditFileTool)
        .register(fs_tools::DeleteFileTool)
        .register(fs_tools::MoveFileTool)
        .register(patch::PatchFileTool)
        .register(find::GlobTool)
        .register(find::GrepTool)
        .register(web::WebFetchTool)
        .register(web::WebSearchTool)
        .register(interaction::AskUserTool)
        .register(interaction::AskManagerTool)
        .register(shell::ShellExecTool { manager: manager.clone(), security: security_config })
        .register(shell::ProcessControlTool { manager: manager.clone() });

    (registry, manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kory_domain::tool::ToolCall;

    #[tokio::test]
    async fn registry_advertises_role_gated_defs() {
        let (registry, _manager) = build_registry(ExecConfig::default(), ExecSecurityConfig::default());

        let worker_defs = registry.defs_for_role(ToolRole::Worker);
        let manager_defs = registry.defs_for_role(ToolRole::Manager);

        assert!(worker_defs.iter().any(|d| d.name == "write_file"));
        assert!(worker_defs.iter().any(|d| d.name == "ask_manager"));
        assert!(!manager_defs.iter().any(|d| d.name == "ask_manager"));
        assert!(manager_defs.iter().any(|d| d.name == "shell_exec"));
    }

    #[tokio::test]
    async fn execute_dispatches_to_registered_tool() {
        let (registry, _manager) = build_registry(ExecConfig::default(), ExecSecurityConfig::default());
        let ctx = ToolContext::for_worker("s1", std::env::temp_dir(), Duration::from_secs(5));

        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "list_files".into(),
            arguments: serde_json::json!({"path": "."}),
        };
        let outcome = registry.execute(&ctx, ToolRole::Worker, &call).await.unwrap();
        assert!(!outcome.is_error);
    }

    #[tokio::test]
    async fn execute_rejects_unknown_tool() {
        let (registry, _manager) = build_registry(ExecConfig::default(), ExecSecurityConfig::default());
        let ctx = ToolContext::for_worker("s1", std::env::temp_dir(), Duration::from_secs(5));
        let call = ToolCall { call_id: "c1".into(), tool_name: "nope".into(), arguments: serde_json::json!({}) };
        assert!(registry.execute(&ctx, ToolRole::Worker, &call).await.is_err());
    }
}
