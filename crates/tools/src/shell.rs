//! `shell_exec` / `process` tools — thin `Tool` wrappers around
//! [`crate::exec`] and [`crate::process`], adding deny-list enforcement
//! and sandbox confinement on top of the raw primitives.

use std::sync::Arc;

use serde_json::{json, Value};

use kory_domain::config::ExecSecurityConfig;

use crate::context::{ToolContext, ToolRole};
use crate::exec::{self, ExecRequest};
use crate::file_ops;
use crate::manager::ProcessManager;
use crate::process::{self, ProcessRequest};
use crate::registry::Tool;
use crate::security;

pub struct ShellExecTool {
    pub manager: Arc<ProcessManager>,
    pub security: ExecSecurityConfig,
}

#[async_trait::async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &'static str {
        "shell_exec"
    }
    fn description(&self) -> &'static str {
        "Run a shell command, in the foreground or backgrounded if long-running."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "background": {"type": "boolean", "default": false},
                "yield_ms": {"type": "integer"},
                "timeout_sec": {"type": "integer"},
                "workdir": {"type": "string"},
                "env": {"type": "object", "additionalProperties": {"type": "string"}},
            },
            "required": ["command"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        &[ToolRole::Manager, ToolRole::Worker]
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let mut req: ExecRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;

        security::check_command(&self.security, &req.command)?;

        let workdir = match &req.workdir {
            Some(wd) if ctx.is_sandboxed => {
                let resolved = file_ops::validate_path(ctx.sandbox_root(), wd)?;
                resolved.to_string_lossy().into_owned()
            }
            Some(wd) => wd.clone(),
            None => ctx.workdir.to_string_lossy().into_owned(),
        };
        req.workdir = Some(workdir);

        let response = exec::exec(&self.manager, req).await;
        serde_json::to_value(response).map_err(|e| e.to_string())
    }
}

pub struct ProcessControlTool {
    pub manager: Arc<ProcessManager>,
}

#[async_trait::async_trait]
impl Tool for ProcessControlTool {
    fn name(&self) -> &'static str {
        "process"
    }
    fn description(&self) -> &'static str {
        "Inspect or control a backgrounded shell_exec session (list/poll/log/write/kill/clear/remove)."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"]},
                "session_id": {"type": "string"},
                "offset": {"type": "integer"},
                "limit": {"type": "integer"},
                "tail_lines": {"type": "integer"},
                "data": {"type": "string"},
                "eof": {"type": "boolean", "default": false},
            },
            "required": ["action"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        &[ToolRole::Manager, ToolRole::Worker]
    }
    async fn run(&self, _ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: ProcessRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        let response = process::handle_process(&self.manager, req).await;
        if !response.success {
            return Err(response.error.unwrap_or_else(|| "process action failed".to_string()));
        }
        serde_json::to_value(response).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_ctx() -> ToolContext {
        ToolContext::for_manager("s1", std::env::temp_dir(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn blocks_denied_command() {
        let tool = ShellExecTool {
            manager: Arc::new(ProcessManager::new(kory_domain::config::ExecConfig::default())),
            security: ExecSecurityConfig::default(),
        };
        let result = tool.run(&test_ctx(), json!({"command": "rm -rf /"})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn runs_allowed_command() {
        let tool = ShellExecTool {
            manager: Arc::new(ProcessManager::new(kory_domain::config::ExecConfig::default())),
            security: ExecSecurityConfig::default(),
        };
        let result = tool.run(&test_ctx(), json!({"command": "echo hi"})).await.unwrap();
        assert_eq!(result["status"], "finished");
    }
}
