//! The `Tool` trait and the registry that gates/dispatches tool calls.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

use kory_domain::error::{Error, Result};
use kory_domain::tool::{ToolCall, ToolDefinition};

use crate::context::{ToolContext, ToolRole};

/// Outcome of a single tool call.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub output: Value,
    pub is_error: bool,
    pub duration_ms: u64,
}

impl ToolOutcome {
    pub fn ok(output: Value) -> Self {
        Self { output, is_error: false, duration_ms: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: Value::String(message.into()),
            is_error: true,
            duration_ms: 0,
        }
    }
}

/// A single callable tool: a stable name, a JSON-schema input definition,
/// the roles allowed to call it, and an async body.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    fn roles(&self) -> &'static [ToolRole];

    /// Run the tool. Errors returned here are surfaced as `is_error: true`
    /// outcomes rather than failing the call outright — only cancellation,
    /// timeout, and role-gating are treated as call-level failures.
    async fn run(&self, ctx: &ToolContext, input: Value) -> std::result::Result<Value, String>;
}

/// Registers tools and dispatches calls, enforcing role-gating, per-call
/// timeout, and cancellation.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.tools.insert(tool.name(), Box::new(tool));
        self
    }

    /// Tool definitions visible to a given caller role, for advertising to
    /// the LLM as callable functions.
    pub fn defs_for_role(&self, role: ToolRole) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .filter(|t| t.roles().contains(&role))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub async fn execute(&self, ctx: &ToolContext, role: ToolRole, call: &ToolCall) -> Result<ToolOutcome> {
        let tool = self
            .tools
            .get(call.tool_name.as_str())
            .ok_or_else(|| Error::ToolNotFound(call.tool_name.clone()))?;

        if !tool.roles().contains(&role) {
            return Err(Error::ToolNotFound(format!(
                "{} is not callable by {role:?}",
                call.tool_name
            )));
        }

        let started = Instant::now();
        let run = tool.run(ctx, call.arguments.clone());

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => {
                return Err(Error::Other(format!("{} cancelled", call.tool_name)));
            }
            res = tokio::time::timeout(ctx.timeout, run) => {
                match res {
                    Ok(Ok(output)) => ToolOutcome { output, is_error: false, duration_ms: 0 },
                    Ok(Err(message)) => ToolOutcome { output: Value::String(message), is_error: true, duration_ms: 0 },
                    Err(_) => ToolOutcome {
                        output: Value::String(format!("{} timed out after {:?}", call.tool_name, ctx.timeout)),
                        is_error: true,
                        duration_ms: 0,
                    },
                }
            }
        };

        Ok(ToolOutcome { duration_ms: started.elapsed().as_millis() as u64, ..outcome })
    }
}
