//! `ask_user` and `ask_manager` — interaction tools that block on a
//! correlated human (or manager) reply via the pending-prompt table (C8).

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use kory_bus::event::Event;
use kory_prompts::PromptOutcome;

use crate::context::{ToolContext, ToolRole};
use crate::registry::Tool;

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_other: bool,
}

async fn ask_and_await(ctx: &ToolContext, req: &AskRequest) -> Result<Value, String> {
    let prompts = ctx
        .prompts
        .as_ref()
        .ok_or_else(|| "no pending-prompt table wired into this context".to_string())?;

    let (request_id, rx) = prompts.ask(ctx.session_id.clone(), req.question.clone());

    let outcome = tokio::time::timeout(crate::DEFAULT_ASK_TIMEOUT, rx).await;
    let outcome = match outcome {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => return Err("prompt sender dropped".to_string()),
        Err(_) => {
            prompts.remove_expired(&request_id);
            return Err(format!("no response within {:?}", crate::DEFAULT_ASK_TIMEOUT));
        }
    };

    match outcome {
        PromptOutcome::Answered(answer) => Ok(json!({
            "request_id": request_id,
            "selection": answer.selection,
            "text": answer.text,
        })),
        PromptOutcome::Cancelled => Err("prompt cancelled".to_string()),
    }
}

pub struct AskUserTool;

#[async_trait::async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &'static str {
        "ask_user"
    }
    fn description(&self) -> &'static str {
        "Ask the human user a clarifying question and wait for their reply."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {"type": "string"},
                "options": {"type": "array", "items": {"type": "string"}},
                "allow_other": {"type": "boolean", "default": false},
            },
            "required": ["question"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        &[ToolRole::Manager, ToolRole::Worker]
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: AskRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;

        if let Some(bus) = &ctx.bus {
            // request_id isn't known until `prompts.ask` runs below; publish
            // a provisional id so the client has something to echo back.
            let request_id = Uuid::new_v4();
            let options = if req.options.is_empty() { None } else { Some(req.options.clone()) };
            bus.publish(Event::KoryAskUser {
                question: req.question.clone(),
                options,
                allow_other: req.allow_other,
                request_id: request_id.to_string(),
            });
        }

        ask_and_await(ctx, &req).await
    }
}

/// Like `ask_user`, but directed at the Manager rather than the human —
/// used by complex-path workers that need a decision from the orchestrator
/// without surfacing it to the end user.
pub struct AskManagerTool;

#[async_trait::async_trait]
impl Tool for AskManagerTool {
    fn name(&self) -> &'static str {
        "ask_manager"
    }
    fn description(&self) -> &'static str {
        "Ask the Manager a question and wait for its decision."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {"type": "string"},
                "options": {"type": "array", "items": {"type": "string"}},
                "allow_other": {"type": "boolean", "default": false},
            },
            "required": ["question"],
        })
    }
    fn roles(&self) -> &'static [ToolRole] {
        &[ToolRole::Worker]
    }
    async fn run(&self, ctx: &ToolContext, input: Value) -> Result<Value, String> {
        let req: AskRequest = serde_json::from_value(input).map_err(|e| e.to_string())?;
        ask_and_await(ctx, &req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kory_prompts::{PendingPromptTable, PromptAnswer};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn ask_user_resolves_with_answer() {
        let table = Arc::new(PendingPromptTable::new());
        let ctx = ToolContext::for_worker("s1", std::env::temp_dir(), Duration::from_secs(5))
            .with_prompts(table.clone());

        let handle = tokio::spawn({
            let ctx = ctx.clone();
            async move { AskUserTool.run(&ctx, json!({"question": "which file?"})).await }
        });

        // Give the tool a moment to register its prompt, then answer it.
        tokio::task::yield_now().await;
        for _ in 0..50 {
            if table.answer(
                "s1",
                None,
                PromptAnswer { selection: Some("a.ts".into()), text: None },
            ) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result["selection"], "a.ts");
    }

    #[tokio::test]
    async fn ask_user_without_prompts_table_errors() {
        let ctx = ToolContext::for_worker("s1", std::env::temp_dir(), Duration::from_secs(5));
        let result = AskUserTool.run(&ctx, json!({"question": "q?"})).await;
        assert!(result.is_err());
    }
}
