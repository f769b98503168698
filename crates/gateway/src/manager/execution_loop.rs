//! The turn-by-turn loop shared by the fast path (the manager agent itself)
//! and complex-path workers: stream a completion, execute any tool calls it
//! emits, feed the results back, and repeat until the model stops calling
//! tools.

use std::sync::Arc;

use futures_util::StreamExt;

use kory_bus::event::{AgentSummary, Event, ToolCallSummary, ToolResultSummary};
use kory_bus::EventBus;
use kory_domain::error::{Error, Result};
use kory_domain::stream::{StreamEvent, Usage};
use kory_domain::tool::{Message, ToolCall};
use kory_providers::registry::ProviderRegistry;
use kory_providers::traits::ChatRequest;
use kory_tools::{ToolContext, ToolRegistry, ToolRole};

/// A single turn loop's outcome.
pub struct TurnOutcome {
    pub final_text: String,
    pub usage: Usage,
    pub turns_run: u32,
}

/// Hard ceiling on tool-call round trips within one `run_turns` call, so a
/// model that never stops calling tools can't loop forever.
const MAX_TURNS: u32 = 50;

#[allow(clippy::too_many_arguments)]
pub async fn run_turns(
    providers: &ProviderRegistry,
    bus: &Arc<EventBus>,
    tools: &ToolRegistry,
    tool_ctx: &ToolContext,
    role: ToolRole,
    agent_id: &str,
    agent_summary: &AgentSummary,
    mut messages: Vec<Message>,
    model: &str,
    preferred_provider: Option<&str>,
    max_tokens: Option<u32>,
) -> Result<TurnOutcome> {
    let tool_defs = tools.defs_for_role(role);
    let mut usage = Usage::default();
    let mut final_text = String::new();

    bus.publish(Event::AgentSpawned {
        agent: agent_summary.clone(),
        task: messages
            .iter()
            .rev()
            .find_map(|m| m.content.text().map(str::to_string))
            .unwrap_or_default(),
    });

    for turn in 0..MAX_TURNS {
        if tool_ctx.cancellation.is_cancelled() {
            bus.publish(Event::AgentStatus {
                agent_id: agent_id.to_string(),
                status: "cancelled".into(),
                detail: None,
            });
            break;
        }

        let request = ChatRequest {
            messages: messages.clone(),
            tools: tool_defs.clone(),
            max_tokens,
            model: Some(model.to_string()),
            ..Default::default()
        };

        let mut stream = providers.execute_with_retry(&request, preferred_provider).await?;

        let mut turn_text = String::new();
        let mut pending_calls: Vec<(String, String, String)> = Vec::new(); // (call_id, name, args)

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::ContentDelta { text } => {
                    turn_text.push_str(&text);
                    bus.publish(Event::StreamDelta {
                        agent_id: agent_id.to_string(),
                        content: text,
                        model: model.to_string(),
                    });
                }
                StreamEvent::ThinkingDelta { text } => {
                    bus.publish(Event::StreamThinking { agent_id: agent_id.to_string(), thinking: text });
                }
                StreamEvent::UsageUpdate { usage: u } => {
                    usage = usage.max(&u);
                }
                StreamEvent::ToolUseStart { .. } => {}
                StreamEvent::ToolUseDelta { .. } => {}
                StreamEvent::ToolUseStop { call_id, tool_name, arguments } => {
                    bus.publish(Event::StreamToolCall {
                        agent_id: agent_id.to_string(),
                        tool_call: ToolCallSummary {
                            id: call_id.clone(),
                            name: tool_name.clone(),
                            input: serde_json::from_str(&arguments).unwrap_or(serde_json::Value::Null),
                        },
                    });
                    pending_calls.push((call_id, tool_name, arguments));
                }
                StreamEvent::Complete { usage: u, .. } => {
                    if let Some(u) = u {
                        usage = usage.max(&u);
                    }
                }
                StreamEvent::Error { message } => {
                    return Err(Error::Provider { provider: "stream".into(), message });
                }
            }
        }

        bus.publish(Event::usage_from(agent_id, model, preferred_provider.unwrap_or("unknown"), usage));

        if !turn_text.is_empty() {
            final_text = turn_text.clone();
            messages.push(Message::assistant(turn_text));
        }

        if pending_calls.is_empty() {
            bus.publish(Event::AgentStatus {
                agent_id: agent_id.to_string(),
                status: "done".into(),
                detail: None,
            });
            return Ok(TurnOutcome { final_text, usage, turns_run: turn + 1 });
        }

        for (call_id, tool_name, arguments) in pending_calls {
            let arguments: serde_json::Value =
                serde_json::from_str(&arguments).unwrap_or(serde_json::Value::Null);
            let call = ToolCall { call_id: call_id.clone(), tool_name: tool_name.clone(), arguments };
            let started = std::time::Instant::now();
            let outcome = tools.execute(tool_ctx, role, &call).await;

            let (output, is_error) = match outcome {
                Ok(o) => (o.output.to_string(), o.is_error),
                Err(e) => (e.to_string(), true),
            };

            bus.publish(Event::StreamToolResult {
                agent_id: agent_id.to_string(),
                tool_result: ToolResultSummary {
                    call_id: call_id.clone(),
                    name: tool_name,
                    output: output.clone(),
                    is_error,
                    duration_ms: started.elapsed().as_millis() as u64,
                },
            });

            messages.push(Message::tool_result(call_id, output));
        }
    }

    bus.publish(Event::AgentStatus {
        agent_id: agent_id.to_string(),
        status: "error".into(),
        detail: Some("exceeded maximum tool-call turns".into()),
    });
    Err(Error::Other(format!("agent {agent_id} exceeded {MAX_TURNS} tool-call turns")))
}
