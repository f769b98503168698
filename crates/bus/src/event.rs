use kory_domain::change::ChangeSummary;
use kory_domain::stream::Usage;
use serde::{Deserialize, Serialize};

/// Every topic published on the Event Bus (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic")]
pub enum Event {
    #[serde(rename = "agent.spawned")]
    AgentSpawned { agent: AgentSummary, task: String },

    #[serde(rename = "agent.status")]
    AgentStatus {
        agent_id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    #[serde(rename = "stream.delta")]
    StreamDelta {
        agent_id: String,
        content: String,
        model: String,
    },

    #[serde(rename = "stream.thinking")]
    StreamThinking { agent_id: String, thinking: String },

    #[serde(rename = "stream.tool_call")]
    StreamToolCall {
        agent_id: String,
        tool_call: ToolCallSummary,
    },

    #[serde(rename = "stream.tool_result")]
    StreamToolResult {
        agent_id: String,
        tool_result: ToolResultSummary,
    },

    #[serde(rename = "stream.file_delta")]
    StreamFileDelta {
        agent_id: String,
        path: String,
        delta: String,
        total_length: usize,
        operation: String,
    },

    #[serde(rename = "stream.file_complete")]
    StreamFileComplete {
        agent_id: String,
        path: String,
        total_lines: usize,
        operation: String,
    },

    #[serde(rename = "stream.usage")]
    StreamUsage {
        agent_id: String,
        model: String,
        provider: String,
        tokens_in: u32,
        tokens_out: u32,
        tokens_used: u32,
        usage_known: bool,
        context_known: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        context_window: Option<u32>,
    },

    #[serde(rename = "kory.thought")]
    KoryThought { thought: String, phase: ThoughtPhase },

    #[serde(rename = "kory.ask_user")]
    KoryAskUser {
        question: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        allow_other: bool,
        request_id: String,
    },

    #[serde(rename = "session.changes")]
    SessionChanges { changes: Vec<ChangeSummary> },

    #[serde(rename = "session.accept_changes")]
    SessionAcceptChanges {},

    #[serde(rename = "session.git_commit")]
    SessionGitCommit { message: String },

    #[serde(rename = "system.error")]
    SystemError { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtPhase {
    Analyzing,
    Planning,
    Delegating,
    Executing,
    Finalizing,
    Synthesizing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    pub display_name: String,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultSummary {
    pub call_id: String,
    pub name: String,
    pub output: String,
    pub is_error: bool,
    pub duration_ms: u64,
}

impl Event {
    /// Builds a `stream.usage` event from a provider's reported `Usage`.
    pub fn usage_from(agent_id: &str, model: &str, provider: &str, usage: Usage) -> Event {
        Event::StreamUsage {
            agent_id: agent_id.into(),
            model: model.into(),
            provider: provider.into(),
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            tokens_used: usage.total_tokens,
            usage_known: true,
            context_known: false,
            context_window: None,
        }
    }
}
