use crate::tool::{MessageContent, Role};
use serde::{Deserialize, Serialize};

/// A conversation session (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: Option<String>,
    /// Set when this session was spawned as a complex-path worker.
    pub parent_session_id: Option<String>,
    pub workflow_state: WorkflowState,
    pub turn_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            title: None,
            parent_session_id: None,
            workflow_state: WorkflowState::Idle,
            turn_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn child(id: impl Into<String>, parent_session_id: impl Into<String>) -> Self {
        let mut s = Self::new(id);
        s.parent_session_id = Some(parent_session_id.into());
        s
    }
}

/// The high-level state of a session's execution loop, surfaced over
/// the WebSocket gateway so clients can render progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Analyzing,
    Planning,
    Executing,
    WaitingUser,
    Error,
}

/// A persisted message, as stored by the session store / transcript.
/// Distinct from [`crate::tool::Message`], which is the provider-facing
/// shape used inside a single LLM turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A unit of work dispatched to a worker in a complex-path run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub session_id: String,
    pub description: String,
    pub domain: crate::capability::Domain,
    pub assigned_model: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Done,
    Failed,
    Interrupted,
}

/// A worker's visible identity, surfaced to clients so a multi-worker
/// run can be rendered as distinct agents rather than one undifferentiated
/// stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    pub display_name: String,
    pub role: crate::capability::ModelRole,
    pub model_id: String,
    pub provider_name: String,
    pub domain: Option<crate::capability::Domain>,
    pub ui_glow_color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_idle_with_no_parent() {
        let s = Session::new("s1");
        assert_eq!(s.workflow_state, WorkflowState::Idle);
        assert!(s.parent_session_id.is_none());
    }

    #[test]
    fn child_session_carries_parent_id() {
        let s = Session::child("s2", "s1");
        assert_eq!(s.parent_session_id.as_deref(), Some("s1"));
    }
}
