//! Session, message, and task store (C2).
//!
//! Persists state as a single JSON file under the configured state path,
//! with an in-memory `RwLock`-guarded cache flushed back to disk on every
//! mutation. Each message is additionally appended to a per-session JSONL
//! transcript and folded into the in-memory full-text search index, so
//! transcript search stays live without a rebuild.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use kory_domain::error::{Error, Result};
use kory_domain::session::{Session, StoredMessage, Task, TaskStatus, WorkflowState};
use kory_domain::tool::Role;

use crate::search::{SearchHit, TranscriptIndex};
use crate::transcript::TranscriptWriter;

/// Partial update applied to a [`Session`]. Fields left `None` are
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub workflow_state: Option<WorkflowState>,
}

/// Partial update applied to a [`Task`]. Fields left `None` are unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub plan: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    sessions: Vec<Session>,
    #[serde(default)]
    messages: Vec<StoredMessage>,
    #[serde(default)]
    tasks: Vec<Task>,
}

struct StoreState {
    sessions: HashMap<String, Session>,
    messages: HashMap<String, Vec<StoredMessage>>,
    tasks: HashMap<String, Task>,
}

/// Gateway-owned session, message, and task store backed by a JSON file.
pub struct SessionStore {
    store_path: PathBuf,
    state: RwLock<StoreState>,
    transcripts: TranscriptWriter,
    search_index: TranscriptIndex,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions/store.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let store_path = dir.join("store.json");
        let persisted: PersistedState = if store_path.exists() {
            let raw = std::fs::read_to_string(&store_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            PersistedState::default()
        };

        let mut sessions = HashMap::new();
        for s in persisted.sessions {
            sessions.insert(s.id.clone(), s);
        }
        let mut messages: HashMap<String, Vec<StoredMessage>> = HashMap::new();
        for m in persisted.messages {
            messages.entry(m.session_id.clone()).or_default().push(m);
        }
        let mut tasks = HashMap::new();
        for t in persisted.tasks {
            tasks.insert(t.id.clone(), t);
        }

        tracing::info!(
            sessions = sessions.len(),
            path = %store_path.display(),
            "session store loaded"
        );

        let transcripts = TranscriptWriter::new(&dir);
        let search_index = TranscriptIndex::build_from_dir(&dir);

        Ok(Self {
            store_path,
            state: RwLock::new(StoreState {
                sessions,
                messages,
                tasks,
            }),
            transcripts,
            search_index,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Sessions
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn create_session(
        &self,
        title: Option<String>,
        parent_session_id: Option<String>,
    ) -> Result<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut session = match &parent_session_id {
            Some(parent) => Session::child(id, parent.clone()),
            None => Session::new(id),
        };
        session.title = title;

        self.state
            .write()
            .sessions
            .insert(session.id.clone(), session.clone());
        self.flush()?;
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.state.read().sessions.get(id).cloned()
    }

    /// All sessions, most recently updated first.
    pub fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<_> = self.state.read().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    pub fn update_session(&self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        let updated = {
            let mut state = self.state.write();
            let Some(session) = state.sessions.get_mut(id) else {
                return Ok(None);
            };
            if let Some(title) = patch.title {
                session.title = Some(title);
            }
            if let Some(workflow_state) = patch.workflow_state {
                session.workflow_state = workflow_state;
            }
            session.updated_at = Utc::now();
            session.clone()
        };
        self.flush()?;
        Ok(Some(updated))
    }

    pub fn set_workflow_state(
        &self,
        id: &str,
        workflow_state: WorkflowState,
    ) -> Result<Option<Session>> {
        self.update_session(
            id,
            SessionPatch {
                workflow_state: Some(workflow_state),
                ..Default::default()
            },
        )
    }

    /// Delete a session, cascading to its messages and tasks.
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let removed = {
            let mut state = self.state.write();
            let removed = state.sessions.remove(id).is_some();
            state.messages.remove(id);
            state.tasks.retain(|_, t| t.session_id != id);
            removed
        };
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    /// Wipe every session, message, and task.
    pub fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            state.sessions.clear();
            state.messages.clear();
            state.tasks.clear();
        }
        self.flush()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Messages
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn add_message(&self, session_id: &str, message: StoredMessage) -> Result<()> {
        {
            let mut state = self.state.write();
            state
                .messages
                .entry(session_id.to_owned())
                .or_default()
                .push(message.clone());
            if let Some(session) = state.sessions.get_mut(session_id) {
                session.turn_count += 1;
                session.updated_at = Utc::now();
            }
        }

        let text = message.content.extract_all_text();
        if !text.is_empty() {
            self.search_index.index_content(session_id, &text);
            let line = TranscriptWriter::line(role_str(message.role), &text);
            self.transcripts
                .append(session_id, std::slice::from_ref(&line))?;
        }

        self.flush()
    }

    /// All of a session's messages, ascending by timestamp.
    pub fn get_all_messages(&self, session_id: &str) -> Vec<StoredMessage> {
        let mut messages = self
            .state
            .read()
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        messages
    }

    /// The most recent `limit` messages, still in ascending order.
    pub fn get_recent_messages(&self, session_id: &str, limit: usize) -> Vec<StoredMessage> {
        let mut messages = self.get_all_messages(session_id);
        if messages.len() > limit {
            messages = messages.split_off(messages.len() - limit);
        }
        messages
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Tasks
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn create_task(&self, task: Task) -> Result<Task> {
        self.state.write().tasks.insert(task.id.clone(), task.clone());
        self.flush()?;
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.state.read().tasks.get(id).cloned()
    }

    pub fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        let updated = {
            let mut state = self.state.write();
            let Some(task) = state.tasks.get_mut(id) else {
                return Ok(None);
            };
            if let Some(status) = patch.status {
                task.status = status;
            }
            if let Some(plan) = patch.plan {
                task.plan = Some(plan);
            }
            if let Some(result) = patch.result {
                task.result = Some(result);
            }
            if let Some(error) = patch.error {
                task.error = Some(error);
            }
            task.updated_at = Utc::now();
            task.clone()
        };
        self.flush()?;
        Ok(Some(updated))
    }

    /// Tasks still pending or actively running, across all sessions.
    pub fn list_active_tasks(&self) -> Vec<Task> {
        self.state
            .read()
            .tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Active))
            .cloned()
            .collect()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Search & persistence
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        self.search_index.search(query)
    }

    pub fn flush(&self) -> Result<()> {
        let state = self.state.read();
        let persisted = PersistedState {
            sessions: state.sessions.values().cloned().collect(),
            messages: state
                .messages
                .values()
                .flat_map(|v| v.iter().cloned())
                .collect(),
            tasks: state.tasks.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|e| Error::Other(format!("serializing session store: {e}")))?;
        std::fs::write(&self.store_path, json).map_err(Error::Io)?;
        Ok(())
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kory_domain::tool::MessageContent;

    fn temp_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        (store, dir)
    }

    fn msg(session_id: &str, role: Role, text: &str) -> StoredMessage {
        StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            role,
            content: MessageContent::Text(text.to_owned()),
            provider: None,
            model: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn create_and_get_session() {
        let (store, _dir) = temp_store();
        let session = store.create_session(Some("t".into()), None).unwrap();
        let fetched = store.get_session(&session.id).unwrap();
        assert_eq!(fetched.title.as_deref(), Some("t"));
        assert!(fetched.parent_session_id.is_none());
    }

    #[test]
    fn child_session_carries_parent() {
        let (store, _dir) = temp_store();
        let parent = store.create_session(None, None).unwrap();
        let child = store
            .create_session(None, Some(parent.id.clone()))
            .unwrap();
        assert_eq!(child.parent_session_id.as_deref(), Some(parent.id.as_str()));
    }

    #[test]
    fn list_sessions_sorted_by_updated_desc() {
        let (store, _dir) = temp_store();
        let a = store.create_session(None, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = store.create_session(None, None).unwrap();
        let listed = store.list_sessions();
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }

    #[test]
    fn update_session_sets_fields() {
        let (store, _dir) = temp_store();
        let session = store.create_session(None, None).unwrap();
        let updated = store
            .update_session(
                &session.id,
                SessionPatch {
                    title: Some("renamed".into()),
                    workflow_state: Some(WorkflowState::Analyzing),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("renamed"));
        assert_eq!(updated.workflow_state, WorkflowState::Analyzing);
    }

    #[test]
    fn update_unknown_session_returns_none() {
        let (store, _dir) = temp_store();
        assert!(store
            .update_session("missing", SessionPatch::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_cascades_to_messages_and_tasks() {
        let (store, _dir) = temp_store();
        let session = store.create_session(None, None).unwrap();
        store
            .add_message(&session.id, msg(&session.id, Role::User, "hi"))
            .unwrap();
        store
            .create_task(Task {
                id: "task1".into(),
                session_id: session.id.clone(),
                description: "do thing".into(),
                domain: kory_domain::capability::Domain::General,
                assigned_model: "gpt-4o".into(),
                status: TaskStatus::Pending,
                plan: None,
                result: None,
                error: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();

        assert!(store.delete_session(&session.id).unwrap());
        assert!(store.get_session(&session.id).is_none());
        assert!(store.get_all_messages(&session.id).is_empty());
        assert!(store.get_task("task1").is_none());
    }

    #[test]
    fn messages_ordered_ascending() {
        let (store, _dir) = temp_store();
        let session = store.create_session(None, None).unwrap();
        store
            .add_message(&session.id, msg(&session.id, Role::User, "first"))
            .unwrap();
        store
            .add_message(&session.id, msg(&session.id, Role::Assistant, "second"))
            .unwrap();

        let all = store.get_all_messages(&session.id);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content.extract_all_text(), "first");
        assert_eq!(all[1].content.extract_all_text(), "second");
    }

    #[test]
    fn get_recent_limits_and_keeps_order() {
        let (store, _dir) = temp_store();
        let session = store.create_session(None, None).unwrap();
        for i in 0..5 {
            store
                .add_message(&session.id, msg(&session.id, Role::User, &format!("m{i}")))
                .unwrap();
        }
        let recent = store.get_recent_messages(&session.id, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content.extract_all_text(), "m3");
        assert_eq!(recent[1].content.extract_all_text(), "m4");
    }

    #[test]
    fn add_message_bumps_turn_count_and_updated_at() {
        let (store, _dir) = temp_store();
        let session = store.create_session(None, None).unwrap();
        store
            .add_message(&session.id, msg(&session.id, Role::User, "hi"))
            .unwrap();
        let fetched = store.get_session(&session.id).unwrap();
        assert_eq!(fetched.turn_count, 1);
    }

    #[test]
    fn list_active_tasks_excludes_done() {
        let (store, _dir) = temp_store();
        let session = store.create_session(None, None).unwrap();
        store
            .create_task(Task {
                id: "pending".into(),
                session_id: session.id.clone(),
                description: "a".into(),
                domain: kory_domain::capability::Domain::General,
                assigned_model: "gpt-4o".into(),
                status: TaskStatus::Pending,
                plan: None,
                result: None,
                error: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
        store
            .create_task(Task {
                id: "done".into(),
                session_id: session.id.clone(),
                description: "b".into(),
                domain: kory_domain::capability::Domain::General,
                assigned_model: "gpt-4o".into(),
                status: TaskStatus::Done,
                plan: None,
                result: None,
                error: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();

        let active = store.list_active_tasks();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "pending");
    }

    #[test]
    fn update_task_applies_patch() {
        let (store, _dir) = temp_store();
        let session = store.create_session(None, None).unwrap();
        store
            .create_task(Task {
                id: "t1".into(),
                session_id: session.id.clone(),
                description: "a".into(),
                domain: kory_domain::capability::Domain::General,
                assigned_model: "gpt-4o".into(),
                status: TaskStatus::Pending,
                plan: None,
                result: None,
                error: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();

        let updated = store
            .update_task(
                "t1",
                TaskPatch {
                    status: Some(TaskStatus::Done),
                    result: Some("ok".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.result.as_deref(), Some("ok"));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::new(dir.path()).unwrap();
            let session = store.create_session(Some("persisted".into()), None).unwrap();
            store
                .add_message(&session.id, msg(&session.id, Role::User, "hello"))
                .unwrap();
        }
        let reopened = SessionStore::new(dir.path()).unwrap();
        let sessions = reopened.list_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title.as_deref(), Some("persisted"));
        assert_eq!(reopened.get_all_messages(&sessions[0].id).len(), 1);
    }

    #[test]
    fn search_finds_indexed_message() {
        let (store, _dir) = temp_store();
        let session = store.create_session(None, None).unwrap();
        store
            .add_message(&session.id, msg(&session.id, Role::User, "deploy the frobnicator"))
            .unwrap();
        let hits = store.search("frobnicator");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, session.id);
    }
}
