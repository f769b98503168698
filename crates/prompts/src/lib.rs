//! Out-of-band user prompts with request-id correlation (C8).
//!
//! Used both for the clarification gate and for `ask_user` tool
//! calls during execution. A prompt blocks its caller on a oneshot
//! channel; `handle_user_input` resolves it by request id, or — when the
//! client didn't echo one back — resolves whichever prompt for that
//! session was raised most recently.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct PromptAnswer {
    pub selection: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug)]
pub enum PromptOutcome {
    Answered(PromptAnswer),
    Cancelled,
}

struct PendingPrompt {
    id: Uuid,
    session_id: String,
    question: String,
    created_at: DateTime<Utc>,
    respond: oneshot::Sender<PromptOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptInfo {
    pub id: Uuid,
    pub session_id: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PendingPrompt> for PromptInfo {
    fn from(p: &PendingPrompt) -> Self {
        Self {
            id: p.id,
            session_id: p.session_id.clone(),
            question: p.question.clone(),
            created_at: p.created_at,
        }
    }
}

#[derive(Default)]
pub struct PendingPromptTable {
    pending: RwLock<HashMap<Uuid, PendingPrompt>>,
    /// Insertion order per session, most-recent last — used to resolve a
    /// response that didn't come back with an explicit `requestId`.
    order_by_session: RwLock<HashMap<String, Vec<Uuid>>>,
}

impl PendingPromptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new prompt and return its id plus the receiver the
    /// caller should await (with its own timeout, typically
    /// [`DEFAULT_TIMEOUT`]).
    pub fn ask(
        &self,
        session_id: impl Into<String>,
        question: impl Into<String>,
    ) -> (Uuid, oneshot::Receiver<PromptOutcome>) {
        let id = Uuid::new_v4();
        let session_id = session_id.into();
        let (tx, rx) = oneshot::channel();
        let prompt = PendingPrompt {
            id,
            session_id: session_id.clone(),
            question: question.into(),
            created_at: Utc::now(),
            respond: tx,
        };
        self.pending.write().insert(id, prompt);
        self.order_by_session.write().entry(session_id).or_default().push(id);
        (id, rx)
    }

    /// Resolve a prompt with a user's answer. If `request_id` is `None`,
    /// resolves the most recently raised pending prompt for `session_id`.
    /// Returns `true` if a prompt was found and resolved.
    pub fn answer(
        &self,
        session_id: &str,
        request_id: Option<Uuid>,
        answer: PromptAnswer,
    ) -> bool {
        let id = match request_id {
            Some(id) => id,
            None => match self.most_recent(session_id) {
                Some(id) => id,
                None => return false,
            },
        };
        self.resolve(&id, PromptOutcome::Answered(answer))
    }

    /// Cancel every pending prompt for a session — used when
    /// `cancelSessionWorkers` fires, so nothing is left blocked forever.
    pub fn cancel_session(&self, session_id: &str) {
        let ids: Vec<Uuid> = self
            .order_by_session
            .write()
            .remove(session_id)
            .unwrap_or_default();
        for id in ids {
            if let Some(p) = self.pending.write().remove(&id) {
                let _ = p.respond.send(PromptOutcome::Cancelled);
            }
        }
    }

    /// Drop an expired prompt's bookkeeping after its receiver timed out.
    pub fn remove_expired(&self, id: &Uuid) {
        if let Some(p) = self.pending.write().remove(id) {
            self.remove_from_order(&p.session_id, id);
        }
    }

    pub fn list_pending(&self) -> Vec<PromptInfo> {
        self.pending.read().values().map(PromptInfo::from).collect()
    }

    fn most_recent(&self, session_id: &str) -> Option<Uuid> {
        self.order_by_session.read().get(session_id).and_then(|v| v.last().copied())
    }

    fn resolve(&self, id: &Uuid, outcome: PromptOutcome) -> bool {
        if let Some(p) = self.pending.write().remove(id) {
            self.remove_from_order(&p.session_id, id);
            let _ = p.respond.send(outcome);
            return true;
        }
        false
    }

    fn remove_from_order(&self, session_id: &str, id: &Uuid) {
        let mut guard = self.order_by_session.write();
        if let Some(v) = guard.get_mut(session_id) {
            v.retain(|x| x != id);
            if v.is_empty() {
                guard.remove(session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answer_with_request_id_resolves_exact_prompt() {
        let table = PendingPromptTable::new();
        let (id, rx) = table.ask("s1", "which file?");
        assert!(table.answer(
            "s1",
            Some(id),
            PromptAnswer {
                selection: Some("a.ts".into()),
                text: None,
            },
        ));
        let outcome = rx.await.unwrap();
        match outcome {
            PromptOutcome::Answered(a) => assert_eq!(a.selection.as_deref(), Some("a.ts")),
            PromptOutcome::Cancelled => panic!("expected Answered"),
        }
    }

    #[tokio::test]
    async fn answer_without_request_id_resolves_most_recent() {
        let table = PendingPromptTable::new();
        let (_id1, rx1) = table.ask("s1", "first?");
        let (_id2, rx2) = table.ask("s1", "second?");
        assert!(table.answer(
            "s1",
            None,
            PromptAnswer {
                selection: Some("yes".into()),
                text: None,
            },
        ));
        // second (most recent) resolves; first is still pending.
        assert!(rx2.await.is_ok());
        assert!(matches!(
            rx1.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn cancel_session_unblocks_all_pending() {
        let table = PendingPromptTable::new();
        let (_id1, rx1) = table.ask("s1", "q1");
        let (_id2, rx2) = table.ask("s1", "q2");
        table.cancel_session("s1");
        assert!(matches!(rx1.await.unwrap(), PromptOutcome::Cancelled));
        assert!(matches!(rx2.await.unwrap(), PromptOutcome::Cancelled));
        assert!(table.list_pending().is_empty());
    }

    #[test]
    fn answer_nonexistent_request_id_returns_false() {
        let table = PendingPromptTable::new();
        assert!(!table.answer(
            "s1",
            Some(Uuid::new_v4()),
            PromptAnswer {
                selection: None,
                text: None,
            },
        ));
    }
}
