//! The Manager orchestrator (C9) — the pipeline a user turn runs through:
//! clarify, classify, fast-path or complex-path execution, then commit.
//!
//! The Manager itself is an unsandboxed agent with full tool access; a
//! complex-path run additionally spawns one sandboxed worker per task,
//! each scoped to its own tool role and cancellation token.

pub mod changes;
pub mod classify;
pub mod clarify;
pub mod execution_loop;
pub mod prompts;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use kory_bus::event::{AgentSummary, Event, ThoughtPhase};
use kory_bus::EventBus;
use kory_domain::capability::Domain;
use kory_domain::change::ChangeSummary;
use kory_domain::config::Config;
use kory_domain::error::Result;
use kory_domain::session::{Task, TaskStatus, WorkflowState};
use kory_domain::tool::Message;
use kory_ledger::{ApplyChangesRequest, ApplyOutcome, ChangeLedger};
use kory_prompts::{PendingPromptTable, PromptAnswer, PromptOutcome};
use kory_providers::registry::ProviderRegistry;
use kory_sessions::{SessionStore, TaskPatch};
use kory_snapshot::SnapshotStore;
use kory_tools::{ToolContext, ToolRegistry, ToolRole};
use kory_vcs::VcsAdapter;

use self::changes::apply_session_changes;
use self::classify::{classify_complexity, classify_domain, Complexity};
use self::clarify::{run_clarify, ClarifyResult};
use self::execution_loop::run_turns;
use self::prompts::{COMMIT_MESSAGE_PROMPT, MANAGER_PROMPT, WORKER_PROMPT};

/// A running worker's cancellation handle, keyed by worker id.
struct WorkerHandle {
    session_id: String,
    token: CancellationToken,
}

pub struct Manager {
    config: Arc<Config>,
    bus: Arc<EventBus>,
    sessions: Arc<SessionStore>,
    providers: Arc<ProviderRegistry>,
    ledger: Arc<ChangeLedger>,
    prompts: Arc<PendingPromptTable>,
    snapshots: Arc<SnapshotStore>,
    vcs: Option<VcsAdapter>,
    tools: Arc<ToolRegistry>,
    workdir: PathBuf,

    /// Last-known-good commit hash per session, recorded before a run
    /// starts mutating files. `reject_all` rolls back to this via VCS when
    /// available.
    good_hashes: Mutex<HashMap<String, String>>,
    /// When set, the manager auto-accepts changes and commits instead of
    /// waiting for a human decision.
    yolo: AtomicBool,
    /// Per-session root cancellation token, cancels every worker spawned
    /// under it.
    session_tokens: Mutex<HashMap<String, CancellationToken>>,
    active_workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl Manager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        bus: Arc<EventBus>,
        sessions: Arc<SessionStore>,
        providers: Arc<ProviderRegistry>,
        ledger: Arc<ChangeLedger>,
        prompts: Arc<PendingPromptTable>,
        snapshots: Arc<SnapshotStore>,
        vcs: Option<VcsAdapter>,
        tools: Arc<ToolRegistry>,
        workdir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            bus,
            sessions,
            providers,
            ledger,
            prompts,
            snapshots,
            vcs,
            tools,
            workdir,
            good_hashes: Mutex::new(HashMap::new()),
            yolo: AtomicBool::new(false),
            session_tokens: Mutex::new(HashMap::new()),
            active_workers: Mutex::new(HashMap::new()),
        })
    }

    fn session_token(&self, session_id: &str) -> CancellationToken {
        self.session_tokens
            .lock()
            .entry(session_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Resolve `(provider, model)` per the routing order: an explicit
    /// `preferred_model` ("provider:modelId"), then `config.llm.assignments`
    /// keyed by domain, then the domain's compiled-in default.
    fn resolve_model(&self, domain: Domain, preferred_model: Option<&str>) -> (String, String) {
        if let Some(pref) = preferred_model {
            if let Some((provider, model)) = pref.split_once(':') {
                return (provider.to_string(), model.to_string());
            }
            return (String::new(), pref.to_string());
        }
        let key = format!("{domain:?}").to_lowercase();
        if let Some(assignment) = self.config.llm.assignments.get(&key) {
            if let Some((provider, model)) = assignment.split_once(':') {
                return (provider.to_string(), model.to_string());
            }
        }
        let (provider, model) = domain.default_model();
        (provider.to_string(), model.to_string())
    }

    fn manager_model(&self) -> (Option<String>, String) {
        match &self.config.agents.manager.model {
            Some(m) => match m.split_once(':') {
                Some((provider, model)) => (Some(provider.to_string()), model.to_string()),
                None => (None, m.clone()),
            },
            None => {
                let (provider, model) = Domain::General.default_model();
                (Some(provider.to_string()), model.to_string())
            }
        }
    }

    pub fn set_yolo_mode(&self, enabled: bool) {
        self.yolo.store(enabled, Ordering::Relaxed);
    }

    pub fn is_session_running(&self, session_id: &str) -> bool {
        self.active_workers
            .lock()
            .values()
            .any(|w| w.session_id == session_id)
            || matches!(
                self.sessions.get_session(session_id).map(|s| s.workflow_state),
                Some(WorkflowState::Analyzing | WorkflowState::Planning | WorkflowState::Executing)
            )
    }

    /// Cancel every running worker and the manager's own turn loop, across
    /// all sessions.
    pub fn cancel(&self) {
        for token in self.session_tokens.lock().values() {
            token.cancel();
        }
        for w in self.active_workers.lock().values() {
            w.token.cancel();
        }
    }

    pub fn cancel_worker(&self, worker_id: &str) {
        if let Some(w) = self.active_workers.lock().get(worker_id) {
            w.token.cancel();
        }
    }

    pub fn cancel_session_workers(&self, session_id: &str) {
        if let Some(token) = self.session_tokens.lock().get(session_id) {
            token.cancel();
        }
        for w in self.active_workers.lock().values() {
            if w.session_id == session_id {
                w.token.cancel();
            }
        }
        self.prompts.cancel_session(session_id);
    }

    /// Resolve a pending `ask_user`/clarification prompt with the user's
    /// answer.
    pub fn handle_session_response(&self, session_id: &str, request_id: Option<Uuid>, answer: PromptAnswer) -> bool {
        self.prompts.answer(session_id, request_id, answer)
    }

    /// Feed free-form text to a session outside the clarification flow —
    /// currently only meaningful while a session is `WaitingUser` without a
    /// correlated request id; otherwise treated as a fresh turn.
    pub fn handle_user_input(self: &Arc<Self>, session_id: String, text: String) {
        if self.prompts.answer(&session_id, None, PromptAnswer { selection: None, text: Some(text.clone()) }) {
            return;
        }
        self.process(session_id, text, None, None);
    }

    pub fn get_session_changes(&self, session_id: &str) -> Vec<ChangeSummary> {
        self.ledger.get(session_id)
    }

    pub async fn apply_session_changes(&self, session_id: &str, req: ApplyChangesRequest) -> Result<ApplyOutcome> {
        let good_hash = self.good_hashes.lock().get(session_id).cloned();
        let outcome = apply_session_changes(
            &self.ledger,
            self.vcs.as_ref(),
            &self.snapshots,
            &self.workdir,
            session_id,
            good_hash.as_deref(),
            req,
        )
        .await?;
        self.bus.publish(Event::SessionChanges { changes: outcome.remaining.clone() });
        Ok(outcome)
    }

    pub fn get_status(&self) -> serde_json::Value {
        serde_json::json!({
            "providers": self.providers.get_status(),
            "yolo": self.yolo.load(Ordering::Relaxed),
            "activeWorkers": self.active_workers.lock().len(),
        })
    }

    /// Kick off a user turn. Fire-and-forget: spawns a background task and
    /// returns immediately. Progress is observed over the event bus.
    pub fn process(
        self: &Arc<Self>,
        session_id: String,
        text: String,
        preferred_model: Option<String>,
        reasoning_level: Option<String>,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_pipeline(&session_id, &text, preferred_model, reasoning_level).await {
                tracing::error!(session_id, error = %e, "pipeline run failed");
                this.bus.publish(Event::SystemError { error: e.to_string() });
                let _ = this.sessions.set_workflow_state(&session_id, WorkflowState::Error);
            }
        });
    }

    async fn run_pipeline(
        self: &Arc<Self>,
        session_id: &str,
        text: &str,
        preferred_model: Option<String>,
        _reasoning_level: Option<String>,
    ) -> Result<()> {
        let token = self.session_token(session_id);
        if let Some(hash) = self.current_vcs_hash().await {
            self.good_hashes.lock().insert(session_id.to_string(), hash);
        }

        self.sessions.set_workflow_state(session_id, WorkflowState::Analyzing)?;
        self.bus.publish(Event::KoryThought { thought: "reading the request".into(), phase: ThoughtPhase::Analyzing });

        let (manager_provider, manager_model) = self.manager_model();

        if let ClarifyResult::NeedsClarification { questions, reason } = run_clarify(
            &self.providers,
            &manager_model,
            manager_provider.as_deref(),
            &self.config.interaction,
            text,
        )
        .await?
        {
            self.sessions.set_workflow_state(session_id, WorkflowState::WaitingUser)?;
            let question = if reason.is_empty() {
                questions.join("\n")
            } else {
                format!("{reason}\n{}", questions.join("\n"))
            };
            let (request_id, rx) = self.prompts.ask(session_id, question.clone());
            self.bus.publish(Event::KoryAskUser {
                question,
                options: None,
                allow_other: true,
                request_id: request_id.to_string(),
            });

            let answer = match tokio::time::timeout(kory_prompts::DEFAULT_TIMEOUT, rx).await {
                Ok(Ok(PromptOutcome::Answered(a))) => a,
                Ok(Ok(PromptOutcome::Cancelled)) | Err(_) | Ok(Err(_)) => {
                    self.sessions.set_workflow_state(session_id, WorkflowState::Idle)?;
                    return Ok(());
                }
            };
            let clarified = answer.text.unwrap_or_default();
            return Box::pin(self.run_pipeline(session_id, &clarified, preferred_model, None)).await;
        }

        self.bus.publish(Event::KoryThought { thought: "classifying the request".into(), phase: ThoughtPhase::Planning });
        self.sessions.set_workflow_state(session_id, WorkflowState::Planning)?;

        let domain = classify_domain(&self.providers, &manager_model, manager_provider.as_deref(), text).await;
        let complexity = classify_complexity(&self.providers, &manager_model, manager_provider.as_deref(), text).await?;

        self.sessions.set_workflow_state(session_id, WorkflowState::Executing)?;

        match complexity {
            Complexity::Simple => self.run_fast_path(session_id, text, domain, preferred_model, &token).await?,
            Complexity::Complex => self.run_complex_path(session_id, text, domain, preferred_model, &token).await?,
        }

        self.finalize_run(session_id).await?;
        Ok(())
    }

    async fn current_vcs_hash(&self) -> Option<String> {
        match &self.vcs {
            Some(vcs) => vcs.current_hash().await.ok(),
            None => None,
        }
    }

    async fn run_fast_path(
        &self,
        session_id: &str,
        text: &str,
        domain: Domain,
        preferred_model: Option<String>,
        token: &CancellationToken,
    ) -> Result<()> {
        let (provider, model) = self.resolve_model(domain, preferred_model.as_deref());
        let ctx = ToolContext::for_manager(session_id, self.workdir.clone(), self.tool_timeout())
            .with_cancellation(token.clone())
            .with_bus(self.bus.clone())
            .with_prompts(self.prompts.clone());

        let agent_id = format!("{session_id}-manager");
        let summary = AgentSummary { id: agent_id.clone(), display_name: "Kory".into(), domain: None };

        let messages = vec![Message::system(MANAGER_PROMPT), Message::user(text)];

        let outcome = run_turns(
            &self.providers,
            &self.bus,
            &self.tools,
            &ctx,
            ToolRole::Manager,
            &agent_id,
            &summary,
            messages,
            &model,
            Some(provider.as_str()).filter(|p| !p.is_empty()),
            self.config.agents.manager.max_tokens.or(Some(self.config.safety.max_tokens_per_turn)),
        )
        .await?;

        self.sessions.add_message(
            session_id,
            kory_domain::session::StoredMessage {
                id: Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                role: kory_domain::tool::Role::Assistant,
                content: kory_domain::tool::MessageContent::Text(outcome.final_text),
                provider: Some(provider),
                model: Some(model),
                tool_call_id: None,
                timestamp: chrono::Utc::now(),
            },
        )?;
        Ok(())
    }

    async fn run_complex_path(
        &self,
        session_id: &str,
        text: &str,
        domain: Domain,
        preferred_model: Option<String>,
        token: &CancellationToken,
    ) -> Result<()> {
        let (provider, model) = self.resolve_model(domain, preferred_model.as_deref());

        let task = Task {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            description: text.to_string(),
            domain,
            assigned_model: model.clone(),
            status: TaskStatus::Active,
            plan: None,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let task = self.sessions.create_task(task)?;

        let worker_id = format!("{session_id}-worker-{}", task.id);
        let worker_token = token.child_token();
        self.active_workers.lock().insert(
            worker_id.clone(),
            WorkerHandle { session_id: session_id.to_string(), token: worker_token.clone() },
        );

        let worker_workdir = self.workdir.clone();
        let ctx = ToolContext::for_worker(session_id, worker_workdir, self.tool_timeout())
            .with_cancellation(worker_token.clone())
            .with_bus(self.bus.clone())
            .with_prompts(self.prompts.clone());

        let summary = AgentSummary { id: worker_id.clone(), display_name: format!("{domain:?} worker"), domain: Some(format!("{domain:?}").to_lowercase()) };
        let messages = vec![
            Message::system(WORKER_PROMPT),
            Message::user(format!("Task: {}\n\n{}", task.description, text)),
        ];

        let result = run_turns(
            &self.providers,
            &self.bus,
            &self.tools,
            &ctx,
            ToolRole::Worker,
            &worker_id,
            &summary,
            messages,
            &model,
            Some(provider.as_str()).filter(|p| !p.is_empty()),
            self.config.agents.task.max_tokens.or(Some(self.config.safety.max_tokens_per_turn)),
        )
        .await;

        self.active_workers.lock().remove(&worker_id);

        match result {
            Ok(outcome) => {
                self.sessions.update_task(
                    &task.id,
                    TaskPatch { status: Some(TaskStatus::Done), plan: None, result: Some(outcome.final_text), error: None },
                )?;
            }
            Err(e) => {
                self.sessions.update_task(
                    &task.id,
                    TaskPatch { status: Some(TaskStatus::Failed), plan: None, result: None, error: Some(e.to_string()) },
                )?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// The pipeline's final step: surface pending changes, and — in yolo
    /// mode — auto-accept them and draft a commit when a VCS is attached.
    async fn finalize_run(&self, session_id: &str) -> Result<()> {
        let pending = self.ledger.get(session_id);
        self.bus.publish(Event::SessionChanges { changes: pending.clone() });

        if self.yolo.load(Ordering::Relaxed) && !pending.is_empty() {
            self.apply_session_changes(session_id, ApplyChangesRequest { accept_all: true, ..Default::default() }).await?;
            if let Some(vcs) = &self.vcs {
                let message = self.draft_commit_message(&pending).await;
                vcs.stage(pending.iter().map(|c| c.path.clone()).collect()).await?;
                vcs.commit(message.clone()).await?;
                self.bus.publish(Event::SessionGitCommit { message });
            }
        }

        self.sessions.set_workflow_state(session_id, WorkflowState::Idle)?;
        self.bus.publish(Event::KoryThought { thought: "done".into(), phase: ThoughtPhase::Finalizing });
        Ok(())
    }

    async fn draft_commit_message(&self, changes: &[ChangeSummary]) -> String {
        let (provider, model) = self.manager_model();
        let Some(p) = self.providers.resolve_provider(&model, provider.as_deref()) else {
            return "chore: apply pending changes".into();
        };
        let summary = changes
            .iter()
            .map(|c| format!("{:?} {}", c.operation, c.path))
            .collect::<Vec<_>>()
            .join("\n");
        let request = kory_providers::traits::ChatRequest {
            messages: vec![Message::system(COMMIT_MESSAGE_PROMPT), Message::user(summary)],
            model: Some(model),
            max_tokens: Some(64),
            ..Default::default()
        };
        match p.chat(&request).await {
            Ok(r) if !r.content.trim().is_empty() => r.content.trim().to_string(),
            _ => "chore: apply pending changes".into(),
        }
    }

    fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.config.safety.tool_execution_timeout_ms)
    }
}
