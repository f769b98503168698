use std::path::PathBuf;
use std::sync::Arc;

use kory_bus::EventBus;
use kory_domain::config::Config;
use kory_ledger::ChangeLedger;
use kory_prompts::PendingPromptTable;
use kory_providers::registry::ProviderRegistry;
use kory_sessions::{LifecycleManager, SessionStore};
use kory_snapshot::SnapshotStore;
use kory_tools::{ProcessManager, ToolRegistry};
use kory_vcs::VcsAdapter;

use crate::manager::Manager;
use crate::runtime::session_lock::SessionLockMap;

/// Shared application state passed to every HTTP/WebSocket handler.
///
/// Fields are grouped by concern:
/// - **Core services** — config, event bus, LLM providers
/// - **Session state** — sessions, lifecycle, per-session locks
/// - **Change tracking** — ledger, snapshots, VCS
/// - **Execution** — tool registry, process manager, the manager orchestrator
/// - **Security** — the API bearer token hash computed once at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core services ───────────────────────────────────────────────
    pub config: Arc<Config>,
    pub bus: Arc<EventBus>,
    pub providers: Arc<ProviderRegistry>,

    // ── Session state ───────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub lifecycle: Arc<LifecycleManager>,
    pub session_locks: Arc<SessionLockMap>,

    // ── Change tracking ─────────────────────────────────────────────
    pub ledger: Arc<ChangeLedger>,
    pub snapshots: Arc<SnapshotStore>,
    /// `None` when the working directory isn't a git repository — the
    /// manager falls back to the snapshot store for rollback in that case.
    pub vcs: Option<VcsAdapter>,

    // ── Execution ────────────────────────────────────────────────────
    pub tools: Arc<ToolRegistry>,
    pub process_manager: Arc<ProcessManager>,
    pub prompts: Arc<PendingPromptTable>,
    pub manager: Arc<Manager>,

    // ── Security (startup-computed) ─────────────────────────────────
    /// SHA-256 hash of the API bearer token. `None` = dev mode, no auth
    /// enforced.
    pub api_token_hash: Option<Vec<u8>>,

    /// The project directory the gateway was started against.
    pub workdir: PathBuf,
}
