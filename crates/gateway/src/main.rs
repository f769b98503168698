mod cli;
mod http;
mod manager;
mod runtime;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

use kory_bus::EventBus;
use kory_domain::config::{Config, ConfigSeverity};
use kory_ledger::ChangeLedger;
use kory_prompts::PendingPromptTable;
use kory_providers::registry::ProviderRegistry;
use kory_sessions::{LifecycleManager, SessionStore};
use kory_snapshot::SnapshotStore;
use kory_vcs::VcsAdapter;

use crate::cli::{Cli, Command, ConfigCommand};
use crate::http::auth::API_TOKEN_ENV;
use crate::manager::Manager;
use crate::runtime::session_lock::SessionLockMap;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::validate_config(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::show_config(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("kory {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kory_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("kory gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let workdir = std::env::current_dir().context("resolving working directory")?;
    let data_dir = std::path::PathBuf::from(&config.data_directory);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating {}", data_dir.display()))?;

    let bus = Arc::new(EventBus::new());

    let sessions = Arc::new(SessionStore::new(&data_dir).context("initializing session store")?);
    let lifecycle = Arc::new(LifecycleManager::new(config.sessions.lifecycle.clone()));
    tracing::info!("session store ready");

    let providers = Arc::new(ProviderRegistry::from_config(&config.llm));
    if providers.is_empty() {
        tracing::warn!("no LLM providers initialized — the gateway will run but every model call will fail");
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }

    let ledger = Arc::new(ChangeLedger::new());
    let prompts = Arc::new(PendingPromptTable::new());
    let snapshots = Arc::new(SnapshotStore::new(data_dir.join("snapshots")));

    let vcs = if VcsAdapter::is_repo(&workdir) {
        match VcsAdapter::open(&workdir) {
            Ok(adapter) => {
                tracing::info!("git repository detected, VCS adapter ready");
                Some(adapter)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to open git repository, VCS features disabled");
                None
            }
        }
    } else {
        tracing::info!("working directory is not a git repository, VCS features disabled");
        None
    };

    let (tools, process_manager) =
        kory_tools::build_registry(config.tools.exec.clone(), config.tools.exec_security.clone());
    let tools = Arc::new(tools);
    tracing::info!("tool registry ready");

    let session_locks = Arc::new(SessionLockMap::new());

    let manager = Manager::new(
        config.clone(),
        bus.clone(),
        sessions.clone(),
        providers.clone(),
        ledger.clone(),
        prompts.clone(),
        snapshots.clone(),
        vcs.clone(),
        tools.clone(),
        workdir.clone(),
    );

    let api_token_hash = read_bearer_token_hash(API_TOKEN_ENV);

    let state = AppState {
        config,
        bus,
        providers,
        sessions: sessions.clone(),
        lifecycle,
        session_locks,
        ledger,
        snapshots,
        vcs,
        tools,
        process_manager,
        prompts,
        manager,
        api_token_hash,
        workdir,
    };

    // Periodic session flush so a crash doesn't lose more than a few seconds
    // of transcript/task state.
    {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                if let Err(e) = sessions.flush() {
                    tracing::warn!(error = %e, "session store flush failed");
                }
            }
        });
    }

    let app = http::router(state.clone());

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "kory gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

fn read_bearer_token_hash(env_var: &str) -> Option<Vec<u8>> {
    match std::env::var(env_var) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var = %env_var, "API bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(env_var = %env_var, "API bearer-token auth DISABLED — set {env_var} to enable");
            None
        }
    }
}
