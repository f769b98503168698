//! Provider registry (C6).
//!
//! Constructs and holds all configured LLM provider instances, resolves a
//! model id to a provider, and drives `ExecuteWithRetry`'s depth-first
//! fallback chain with a per-provider circuit breaker.

use crate::anthropic::AnthropicProvider;
use crate::bedrock::BedrockProvider;
use crate::google::GoogleProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::{ChatRequest, LlmProvider};
use kory_domain::config::llm::{LlmConfig, ProviderConfig, ProviderKind};
use kory_domain::error::{Error, Result};
use kory_domain::stream::{BoxStream, StreamEvent};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Hop bound for the fallback chain (P-guard against misconfigured cycles).
const MAX_FALLBACK_HOPS: usize = 25;
/// Consecutive transient failures before a provider's circuit opens.
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
/// How long an open circuit stays open before allowing a retry probe.
const CIRCUIT_COOLDOWN: Duration = Duration::from_secs(60);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registered provider entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct RegisteredProvider {
    provider: Arc<dyn LlmProvider>,
    cfg: ProviderConfig,
}

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub kind: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_error: Option<String>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_error: None,
        }
    }
}

/// Snapshot of a single provider's health, returned by [`ProviderRegistry::get_status`].
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub disabled: bool,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Mask substrings that look like API keys or bearer tokens in an error
/// message so they never leak to logs, readiness endpoints, or dashboards.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

/// Whether an error represents a transient failure that should advance the
/// fallback chain rather than abort it outright (network blips, 5xx,
/// rate-limiting, provider-reported quota exhaustion).
fn is_transient(err: &Error) -> bool {
    match err {
        Error::Timeout(_) | Error::Http(_) => true,
        Error::Provider { message, .. } => {
            let lower = message.to_lowercase();
            lower.contains("rate limit")
                || lower.contains("429")
                || lower.contains("quota")
                || lower.contains("overloaded")
                || lower.contains("503")
                || lower.contains("502")
                || lower.contains("500")
                || lower.contains("internal server error")
        }
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated LLM providers and drives model-id resolution,
/// fallback-chain retry, and per-provider circuit breaking.
pub struct ProviderRegistry {
    providers: HashMap<String, RegisteredProvider>,
    fallbacks: HashMap<String, Vec<String>>,
    circuits: Mutex<HashMap<String, Circuit>>,
    init_errors: Vec<ProviderInitError>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Each entry in `config.providers` is instantiated using the adapter
    /// matching its `kind`. Providers that fail to initialize (usually
    /// missing credentials) are logged and skipped rather than aborting
    /// startup; see [`Self::init_errors`].
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut providers = HashMap::new();
        let mut init_errors = Vec::new();

        for (id, cfg) in &config.providers {
            if cfg.disabled {
                continue;
            }
            let result: Result<Arc<dyn LlmProvider>> = match cfg.kind {
                ProviderKind::OpenaiCompat | ProviderKind::AzureOpenai => {
                    OpenAiCompatProvider::from_config(id, cfg)
                        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
                ProviderKind::Anthropic => AnthropicProvider::from_config(id, cfg)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                ProviderKind::Google => GoogleProvider::from_config(id, cfg)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                ProviderKind::AwsBedrock => BedrockProvider::from_config(id, cfg)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %id, kind = ?cfg.kind, "registered LLM provider");
                    providers.insert(
                        id.clone(),
                        RegisteredProvider {
                            provider,
                            cfg: cfg.clone(),
                        },
                    );
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %id,
                        kind = ?cfg.kind,
                        error = %safe_error,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: id.clone(),
                        kind: format!("{:?}", cfg.kind),
                        error: safe_error,
                    });
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            tracing::warn!(
                failed_providers = init_errors.len(),
                "no LLM providers initialized; gateway will boot but LLM \
                 endpoints will fail until credentials are configured"
            );
        }

        Self {
            providers,
            fallbacks: config.fallbacks.clone(),
            circuits: Mutex::new(HashMap::new()),
            init_errors,
        }
    }

    // ── Resolution ─────────────────────────────────────────────────

    /// Resolve a provider able to serve `model_id`, preferring
    /// `preferred_provider` when given and available.
    pub fn resolve_provider(
        &self,
        model_id: &str,
        preferred_provider: Option<&str>,
    ) -> Option<Arc<dyn LlmProvider>> {
        if let Some(name) = preferred_provider {
            if let Some(p) = self.serves_model(name, model_id) {
                return Some(p);
            }
        }
        for (name, entry) in &self.providers {
            if entry.cfg.is_legacy {
                continue;
            }
            if self.circuit_is_open(name) {
                continue;
            }
            if Self::provider_serves(&entry.cfg, model_id) {
                return Some(entry.provider.clone());
            }
        }
        None
    }

    fn serves_model(&self, provider_name: &str, model_id: &str) -> Option<Arc<dyn LlmProvider>> {
        let entry = self.providers.get(provider_name)?;
        if entry.cfg.is_legacy || self.circuit_is_open(provider_name) {
            return None;
        }
        if Self::provider_serves(&entry.cfg, model_id) {
            Some(entry.provider.clone())
        } else {
            None
        }
    }

    fn provider_serves(cfg: &ProviderConfig, model_id: &str) -> bool {
        match &cfg.selected_models {
            Some(models) => models.iter().any(|m| m == model_id),
            None => true,
        }
    }

    /// Provider names currently available (enabled, not circuit-open).
    pub fn get_available(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .iter()
            .filter(|(name, entry)| !entry.cfg.is_legacy && !self.circuit_is_open(name))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Build the depth-first, deduped, hop-bounded model-id fallback chain
    /// starting at `model_id`.
    fn build_chain(&self, model_id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![model_id.to_string()];

        while let Some(next) = stack.pop() {
            if chain.len() >= MAX_FALLBACK_HOPS {
                break;
            }
            if !seen.insert(next.clone()) {
                continue;
            }
            chain.push(next.clone());
            if let Some(fallbacks) = self.fallbacks.get(&next) {
                for f in fallbacks.iter().rev() {
                    if !seen.contains(f) {
                        stack.push(f.clone());
                    }
                }
            }
        }

        chain
    }

    /// Run `ExecuteWithRetry`: try `(preferredProvider, modelId)` then each
    /// hop of the fallback chain in order, skipping legacy/circuit-open
    /// providers, advancing on transient failure.
    pub async fn execute_with_retry(
        &self,
        request: &ChatRequest,
        preferred_provider: Option<&str>,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model_id = request.model.clone().ok_or_else(|| {
            Error::Config("execute_with_retry requires request.model to be set".into())
        })?;

        let chain = self.build_chain(&model_id);
        let mut last_err: Option<Error> = None;

        for (i, hop_model) in chain.iter().enumerate() {
            let preferred = if i == 0 { preferred_provider } else { None };
            let provider = match self.resolve_provider(hop_model, preferred) {
                Some(p) => p,
                None => continue,
            };

            let mut hop_req = request.clone();
            hop_req.model = Some(hop_model.clone());

            tracing::debug!(
                provider_id = %provider.provider_id(),
                model = %hop_model,
                hop = i,
                "executing LLM hop"
            );

            match provider.chat_stream(&hop_req).await {
                Ok(stream) => {
                    self.record_success(provider.provider_id());
                    return Ok(stream);
                }
                Err(e) => {
                    let transient = is_transient(&e);
                    self.record_failure(provider.provider_id(), &e);
                    last_err = Some(e);
                    if !transient {
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::Provider {
                provider: "registry".into(),
                message: format!(
                    "no available provider could serve model '{}' (chain exhausted)",
                    model_id
                ),
            }
        }))
    }

    // ── Credential management ────────────────────────────────────────

    /// Replace a provider's credentials at runtime and re-register it.
    pub fn set_credentials(&mut self, provider_id: &str, api_key: String) -> Result<()> {
        let entry = self
            .providers
            .get(provider_id)
            .ok_or_else(|| Error::Config(format!("unknown provider '{}'", provider_id)))?;
        let mut cfg = entry.cfg.clone();
        cfg.api_key = Some(api_key);

        let provider: Arc<dyn LlmProvider> = match cfg.kind {
            ProviderKind::OpenaiCompat | ProviderKind::AzureOpenai => {
                Arc::new(OpenAiCompatProvider::from_config(provider_id, &cfg)?)
            }
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(provider_id, &cfg)?),
            ProviderKind::Google => Arc::new(GoogleProvider::from_config(provider_id, &cfg)?),
            ProviderKind::AwsBedrock => Arc::new(BedrockProvider::from_config(provider_id, &cfg)?),
        };

        self.providers
            .insert(provider_id.to_string(), RegisteredProvider { provider, cfg });
        self.reset_circuit(provider_id);
        Ok(())
    }

    /// Remove a provider's stored API key, leaving it registered but
    /// unable to authenticate until credentials are re-supplied.
    pub fn remove_api_key(&mut self, provider_id: &str) -> Result<()> {
        let entry = self
            .providers
            .get(provider_id)
            .ok_or_else(|| Error::Config(format!("unknown provider '{}'", provider_id)))?;
        let mut cfg = entry.cfg.clone();
        cfg.api_key = None;
        cfg.auth_token = None;
        self.providers.remove(provider_id);

        let provider: Result<Arc<dyn LlmProvider>> = match cfg.kind {
            ProviderKind::OpenaiCompat | ProviderKind::AzureOpenai => {
                OpenAiCompatProvider::from_config(provider_id, &cfg)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
            }
            ProviderKind::Anthropic => AnthropicProvider::from_config(provider_id, &cfg)
                .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            ProviderKind::Google => GoogleProvider::from_config(provider_id, &cfg)
                .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
            ProviderKind::AwsBedrock => BedrockProvider::from_config(provider_id, &cfg)
                .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
        };

        if let Ok(provider) = provider {
            self.providers
                .insert(provider_id.to_string(), RegisteredProvider { provider, cfg });
        }
        Ok(())
    }

    /// Perform a cheap request against a provider to confirm its
    /// credentials are valid.
    pub async fn verify_connection(&self, provider_id: &str) -> Result<()> {
        let entry = self
            .providers
            .get(provider_id)
            .ok_or_else(|| Error::Config(format!("unknown provider '{}'", provider_id)))?;

        let req = ChatRequest {
            messages: vec![kory_domain::tool::Message::user("ping")],
            max_tokens: Some(1),
            ..Default::default()
        };

        match entry.provider.chat(&req).await {
            Ok(_) => {
                self.record_success(provider_id);
                Ok(())
            }
            Err(e) => {
                self.record_failure(provider_id, &e);
                Err(e)
            }
        }
    }

    // ── Status / circuit breaker ──────────────────────────────────────

    fn circuit_is_open(&self, provider_id: &str) -> bool {
        let mut circuits = self.circuits.lock().expect("circuit lock poisoned");
        let circuit = circuits.entry(provider_id.to_string()).or_default();
        if circuit.state == CircuitState::Open {
            if let Some(opened_at) = circuit.opened_at {
                if opened_at.elapsed() >= CIRCUIT_COOLDOWN {
                    // Cooldown elapsed: allow a single probe through by
                    // half-closing (treated as closed for this check).
                    circuit.state = CircuitState::Closed;
                    circuit.consecutive_failures = 0;
                    return false;
                }
            }
            return true;
        }
        false
    }

    fn record_success(&self, provider_id: &str) {
        let mut circuits = self.circuits.lock().expect("circuit lock poisoned");
        let circuit = circuits.entry(provider_id.to_string()).or_default();
        circuit.state = CircuitState::Closed;
        circuit.consecutive_failures = 0;
        circuit.opened_at = None;
        circuit.last_error = None;
    }

    fn record_failure(&self, provider_id: &str, err: &Error) {
        let mut circuits = self.circuits.lock().expect("circuit lock poisoned");
        let circuit = circuits.entry(provider_id.to_string()).or_default();
        circuit.consecutive_failures += 1;
        circuit.last_error = Some(mask_secrets(&err.to_string()));
        if circuit.consecutive_failures >= CIRCUIT_FAILURE_THRESHOLD {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Instant::now());
        }
    }

    fn reset_circuit(&self, provider_id: &str) {
        let mut circuits = self.circuits.lock().expect("circuit lock poisoned");
        circuits.remove(provider_id);
    }

    /// Health snapshot for every registered provider.
    pub fn get_status(&self) -> Vec<ProviderStatus> {
        let circuits = self.circuits.lock().expect("circuit lock poisoned");
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let entry = &self.providers[name];
                let circuit = circuits.get(name);
                ProviderStatus {
                    provider_id: name.clone(),
                    disabled: entry.cfg.disabled,
                    circuit_state: circuit.map(|c| c.state).unwrap_or(CircuitState::Closed),
                    consecutive_failures: circuit.map(|c| c.consecutive_failures).unwrap_or(0),
                    last_error: circuit.and_then(|c| c.last_error.clone()),
                }
            })
            .collect()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Provider initialization errors (empty if all succeeded).
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(kind: ProviderKind, api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            kind,
            api_key: api_key.map(String::from),
            ..Default::default()
        }
    }

    fn test_config() -> LlmConfig {
        let mut providers = HashMap::new();
        providers.insert(
            "anthropic".to_string(),
            cfg(ProviderKind::Anthropic, Some("sk-ant-test")),
        );
        providers.insert(
            "openai".to_string(),
            cfg(ProviderKind::OpenaiCompat, Some("sk-oai-test")),
        );

        let mut fallbacks = HashMap::new();
        fallbacks.insert(
            "claude-sonnet-4-20250514".to_string(),
            vec!["gpt-4o".to_string()],
        );

        LlmConfig {
            providers,
            fallbacks,
            ..Default::default()
        }
    }

    #[test]
    fn registry_registers_all_providers() {
        let reg = ProviderRegistry::from_config(&test_config());
        assert_eq!(reg.len(), 2);
        assert!(reg.init_errors().is_empty());
    }

    #[test]
    fn skips_disabled_providers() {
        let mut config = test_config();
        config.providers.get_mut("openai").unwrap().disabled = true;
        let reg = ProviderRegistry::from_config(&config);
        assert_eq!(reg.len(), 1);
        assert!(reg.resolve_provider("gpt-4o", Some("openai")).is_none());
    }

    #[test]
    fn resolve_provider_prefers_requested_name() {
        let reg = ProviderRegistry::from_config(&test_config());
        let p = reg
            .resolve_provider("claude-sonnet-4-20250514", Some("anthropic"))
            .unwrap();
        assert_eq!(p.provider_id(), "anthropic");
    }

    #[test]
    fn resolve_provider_falls_back_to_any_matching() {
        let reg = ProviderRegistry::from_config(&test_config());
        // No provider named "missing"; falls through to the any-provider scan.
        let p = reg.resolve_provider("gpt-4o", Some("missing"));
        assert!(p.is_some());
    }

    #[test]
    fn build_chain_dedupes_and_bounds_hops() {
        let mut config = test_config();
        // Create a cycle: a -> b -> a.
        config
            .fallbacks
            .insert("a".into(), vec!["b".into()]);
        config.fallbacks.insert("b".into(), vec!["a".into()]);
        let reg = ProviderRegistry::from_config(&config);
        let chain = reg.build_chain("a");
        assert_eq!(chain, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn legacy_provider_is_skipped() {
        let mut config = test_config();
        config.providers.get_mut("anthropic").unwrap().is_legacy = true;
        let reg = ProviderRegistry::from_config(&config);
        assert!(reg
            .resolve_provider("claude-sonnet-4-20250514", Some("anthropic"))
            .is_none());
    }

    #[test]
    fn circuit_opens_after_repeated_failures() {
        let reg = ProviderRegistry::from_config(&test_config());
        for _ in 0..CIRCUIT_FAILURE_THRESHOLD {
            reg.record_failure(
                "anthropic",
                &Error::Http("boom".into()),
            );
        }
        assert!(reg.circuit_is_open("anthropic"));
        let status = reg.get_status();
        let anthropic = status.iter().find(|s| s.provider_id == "anthropic").unwrap();
        assert_eq!(anthropic.circuit_state, CircuitState::Open);
        assert_eq!(anthropic.consecutive_failures, CIRCUIT_FAILURE_THRESHOLD);
    }

    #[test]
    fn success_resets_circuit() {
        let reg = ProviderRegistry::from_config(&test_config());
        reg.record_failure("anthropic", &Error::Http("boom".into()));
        reg.record_success("anthropic");
        let status = reg.get_status();
        let anthropic = status.iter().find(|s| s.provider_id == "anthropic").unwrap();
        assert_eq!(anthropic.consecutive_failures, 0);
        assert_eq!(anthropic.circuit_state, CircuitState::Closed);
    }

    #[test]
    fn get_available_excludes_open_circuits() {
        let reg = ProviderRegistry::from_config(&test_config());
        for _ in 0..CIRCUIT_FAILURE_THRESHOLD {
            reg.record_failure("anthropic", &Error::Http("boom".into()));
        }
        let available = reg.get_available();
        assert!(!available.contains(&"anthropic".to_string()));
        assert!(available.contains(&"openai".to_string()));
    }
}
