use serde::{Deserialize, Serialize};

/// LLM model capabilities — every {provider, model} advertises these.
/// The router uses capabilities to select models by role, not by provider name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCapabilities {
    pub supports_tools: ToolSupport,
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
    pub supports_vision: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for LlmCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: ToolSupport::None,
            supports_streaming: false,
            supports_json_mode: false,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        }
    }
}

/// Tool support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSupport {
    /// No tool calling support.
    None,
    /// Basic tool calling (function calling).
    Basic,
    /// Strict JSON schema-validated tool calling.
    StrictJson,
}

/// Model roles — each maps to a routing policy.
///
/// These select a *tier* of model (the Manager's own classifier/planner
/// calls vs. a worker's execution calls). `Domain` below is orthogonal:
/// it selects which worker specialization handles a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Classifies complexity / extracts clarification questions (cheap + fast).
    Classifier,
    /// Decides tool calls / decomposition (needs tools + json mode).
    Planner,
    /// Does heavy lifting with tools (needs tools + streaming).
    Executor,
    /// Compresses context / creates session summaries (cheap + fast).
    Summarizer,
}

/// Worker domain specialization, used to pick a system prompt and a
/// model assignment for a complex-path task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Frontend,
    Backend,
    General,
    Review,
    Test,
    Critic,
}

impl Domain {
    /// Keyword shortcut used by the Manager before falling back to a
    /// model call for domain classification.
    pub fn from_keywords(text: &str) -> Option<Domain> {
        let lower = text.to_lowercase();
        const FRONTEND: &[&str] = &["component", "css", "ui", "frontend", "react", "html"];
        const BACKEND: &[&str] = &["api", "database", "server", "backend", "endpoint", "sql"];
        const REVIEW: &[&str] = &["review", "audit", "lint"];
        const TEST: &[&str] = &["test", "spec", "unit test", "coverage"];
        const CRITIC: &[&str] = &["critique", "evaluate", "assess"];
        if FRONTEND.iter().any(|k| lower.contains(k)) {
            Some(Domain::Frontend)
        } else if BACKEND.iter().any(|k| lower.contains(k)) {
            Some(Domain::Backend)
        } else if REVIEW.iter().any(|k| lower.contains(k)) {
            Some(Domain::Review)
        } else if TEST.iter().any(|k| lower.contains(k)) {
            Some(Domain::Test)
        } else if CRITIC.iter().any(|k| lower.contains(k)) {
            Some(Domain::Critic)
        } else {
            None
        }
    }

    /// The routing table's last-resort hop: a built-in `(provider, modelId)`
    /// pair per domain, used when neither `preferredModel` nor
    /// `config.assignments[domain]` resolves one. Kept as compiled-in
    /// defaults rather than a config file section since every domain must
    /// always resolve to *something* — there is no sensible "unset" state.
    pub fn default_model(self) -> (&'static str, &'static str) {
        match self {
            Domain::Frontend => ("anthropic", "claude-3-5-sonnet-20241022"),
            Domain::Backend => ("anthropic", "claude-3-5-sonnet-20241022"),
            Domain::General => ("anthropic", "claude-3-5-sonnet-20241022"),
            Domain::Review => ("anthropic", "claude-3-5-sonnet-20241022"),
            Domain::Test => ("anthropic", "claude-3-5-sonnet-20241022"),
            Domain::Critic => ("anthropic", "claude-3-5-sonnet-20241022"),
        }
    }

    /// Fixed UI glow color per domain, used by `AgentIdentity` so the
    /// dashboard can color-code spawned workers without a lookup table
    /// of its own.
    pub fn glow_color(self) -> &'static str {
        match self {
            Domain::Frontend => "#38bdf8",
            Domain::Backend => "#a78bfa",
            Domain::General => "#94a3b8",
            Domain::Review => "#fbbf24",
            Domain::Test => "#34d399",
            Domain::Critic => "#f87171",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_shortcut_detects_frontend() {
        assert_eq!(Domain::from_keywords("fix the CSS on the login component"), Some(Domain::Frontend));
    }

    #[test]
    fn keyword_shortcut_falls_through_to_none() {
        assert_eq!(Domain::from_keywords("say hello"), None);
    }

    #[test]
    fn every_domain_has_a_default_model() {
        for domain in [
            Domain::Frontend,
            Domain::Backend,
            Domain::General,
            Domain::Review,
            Domain::Test,
            Domain::Critic,
        ] {
            let (provider, model) = domain.default_model();
            assert!(!provider.is_empty());
            assert!(!model.is_empty());
        }
    }
}
