use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// LLM provider system. `assignments`/`fallbacks` are routing tables keyed
/// the way the Manager's resolution order reads them (see
/// [`crate::capability::Domain`] for the `assignments` key space and model
/// ids for `fallbacks`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Registered providers, keyed by provider name (`"anthropic"`, `"openai"`, …).
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// `assignments[domain] = "provider:modelId"` — routing resolution step 2.
    #[serde(default)]
    pub assignments: HashMap<String, String>,
    /// `fallbacks[modelId] = [modelId, ...]` — depth-first fallback chain.
    #[serde(default)]
    pub fallbacks: HashMap<String, Vec<String>>,
    /// Per-model pricing for cost estimation (key = model id).
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: d_timeout_ms(),
            max_retries: d_max_retries(),
            providers: HashMap::new(),
            assignments: HashMap::new(),
            fallbacks: HashMap::new(),
            pricing: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub selected_models: Option<Vec<String>>,
    #[serde(default)]
    pub hide_model_selector: bool,
    /// Whether this model should be skipped as a fallback-chain hop.
    #[serde(default)]
    pub is_legacy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompat,
    Anthropic,
    Google,
    AzureOpenai,
    AwsBedrock,
}

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_1m + output_tokens as f64 * self.output_per_1m)
            / 1_000_000.0
    }
}

fn d_timeout_ms() -> u64 {
    20_000
}
fn d_max_retries() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_pricing_estimate_cost() {
        let pricing = ModelPricing {
            input_per_1m: 2.50,
            output_per_1m: 10.00,
        };
        let cost = pricing.estimate_cost(1000, 500);
        assert!((cost - 0.0075).abs() < 1e-10);
    }

    #[test]
    fn llm_config_default_has_empty_tables() {
        let config = LlmConfig::default();
        assert!(config.providers.is_empty());
        assert!(config.assignments.is_empty());
        assert!(config.fallbacks.is_empty());
    }

    #[test]
    fn provider_config_deserializes_snake_case() {
        let json = r#"{"api_key":"sk-test","base_url":"https://api.openai.com/v1"}"#;
        let p: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(p.api_key.as_deref(), Some("sk-test"));
        assert_eq!(p.base_url.as_deref(), Some("https://api.openai.com/v1"));
        assert!(!p.disabled);
    }
}
