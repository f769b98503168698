//! The clarification gate — the pipeline's first step.

use kory_domain::config::InteractionConfig;
use kory_domain::error::Result;
use kory_domain::tool::Message;
use kory_providers::registry::ProviderRegistry;
use kory_providers::traits::ChatRequest;

use super::prompts::{extract_json, is_disallowed_yes_no, ClarifyDecision, CLARIFY_PROMPT};

pub enum ClarifyResult {
    Proceed,
    NeedsClarification { questions: Vec<String>, reason: String },
}

/// Run the clarify step. Disabled entirely via
/// `InteractionConfig::clarify_first_enabled`; otherwise asks the
/// classifier model to decide, falling back to `Proceed` on any
/// unparseable or failed response — never let a broken clarify call
/// block a request.
pub async fn run_clarify(
    providers: &ProviderRegistry,
    model: &str,
    preferred_provider: Option<&str>,
    interaction: &InteractionConfig,
    text: &str,
) -> Result<ClarifyResult> {
    if !interaction.clarify_first_enabled {
        return Ok(ClarifyResult::Proceed);
    }

    let Some(provider) = providers.resolve_provider(model, preferred_provider) else {
        tracing::warn!(model, "clarify model unavailable, proceeding without clarification");
        return Ok(ClarifyResult::Proceed);
    };

    let request = ChatRequest {
        messages: vec![Message::system(CLARIFY_PROMPT), Message::user(text)],
        model: Some(model.to_string()),
        json_mode: true,
        max_tokens: Some(512),
        ..Default::default()
    };

    let response = match provider.chat(&request).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "clarify call failed, proceeding without clarification");
            return Ok(ClarifyResult::Proceed);
        }
    };

    let Some(json) = extract_json(&response.content) else {
        tracing::warn!(raw = %response.content, "clarify response wasn't JSON, proceeding");
        return Ok(ClarifyResult::Proceed);
    };

    let decision: ClarifyDecision = match serde_json::from_str(json) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, raw = %json, "clarify response didn't match the contract, proceeding");
            return Ok(ClarifyResult::Proceed);
        }
    };

    match decision {
        ClarifyDecision::Proceed => Ok(ClarifyResult::Proceed),
        ClarifyDecision::Clarify { mut questions, reason, .. } => {
            questions.retain(|q| !is_disallowed_yes_no(q));
            questions.truncate(interaction.max_clarify_questions as usize);
            if questions.is_empty() {
                Ok(ClarifyResult::Proceed)
            } else {
                Ok(ClarifyResult::NeedsClarification { questions, reason })
            }
        }
    }
}
