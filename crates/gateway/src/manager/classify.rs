//! Complexity and domain classification — the second pipeline step.

use kory_domain::capability::Domain;
use kory_domain::error::Result;
use kory_domain::tool::Message;
use kory_providers::registry::ProviderRegistry;
use kory_providers::traits::ChatRequest;

use super::prompts::CLASSIFIER_PROMPT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

/// Ask the classifier model whether a request is simple or complex.
/// Any response other than a clean "complex" is treated as simple —
/// the fast path is the safe default on an ambiguous or malformed reply.
pub async fn classify_complexity(
    providers: &ProviderRegistry,
    model: &str,
    preferred_provider: Option<&str>,
    text: &str,
) -> Result<Complexity> {
    let provider = providers.resolve_provider(model, preferred_provider);
    let Some(provider) = provider else {
        tracing::warn!(model, "classifier model unavailable, defaulting to simple");
        return Ok(Complexity::Simple);
    };

    let request = ChatRequest {
        messages: vec![Message::system(CLASSIFIER_PROMPT), Message::user(text)],
        model: Some(model.to_string()),
        max_tokens: Some(8),
        ..Default::default()
    };

    let response = match provider.chat(&request).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "classifier call failed, defaulting to simple");
            return Ok(Complexity::Simple);
        }
    };

    let answer = response.content.trim().to_lowercase();
    if answer.contains("complex") {
        Ok(Complexity::Complex)
    } else {
        Ok(Complexity::Simple)
    }
}

/// Resolve a task's domain: keyword shortcut first, model call only when
/// the keywords don't match anything. A classifier miss degrades to
/// `General` with a warning rather than failing the run.
pub async fn classify_domain(
    providers: &ProviderRegistry,
    model: &str,
    preferred_provider: Option<&str>,
    text: &str,
) -> Domain {
    if let Some(domain) = Domain::from_keywords(text) {
        return domain;
    }

    let Some(provider) = providers.resolve_provider(model, preferred_provider) else {
        tracing::warn!("domain classifier model unavailable, defaulting to General");
        return Domain::General;
    };

    let prompt = "Classify this request into exactly one word: frontend, backend, general, \
review, test, or critic. Respond with only the word.";
    let request = ChatRequest {
        messages: vec![Message::system(prompt), Message::user(text)],
        model: Some(model.to_string()),
        max_tokens: Some(8),
        ..Default::default()
    };

    match provider.chat(&request).await {
        Ok(response) => domain_from_word(&response.content).unwrap_or_else(|| {
            tracing::warn!(raw = %response.content, "unrecognized domain classification, defaulting to General");
            Domain::General
        }),
        Err(e) => {
            tracing::warn!(error = %e, "domain classifier call failed, defaulting to General");
            Domain::General
        }
    }
}

fn domain_from_word(word: &str) -> Option<Domain> {
    match word.trim().to_lowercase().as_str() {
        "frontend" => Some(Domain::Frontend),
        "backend" => Some(Domain::Backend),
        "general" => Some(Domain::General),
        "review" => Some(Domain::Review),
        "test" => Some(Domain::Test),
        "critic" => Some(Domain::Critic),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_from_word_recognizes_all_variants() {
        assert_eq!(domain_from_word("Frontend"), Some(Domain::Frontend));
        assert_eq!(domain_from_word("backend"), Some(Domain::Backend));
        assert_eq!(domain_from_word("  Critic  "), Some(Domain::Critic));
        assert_eq!(domain_from_word("nonsense"), None);
    }
}
