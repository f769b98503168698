//! System prompts and the clarification JSON contract.

use serde::Deserialize;

pub const MANAGER_PROMPT: &str = "You are Kory, an AI engineering assistant working directly in the \
user's project. You have full filesystem access and a shell. Use tools to read before you write, \
make the smallest change that satisfies the request, and narrate only what's useful. When you are \
done, stop calling tools.";

pub const WORKER_PROMPT: &str = "You are a Kory worker agent delegated a single task by the manager. \
You are sandboxed to the working directory given in your instructions — never attempt to read or \
write outside it. Follow the plan you were handed, make the smallest change that satisfies it, and \
stop calling tools once the task is complete.";

pub const CLASSIFIER_PROMPT: &str = "Classify the following user request as exactly one word: SIMPLE \
or COMPLEX. SIMPLE means a small, well-scoped, single-file-ish change. COMPLEX means it requires \
planning, touches multiple files or subsystems, or needs a dedicated worker. Respond with only the \
one word.";

pub const CLARIFY_PROMPT: &str = "Decide whether the user's request needs clarification before you \
start. Respond with JSON only, no prose, no code fences. Either:\n\
{\"action\":\"proceed\"}\n\
or\n\
{\"action\":\"clarify\",\"questions\":[\"...\"],\"reason\":\"...\",\"assumptions\":[\"...\"]}\n\
Ask at most a handful of short, targeted questions. Never ask a bare yes/no question unless it \
presents an explicit either/or choice.";

pub const COMMIT_MESSAGE_PROMPT: &str = "Write a single-line conventional-commit message (e.g. \
\"feat: add rate limiter\") summarizing the changes described below. Respond with only the commit \
message, no quotes, no trailing punctuation beyond what's idiomatic.";

/// The manager model's decision after the clarification step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClarifyDecision {
    Proceed,
    Clarify {
        questions: Vec<String>,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        assumptions: Vec<String>,
    },
}

/// Strip fenced code blocks and leading/trailing prose so a model's
/// "helpful" preamble doesn't break JSON parsing.
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end >= start {
                return Some(&trimmed[start..=end]);
            }
        }
    }
    None
}

/// Reject yes/no-only questions unless they present an explicit either/or
/// branch. A handful of common major-branch phrasings are whitelisted even
/// though they start with an auxiliary verb.
pub fn is_disallowed_yes_no(question: &str) -> bool {
    let q = question.trim().to_lowercase();
    const YES_NO_STARTS: &[&str] = &["is ", "are ", "do ", "does ", "can ", "should ", "will "];
    const WHITELIST: &[&str] = &[
        "is it a or b",
        "should i use a or b",
        "do you want a or b",
        "is this for development or production",
        "should this run locally or in ci",
        "is this frontend or backend",
    ];
    if WHITELIST.iter().any(|w| q.contains(w)) {
        return false;
    }
    let starts_yes_no = YES_NO_STARTS.iter().any(|s| q.starts_with(s));
    starts_yes_no && !q.contains(" or ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_strips_fenced_preamble() {
        let raw = "Sure, here you go:\n```json\n{\"action\":\"proceed\"}\n```\nhope that helps";
        assert_eq!(extract_json(raw), Some("{\"action\":\"proceed\"}"));
    }

    #[test]
    fn extract_json_returns_none_without_braces() {
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn disallowed_yes_no_without_branch() {
        assert!(is_disallowed_yes_no("Is this urgent?"));
    }

    #[test]
    fn allowed_yes_no_with_branch() {
        assert!(!is_disallowed_yes_no("Should I use A or B?"));
    }

    #[test]
    fn proceed_decision_parses() {
        let d: ClarifyDecision = serde_json::from_str(r#"{"action":"proceed"}"#).unwrap();
        assert!(matches!(d, ClarifyDecision::Proceed));
    }

    #[test]
    fn clarify_decision_parses_with_defaults() {
        let d: ClarifyDecision =
            serde_json::from_str(r#"{"action":"clarify","questions":["which file?"]}"#).unwrap();
        match d {
            ClarifyDecision::Clarify { questions, reason, assumptions } => {
                assert_eq!(questions, vec!["which file?".to_string()]);
                assert!(reason.is_empty());
                assert!(assumptions.is_empty());
            }
            _ => panic!("expected Clarify"),
        }
    }
}
