use serde::{Deserialize, Serialize};

/// `safety.{maxTokensPerTurn, maxFileSizeBytes, toolExecutionTimeoutMs}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "d_max_tokens_per_turn")]
    pub max_tokens_per_turn: u32,
    #[serde(default = "d_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default = "d_tool_execution_timeout_ms")]
    pub tool_execution_timeout_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_turn: d_max_tokens_per_turn(),
            max_file_size_bytes: d_max_file_size_bytes(),
            tool_execution_timeout_ms: d_tool_execution_timeout_ms(),
        }
    }
}

/// `interaction.{clarifyFirstEnabled, maxClarifyQuestions<=4}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    #[serde(default = "d_true")]
    pub clarify_first_enabled: bool,
    #[serde(default = "d_max_clarify_questions")]
    pub max_clarify_questions: u8,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            clarify_first_enabled: d_true(),
            max_clarify_questions: d_max_clarify_questions(),
        }
    }
}

fn d_max_tokens_per_turn() -> u32 {
    4096
}
fn d_max_file_size_bytes() -> u64 {
    10 * 1024 * 1024
}
fn d_tool_execution_timeout_ms() -> u64 {
    60_000
}
fn d_true() -> bool {
    true
}
fn d_max_clarify_questions() -> u8 {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_defaults_match_spec() {
        let s = SafetyConfig::default();
        assert_eq!(s.max_tokens_per_turn, 4096);
        assert_eq!(s.tool_execution_timeout_ms, 60_000);
    }

    #[test]
    fn interaction_default_caps_at_four_questions() {
        let i = InteractionConfig::default();
        assert!(i.max_clarify_questions <= 4);
    }
}
