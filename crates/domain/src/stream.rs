use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during LLM streaming (provider-agnostic).
///
/// The Manager's execution loop consumes these and republishes a
/// corresponding `stream.*` event on the event bus for subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text content chunk.
    #[serde(rename = "content_delta")]
    ContentDelta { text: String },

    /// A reasoning/thinking chunk, when the provider exposes one.
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { text: String },

    /// A token usage update. Consumers should take the max seen so far.
    #[serde(rename = "usage_update")]
    UsageUpdate { usage: Usage },

    /// A tool call has started.
    #[serde(rename = "tool_use_start")]
    ToolUseStart { call_id: String, tool_name: String },

    /// Incremental tool call argument data.
    #[serde(rename = "tool_use_delta")]
    ToolUseDelta { call_id: String, delta: String },

    /// A tool call is complete with full (string-encoded) arguments.
    #[serde(rename = "tool_use_stop")]
    ToolUseStop { call_id: String, tool_name: String, arguments: String },

    /// Stream is finished.
    #[serde(rename = "complete")]
    Complete {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion. Fields only ever grow within a single
/// turn — callers report the running max, never a decrease (P2).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Merge another usage reading, keeping the larger value per field.
    pub fn max(&self, other: &Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.max(other.prompt_tokens),
            completion_tokens: self.completion_tokens.max(other.completion_tokens),
            total_tokens: self.total_tokens.max(other.total_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_max_keeps_larger_fields() {
        let a = Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 };
        let b = Usage { prompt_tokens: 8, completion_tokens: 12, total_tokens: 20 };
        let m = a.max(&b);
        assert_eq!(m.prompt_tokens, 10);
        assert_eq!(m.completion_tokens, 12);
        assert_eq!(m.total_tokens, 20);
    }

    #[test]
    fn content_delta_serializes_with_tag() {
        let ev = StreamEvent::ContentDelta { text: "hi".into() };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "content_delta");
        assert_eq!(json["text"], "hi");
    }
}
