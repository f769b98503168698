use serde::Serialize;

/// Structured trace events emitted across the Kory crates.
///
/// These are not `tracing` log lines — they're the dedicated, replayable
/// per-run event taxonomy described in the orchestrator's tracing sink
/// (every event also gets mirrored into a per-process JSON-lines file via
/// `TraceEvent::emit`, independent of whatever `RUST_LOG` filter is active).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    /// Manager classified a request as SIMPLE or COMPLEX.
    ComplexityClassification {
        session_id: String,
        complexity: String,
        shortcut: bool,
        duration_ms: u64,
    },
    /// A step-by-step plan was streamed for a complex-path run.
    Planning {
        session_id: String,
        agent_id: String,
        plan_chars: usize,
        duration_ms: u64,
    },
    /// One LLM turn completed (success or final failure after fallback).
    LlmTurn {
        session_id: String,
        agent_id: String,
        provider: String,
        model: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
        fell_back: bool,
    },
    /// A single tool call executed.
    ToolExecution {
        session_id: String,
        agent_id: String,
        tool_name: String,
        is_error: bool,
        duration_ms: u64,
    },
    /// The execution loop (fast or complex path) ran to completion.
    ExecutionLoopComplete {
        session_id: String,
        agent_id: String,
        turns: u32,
        reason: String,
    },
    /// A clarification-gate sub-step.
    ClarificationAsked {
        session_id: String,
        request_id: String,
        question: String,
    },
    ClarificationResolved {
        session_id: String,
        request_id: String,
        timed_out: bool,
    },
    ClarificationSkipped {
        session_id: String,
        reason: String,
    },
    /// Fast-path (direct) execution was chosen.
    DirectExecution { session_id: String, reason: String },
    /// Commit-message synthesis for a complex-path run.
    CommitMessageGen {
        session_id: String,
        used_fallback: bool,
        message: String,
    },
    /// One LLM provider hop failed and the router advanced to the next.
    LlmFallback {
        session_id: String,
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    SessionResolved {
        session_key: String,
        session_id: String,
        is_new: bool,
    },
    SessionReset {
        session_key: String,
        old_session_id: String,
        new_session_id: String,
        reason: String,
    },
    TranscriptAppend {
        session_id: String,
        lines: usize,
    },
}

impl TraceEvent {
    /// Emit via `tracing` (captured by whatever subscriber is installed)
    /// *and* return the serialized JSON line for the caller to additionally
    /// append to the per-run trace file (C10). Writing the file is the
    /// caller's job since only it knows the run's file handle.
    pub fn emit(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "kory_trace");
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_returns_valid_json_with_event_tag() {
        let ev = TraceEvent::DirectExecution {
            session_id: "s1".into(),
            reason: "shortcut".into(),
        };
        let json = ev.emit();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["event"], "direct_execution");
        assert_eq!(parsed["session_id"], "s1");
    }
}
