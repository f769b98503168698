//! Session, message, and task storage for Kory (C2).
//!
//! Gateway-owned state: a `Session` per conversation, its `StoredMessage`
//! history, and any `Task`s dispatched to complex-path workers. Backed by
//! a JSON file with an append-only per-session transcript and an
//! in-memory full-text search index, with configurable reset lifecycle.

pub mod lifecycle;
pub mod search;
pub mod store;
pub mod transcript;

pub use lifecycle::{LifecycleManager, ResetReason};
pub use search::{SearchHit, TranscriptIndex};
pub use store::{SessionPatch, SessionStore, TaskPatch};
pub use transcript::TranscriptWriter;
