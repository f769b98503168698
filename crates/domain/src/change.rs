use serde::{Deserialize, Serialize};

/// One file-level mutation recorded in the Change Ledger (C7).
///
/// Ledger entries are append-only and scoped to a session; they're the
/// source of truth the `changes` API surfaces and what `ApplyChanges`
/// consults when deciding whether a file needs a VCS-restore-or-snapshot
/// rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub session_id: String,
    /// Path relative to the workspace root.
    pub path: String,
    pub operation: ChangeOperation,
    pub lines_added: u32,
    pub lines_deleted: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Edit,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_operation_serializes_lowercase() {
        let json = serde_json::to_string(&ChangeOperation::Edit).unwrap();
        assert_eq!(json, "\"edit\"");
    }
}
