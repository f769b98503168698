//! Per-session change ledger (C7) — pending file changes awaiting the
//! user's accept/reject decision.
//!
//! This crate only tracks bookkeeping: which paths changed and how. It
//! does not touch the filesystem or VCS itself — `apply` tells the
//! caller (the Manager) which paths need a rollback so it can drive
//! [`kory_vcs::VcsAdapter`] or the snapshot store accordingly.

use std::collections::HashMap;

use kory_domain::change::ChangeSummary;
use parking_lot::Mutex;

#[derive(Debug, Default, Clone)]
pub struct ApplyChangesRequest {
    pub accept_all: bool,
    pub reject_all: bool,
    pub accept_paths: Vec<String>,
    pub reject_paths: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// Paths that must be rolled back (restored to their pre-change state).
    pub to_restore: Vec<String>,
    /// Paths still pending after this operation.
    pub remaining: Vec<ChangeSummary>,
}

#[derive(Default)]
pub struct ChangeLedger {
    by_session: Mutex<HashMap<String, Vec<ChangeSummary>>>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, change: ChangeSummary) {
        self.by_session
            .lock()
            .entry(change.session_id.clone())
            .or_default()
            .push(change);
    }

    pub fn get(&self, session_id: &str) -> Vec<ChangeSummary> {
        self.by_session
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear(&self, session_id: &str) {
        self.by_session.lock().remove(session_id);
    }

    /// Apply an accept/reject decision, mutating the ledger and returning
    /// which paths need a filesystem/VCS rollback.
    ///
    /// - `reject_all` restores every pending path and empties the ledger (P4).
    /// - `accept_all` empties the ledger with nothing to restore; calling it
    ///   twice in a row is a no-op the second time (P5).
    /// - Otherwise, `reject_paths` are restored and removed; `accept_paths`
    ///   (or any path named in neither list, which is treated as accepted by
    ///   omission) are simply removed from the ledger.
    pub fn apply(&self, session_id: &str, req: ApplyChangesRequest) -> ApplyOutcome {
        let mut guard = self.by_session.lock();
        let entries = guard.entry(session_id.to_string()).or_default();

        if req.reject_all {
            let to_restore = entries.iter().map(|c| c.path.clone()).collect();
            entries.clear();
            return ApplyOutcome {
                to_restore,
                remaining: Vec::new(),
            };
        }
        if req.accept_all {
            entries.clear();
            return ApplyOutcome {
                to_restore: Vec::new(),
                remaining: Vec::new(),
            };
        }

        let reject_set: std::collections::HashSet<&str> =
            req.reject_paths.iter().map(String::as_str).collect();
        let accept_set: std::collections::HashSet<&str> =
            req.accept_paths.iter().map(String::as_str).collect();

        let to_restore: Vec<String> = entries
            .iter()
            .filter(|c| reject_set.contains(c.path.as_str()))
            .map(|c| c.path.clone())
            .collect();

        entries.retain(|c| {
            let path = c.path.as_str();
            !(reject_set.contains(path) || accept_set.contains(path))
        });

        ApplyOutcome {
            to_restore,
            remaining: entries.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kory_domain::change::ChangeOperation;

    fn change(session: &str, path: &str) -> ChangeSummary {
        ChangeSummary {
            session_id: session.to_string(),
            path: path.to_string(),
            operation: ChangeOperation::Edit,
            lines_added: 1,
            lines_deleted: 1,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn append_and_get_roundtrip() {
        let ledger = ChangeLedger::new();
        ledger.append(change("s1", "a.ts"));
        ledger.append(change("s1", "b.ts"));
        assert_eq!(ledger.get("s1").len(), 2);
        assert_eq!(ledger.get("s2").len(), 0);
    }

    #[test]
    fn reject_all_restores_everything_and_clears() {
        let ledger = ChangeLedger::new();
        ledger.append(change("s1", "a.ts"));
        ledger.append(change("s1", "b.ts"));
        let outcome = ledger.apply(
            "s1",
            ApplyChangesRequest {
                reject_all: true,
                ..Default::default()
            },
        );
        assert_eq!(outcome.to_restore.len(), 2);
        assert!(outcome.remaining.is_empty());
        assert!(ledger.get("s1").is_empty());
    }

    #[test]
    fn accept_all_is_idempotent() {
        let ledger = ChangeLedger::new();
        ledger.append(change("s1", "a.ts"));
        let req = || ApplyChangesRequest {
            accept_all: true,
            ..Default::default()
        };
        let first = ledger.apply("s1", req());
        let second = ledger.apply("s1", req());
        assert!(first.to_restore.is_empty());
        assert!(second.to_restore.is_empty());
        assert!(ledger.get("s1").is_empty());
    }

    #[test]
    fn reject_single_path_leaves_others_pending() {
        let ledger = ChangeLedger::new();
        ledger.append(change("s1", "a.ts"));
        ledger.append(change("s1", "b.ts"));
        let outcome = ledger.apply(
            "s1",
            ApplyChangesRequest {
                reject_paths: vec!["a.ts".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(outcome.to_restore, vec!["a.ts".to_string()]);
        assert_eq!(outcome.remaining.len(), 1);
        assert_eq!(outcome.remaining[0].path, "b.ts");
    }
}
