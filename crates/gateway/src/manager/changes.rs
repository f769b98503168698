//! `ApplyChanges` — reconciles the ledger's accept/reject decision against
//! the filesystem, preferring VCS when available and falling back to the
//! snapshot store otherwise.

use std::collections::HashMap;
use std::path::Path;

use kory_domain::change::{ChangeOperation, ChangeSummary};
use kory_domain::error::{Error, Result};
use kory_ledger::{ApplyChangesRequest, ApplyOutcome, ChangeLedger};
use kory_snapshot::SnapshotStore;
use kory_vcs::VcsAdapter;

/// Apply an accept/reject decision for a session's pending changes.
///
/// The ledger only tells us *which paths* to restore, not how they were
/// created, so the path→operation map must be captured from `ledger.get`
/// before calling `ledger.apply` — by the time `apply` returns, the entries
/// for restored paths are already gone.
pub async fn apply_session_changes(
    ledger: &ChangeLedger,
    vcs: Option<&VcsAdapter>,
    snapshots: &SnapshotStore,
    workdir: &Path,
    session_id: &str,
    good_hash: Option<&str>,
    req: ApplyChangesRequest,
) -> Result<ApplyOutcome> {
    let pre: HashMap<String, ChangeOperation> = ledger
        .get(session_id)
        .into_iter()
        .map(|c: ChangeSummary| (c.path, c.operation))
        .collect();

    let reject_all = req.reject_all;
    let outcome = ledger.apply(session_id, req);

    if outcome.to_restore.is_empty() {
        return Ok(outcome);
    }

    if reject_all {
        if let (Some(vcs), Some(hash)) = (vcs, good_hash) {
            vcs.rollback(hash.to_string()).await?;
            return Ok(outcome);
        }
        restore_via_snapshot(snapshots, workdir, session_id, &outcome.to_restore).await?;
        return Ok(outcome);
    }

    for path in &outcome.to_restore {
        let operation = pre.get(path).copied().unwrap_or(ChangeOperation::Edit);
        if operation == ChangeOperation::Create {
            let abs = workdir.join(path);
            if tokio::fs::try_exists(&abs).await.map_err(Error::Io)? {
                tokio::fs::remove_file(&abs).await.map_err(Error::Io)?;
            }
            continue;
        }

        if let Some(vcs) = vcs {
            if vcs.restore_file(path.clone()).await.is_ok() {
                continue;
            }
        }
        restore_via_snapshot(snapshots, workdir, session_id, std::slice::from_ref(path)).await?;
    }

    Ok(outcome)
}

async fn restore_via_snapshot(
    snapshots: &SnapshotStore,
    workdir: &Path,
    session_id: &str,
    paths: &[String],
) -> Result<()> {
    let (_, missing) = snapshots
        .restore_files(workdir, session_id, "latest", paths)
        .await?;
    if !missing.is_empty() {
        return Err(Error::Storage(format!(
            "no snapshot entry for {} path(s): {}",
            missing.len(),
            missing.join(", ")
        )));
    }
    Ok(())
}
