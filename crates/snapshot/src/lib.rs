//! File-level pre-change backups keyed by (session, label) — C3.
//!
//! A snapshot is a flat copy of every file named in the request, taken
//! before the Manager lets a worker touch them, plus a JSON manifest
//! recording what was copied from where. `RestoreFiles` reverses the
//! copy; it's the fallback rollback path for files that live outside a
//! VCS-tracked repo (see the VCS adapter, C4, for the git-backed path).

use std::path::{Component, Path, PathBuf};

use kory_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub session_id: String,
    pub label: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub relative_path: String,
    pub existed: bool,
}

pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// `root` holds one subdirectory per `(session_id, label)` pair.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn snapshot_dir(&self, session_id: &str, label: &str) -> PathBuf {
        self.root.join(session_id).join(label)
    }

    /// Copy the current contents of `paths` (relative to `workdir`) into
    /// the snapshot directory, recording a manifest. Paths that don't yet
    /// exist are recorded as `existed: false` so restore knows to delete
    /// them on rollback instead of copying nothing back.
    pub async fn create(
        &self,
        workdir: &Path,
        session_id: &str,
        label: &str,
        paths: &[String],
    ) -> Result<SnapshotManifest> {
        let dir = self.snapshot_dir(session_id, label);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Storage(format!("creating snapshot dir: {e}")))?;

        let mut entries = Vec::with_capacity(paths.len());
        for rel in paths {
            validate_relative(rel)?;
            let src = workdir.join(rel);
            let existed = fs::try_exists(&src).await.map_err(Error::Io)?;
            if existed {
                let dest = dir.join(rel);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).await.map_err(Error::Io)?;
                }
                fs::copy(&src, &dest).await.map_err(Error::Io)?;
            }
            entries.push(SnapshotEntry {
                relative_path: rel.clone(),
                existed,
            });
        }

        let manifest = SnapshotManifest {
            session_id: session_id.to_string(),
            label: label.to_string(),
            created_at: chrono::Utc::now(),
            entries,
        };
        let manifest_path = dir.join("manifest.json");
        let json = serde_json::to_vec_pretty(&manifest)?;
        fs::write(&manifest_path, json).await.map_err(Error::Io)?;
        Ok(manifest)
    }

    /// Restore a subset of the files recorded in a manifest back into
    /// `workdir`, deleting any that did not exist at snapshot time.
    ///
    /// Returns `(restored, missing)` — paths actually restored, and
    /// requested paths that have no entry in the manifest. Used by
    /// `ApplyChanges`'s `rejectPaths` path when no VCS is available.
    pub async fn restore_files(
        &self,
        workdir: &Path,
        session_id: &str,
        label: &str,
        paths: &[String],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let dir = self.snapshot_dir(session_id, label);
        let manifest_path = dir.join("manifest.json");
        let bytes = fs::read(&manifest_path)
            .await
            .map_err(|e| Error::Storage(format!("reading manifest: {e}")))?;
        let manifest: SnapshotManifest = serde_json::from_slice(&bytes)?;

        let mut restored = Vec::with_capacity(paths.len());
        let mut missing = Vec::new();

        for rel in paths {
            let Some(entry) = manifest.entries.iter().find(|e| &e.relative_path == rel) else {
                missing.push(rel.clone());
                continue;
            };
            let dest = workdir.join(&entry.relative_path);
            if entry.existed {
                let src = dir.join(&entry.relative_path);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).await.map_err(Error::Io)?;
                }
                fs::copy(&src, &dest).await.map_err(Error::Io)?;
            } else if fs::try_exists(&dest).await.map_err(Error::Io)? {
                fs::remove_file(&dest).await.map_err(Error::Io)?;
            }
            restored.push(rel.clone());
        }
        Ok((restored, missing))
    }

    /// Delete every snapshot recorded for a session. Returns the number of
    /// `(session, label)` snapshot directories removed.
    pub async fn prune_all(&self, session_id: &str) -> Result<usize> {
        let session_dir = self.root.join(session_id);
        if !fs::try_exists(&session_dir).await.map_err(Error::Io)? {
            return Ok(0);
        }
        let mut pruned = 0;
        let mut read_dir = fs::read_dir(&session_dir).await.map_err(Error::Io)?;
        while let Some(entry) = read_dir.next_entry().await.map_err(Error::Io)? {
            fs::remove_dir_all(entry.path()).await.map_err(Error::Io)?;
            pruned += 1;
        }
        fs::remove_dir(&session_dir).await.map_err(Error::Io)?;
        Ok(pruned)
    }
}

fn validate_relative(path: &str) -> Result<()> {
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(Error::PathEscape {
            path: path.to_string(),
        });
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::PathEscape {
            path: path.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_and_restore_roundtrip_modified_file() {
        let workdir = tempdir().unwrap();
        let snap_root = tempdir().unwrap();
        let file_path = workdir.path().join("a.txt");
        fs::write(&file_path, b"original").await.unwrap();

        let store = SnapshotStore::new(snap_root.path());
        store
            .create(workdir.path(), "s1", "pre-edit", &["a.txt".to_string()])
            .await
            .unwrap();

        fs::write(&file_path, b"modified").await.unwrap();
        let (restored, missing) = store
            .restore_files(workdir.path(), "s1", "pre-edit", &["a.txt".to_string()])
            .await
            .unwrap();
        assert_eq!(restored, vec!["a.txt".to_string()]);
        assert!(missing.is_empty());

        let contents = fs::read_to_string(&file_path).await.unwrap();
        assert_eq!(contents, "original");
    }

    #[tokio::test]
    async fn restore_files_reports_unsnapshotted_path_as_missing() {
        let workdir = tempdir().unwrap();
        let snap_root = tempdir().unwrap();
        fs::write(workdir.path().join("a.txt"), b"original").await.unwrap();

        let store = SnapshotStore::new(snap_root.path());
        store
            .create(workdir.path(), "s1", "pre-edit", &["a.txt".to_string()])
            .await
            .unwrap();

        let (restored, missing) = store
            .restore_files(workdir.path(), "s1", "pre-edit", &["a.txt".to_string(), "b.txt".to_string()])
            .await
            .unwrap();
        assert_eq!(restored, vec!["a.txt".to_string()]);
        assert_eq!(missing, vec!["b.txt".to_string()]);
    }

    #[tokio::test]
    async fn restore_deletes_file_that_did_not_exist_at_snapshot_time() {
        let workdir = tempdir().unwrap();
        let snap_root = tempdir().unwrap();

        let store = SnapshotStore::new(snap_root.path());
        store
            .create(workdir.path(), "s1", "pre-create", &["new.txt".to_string()])
            .await
            .unwrap();

        fs::write(workdir.path().join("new.txt"), b"created by tool")
            .await
            .unwrap();
        let (restored, missing) = store
            .restore_files(workdir.path(), "s1", "pre-create", &["new.txt".to_string()])
            .await
            .unwrap();
        assert_eq!(restored, vec!["new.txt".to_string()]);
        assert!(missing.is_empty());

        assert!(!fs::try_exists(workdir.path().join("new.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_path_escaping_workdir() {
        let workdir = tempdir().unwrap();
        let snap_root = tempdir().unwrap();
        let store = SnapshotStore::new(snap_root.path());
        let result = store
            .create(workdir.path(), "s1", "label", &["../escape.txt".to_string()])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn prune_all_removes_every_label_for_session() {
        let workdir = tempdir().unwrap();
        let snap_root = tempdir().unwrap();
        let store = SnapshotStore::new(snap_root.path());
        fs::write(workdir.path().join("a.txt"), b"x").await.unwrap();
        store
            .create(workdir.path(), "s1", "first", &["a.txt".to_string()])
            .await
            .unwrap();
        store
            .create(workdir.path(), "s1", "second", &["a.txt".to_string()])
            .await
            .unwrap();

        let pruned = store.prune_all("s1").await.unwrap();
        assert_eq!(pruned, 2);
        assert!(!fs::try_exists(snap_root.path().join("s1")).await.unwrap());
    }

    #[tokio::test]
    async fn prune_all_on_unknown_session_is_a_noop() {
        let snap_root = tempdir().unwrap();
        let store = SnapshotStore::new(snap_root.path());
        let pruned = store.prune_all("no-such-session").await.unwrap();
        assert_eq!(pruned, 0);
    }
}
