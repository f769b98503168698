//! Working-tree version-control adapter (C4) — wraps `git2`.
//!
//! Every operation takes `&self` and runs the blocking `git2` call on a
//! blocking-pool thread via `spawn_blocking`; callers never block the
//! async runtime on repository I/O. Operations never panic on a git
//! error — they return `Result` and let the caller decide policy
//! (the Manager, for instance, falls back to snapshot-restore when a
//! path lives outside any repo).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::{
    CredentialType, DiffOptions, FetchOptions, PushOptions, RemoteCallbacks, Repository,
    ResetType, Signature, StatusOptions,
};
use kory_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// `git2::Repository` holds raw pointers and is `!Send + !Sync`. All access
/// is serialized through the `Mutex` guarding this wrapper.
struct RepoGuard(Repository);

// SAFETY: every access goes through `Mutex<RepoGuard>`; the repository is
// never touched concurrently from two threads.
unsafe impl Send for RepoGuard {}
unsafe impl Sync for RepoGuard {}

#[derive(Clone)]
pub struct VcsAdapter {
    repo: Arc<Mutex<RepoGuard>>,
    workdir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Modified,
    Added,
    Deleted,
    Renamed,
    Untracked,
    Conflicted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub path: String,
    pub status: FileStatus,
    pub staged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub success: bool,
    pub conflicts: Vec<String>,
}

fn git_err(e: git2::Error) -> Error {
    Error::Storage(format!("git: {e}"))
}

fn auth_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut cbs = RemoteCallbacks::new();
    cbs.credentials(|_url, username, allowed| {
        let user = username.unwrap_or("git");
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Ok(c) = git2::Cred::ssh_key_from_agent(user) {
                return Ok(c);
            }
        }
        if allowed.contains(CredentialType::DEFAULT) {
            return git2::Cred::default();
        }
        Err(git2::Error::from_str("no suitable credentials"))
    });
    cbs
}

fn fetch_opts<'a>() -> FetchOptions<'a> {
    let mut opts = FetchOptions::new();
    opts.remote_callbacks(auth_callbacks());
    opts
}

fn push_opts<'a>() -> PushOptions<'a> {
    let mut opts = PushOptions::new();
    opts.remote_callbacks(auth_callbacks());
    opts
}

impl VcsAdapter {
    /// Open an existing repository at `workdir`. Returns an error if the
    /// path isn't a git working tree — callers should treat that as "no
    /// VCS available" and fall back to the snapshot store (C3).
    pub fn open(workdir: impl Into<PathBuf>) -> Result<Self> {
        let workdir = workdir.into();
        let repo = Repository::open(&workdir).map_err(git_err)?;
        Ok(Self {
            repo: Arc::new(Mutex::new(RepoGuard(repo))),
            workdir,
        })
    }

    /// Whether `path` is a git working tree at all, without raising.
    pub fn is_repo(path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub async fn status(&self) -> Result<Vec<StatusEntry>> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let mut opts = StatusOptions::new();
            opts.include_untracked(true).recurse_untracked_dirs(true);
            let statuses = guard.0.statuses(Some(&mut opts)).map_err(git_err)?;
            let mut out = Vec::new();
            for entry in statuses.iter() {
                let Some(path) = entry.path() else { continue };
                let s = entry.status();
                let (status, staged) = classify(s);
                out.push(StatusEntry {
                    path: path.to_string(),
                    status,
                    staged,
                });
            }
            Ok(out)
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn diff(&self, path: Option<String>) -> Result<String> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let mut opts = DiffOptions::new();
            if let Some(p) = &path {
                opts.pathspec(p);
            }
            let diff = guard
                .0
                .diff_index_to_workdir(None, Some(&mut opts))
                .map_err(git_err)?;
            let mut buf = String::new();
            diff.print(git2::DiffFormat::Patch, |_, _, line| {
                if let Ok(s) = std::str::from_utf8(line.content()) {
                    buf.push_str(s);
                }
                true
            })
            .map_err(git_err)?;
            Ok(buf)
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    /// The content of `path` at HEAD, or `None` if it doesn't exist there.
    pub async fn file_at_head(&self, path: String) -> Result<Option<String>> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let head = match guard.0.head() {
                Ok(h) => h,
                Err(_) => return Ok(None),
            };
            let tree = head.peel_to_tree().map_err(git_err)?;
            match tree.get_path(Path::new(&path)) {
                Ok(entry) => {
                    let obj = entry.to_object(&guard.0).map_err(git_err)?;
                    let blob = obj.as_blob().ok_or_else(|| {
                        Error::Storage(format!("{path} is not a blob at HEAD"))
                    })?;
                    Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
                }
                Err(_) => Ok(None),
            }
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn stage(&self, paths: Vec<String>) -> Result<()> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let mut index = guard.0.index().map_err(git_err)?;
            for p in &paths {
                index.add_path(Path::new(p)).map_err(git_err)?;
            }
            index.write().map_err(git_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn unstage(&self, paths: Vec<String>) -> Result<()> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let head = guard.0.head().map_err(git_err)?;
            let head_commit = head.peel_to_commit().map_err(git_err)?;
            let refs: Vec<&Path> = paths.iter().map(Path::new).collect();
            guard
                .0
                .reset_default(Some(head_commit.as_object()), refs)
                .map_err(git_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    /// Discard working-tree changes to `path`, restoring HEAD's version.
    pub async fn restore_file(&self, path: String) -> Result<()> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let mut checkout = git2::build::CheckoutBuilder::new();
            checkout.path(&path).force();
            guard
                .0
                .checkout_head(Some(&mut checkout))
                .map_err(git_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn commit(&self, message: String) -> Result<String> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let mut index = guard.0.index().map_err(git_err)?;
            let tree_oid = index.write_tree().map_err(git_err)?;
            let tree = guard.0.find_tree(tree_oid).map_err(git_err)?;
            let sig = guard
                .0
                .signature()
                .unwrap_or_else(|_| Signature::now("kory", "kory@localhost").unwrap());
            let parent = guard.0.head().ok().and_then(|h| h.peel_to_commit().ok());
            let parents: Vec<&git2::Commit> = parent.iter().collect();
            let oid = guard
                .0
                .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)
                .map_err(git_err)?;
            Ok(oid.to_string())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn branch(&self, name: String) -> Result<()> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let head = guard.0.head().map_err(git_err)?;
            let commit = head.peel_to_commit().map_err(git_err)?;
            guard.0.branch(&name, &commit, false).map_err(git_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn checkout(&self, reference: String) -> Result<()> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let (object, git_ref) = guard.0.revparse_ext(&reference).map_err(git_err)?;
            guard.0.checkout_tree(&object, None).map_err(git_err)?;
            match git_ref {
                Some(r) => guard
                    .0
                    .set_head(r.name().unwrap_or(&reference))
                    .map_err(git_err)?,
                None => guard.0.set_head_detached(object.id()).map_err(git_err)?,
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn merge(&self, branch_name: String) -> Result<MergeOutcome> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let branch_ref = guard
                .0
                .find_branch(&branch_name, git2::BranchType::Local)
                .map_err(git_err)?;
            let annotated = guard
                .0
                .reference_to_annotated_commit(branch_ref.get())
                .map_err(git_err)?;
            let (analysis, _) = guard.0.merge_analysis(&[&annotated]).map_err(git_err)?;
            if analysis.is_up_to_date() {
                return Ok(MergeOutcome {
                    success: true,
                    conflicts: Vec::new(),
                });
            }
            guard
                .0
                .merge(&[&annotated], None, None)
                .map_err(git_err)?;
            let index = guard.0.index().map_err(git_err)?;
            if index.has_conflicts() {
                let conflicts = index
                    .conflicts()
                    .map_err(git_err)?
                    .filter_map(|c| c.ok())
                    .filter_map(|c| c.our.map(|e| String::from_utf8_lossy(&e.path).into_owned()))
                    .collect();
                return Ok(MergeOutcome {
                    success: false,
                    conflicts,
                });
            }
            Ok(MergeOutcome {
                success: true,
                conflicts: Vec::new(),
            })
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn conflicts(&self) -> Result<Vec<String>> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let index = guard.0.index().map_err(git_err)?;
            if !index.has_conflicts() {
                return Ok(Vec::new());
            }
            let paths = index
                .conflicts()
                .map_err(git_err)?
                .filter_map(|c| c.ok())
                .filter_map(|c| c.our.map(|e| String::from_utf8_lossy(&e.path).into_owned()))
                .collect();
            Ok(paths)
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn pull(&self) -> Result<()> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let head = guard.0.head().map_err(git_err)?;
            let branch = head
                .shorthand()
                .ok_or_else(|| Error::Storage("detached HEAD, cannot pull".into()))?
                .to_string();
            let mut remote = guard.0.find_remote("origin").map_err(git_err)?;
            remote
                .fetch(&[branch.as_str()], Some(&mut fetch_opts()), None)
                .map_err(git_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn push(&self) -> Result<()> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let head = guard.0.head().map_err(git_err)?;
            let branch = head
                .name()
                .ok_or_else(|| Error::Storage("detached HEAD, cannot push".into()))?
                .to_string();
            let refspec = format!("{branch}:{branch}");
            let mut remote = guard.0.find_remote("origin").map_err(git_err)?;
            remote
                .push(&[refspec.as_str()], Some(&mut push_opts()))
                .map_err(git_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    pub async fn current_hash(&self) -> Result<String> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let head = guard.0.head().map_err(git_err)?;
            let oid = head.target().ok_or_else(|| Error::Storage("HEAD has no target".into()))?;
            Ok(oid.to_string())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }

    /// Hard-reset the working tree to `hash` — used by `applySessionChanges`'s
    /// reject-all path (P4) to restore `lastKnownGoodHash` exactly.
    pub async fn rollback(&self, hash: String) -> Result<()> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || {
            let guard = repo.lock().unwrap();
            let oid = git2::Oid::from_str(&hash).map_err(git_err)?;
            let object = guard.0.find_object(oid, None).map_err(git_err)?;
            guard
                .0
                .reset(&object, ResetType::Hard, None)
                .map_err(git_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("task join: {e}")))?
    }
}

fn classify(status: git2::Status) -> (FileStatus, bool) {
    use git2::Status;
    if status.intersects(Status::CONFLICTED) {
        return (FileStatus::Conflicted, false);
    }
    let staged = status.intersects(
        Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED,
    );
    if status.intersects(Status::WT_NEW) || status.intersects(Status::INDEX_NEW) {
        (FileStatus::Added, staged)
    } else if status.intersects(Status::WT_DELETED) || status.intersects(Status::INDEX_DELETED) {
        (FileStatus::Deleted, staged)
    } else if status.intersects(Status::WT_RENAMED) || status.intersects(Status::INDEX_RENAMED) {
        (FileStatus::Renamed, staged)
    } else if status.intersects(Status::WT_NEW) {
        (FileStatus::Untracked, false)
    } else {
        (FileStatus::Modified, staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        Command::new("git").arg("init").arg("-q").current_dir(dir).status().unwrap();
        Command::new("git")
            .args(["config", "user.email", "t@example.com"])
            .current_dir(dir)
            .status()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir)
            .status()
            .unwrap();
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir).status().unwrap();
        Command::new("git")
            .args(["commit", "-q", "-m", "init"])
            .current_dir(dir)
            .status()
            .unwrap();
    }

    #[test]
    fn is_repo_detects_git_dir() {
        let dir = tempdir().unwrap();
        assert!(!VcsAdapter::is_repo(dir.path()));
        init_repo(dir.path());
        assert!(VcsAdapter::is_repo(dir.path()));
    }

    #[tokio::test]
    async fn status_reports_modified_file() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let adapter = VcsAdapter::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("README.md"), "goodbye\n").unwrap();
        let status = adapter.status().await.unwrap();
        assert!(status.iter().any(|e| e.path == "README.md" && e.status == FileStatus::Modified));
    }

    #[tokio::test]
    async fn stage_and_commit_advances_head() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let adapter = VcsAdapter::open(dir.path()).unwrap();
        let before = adapter.current_hash().await.unwrap();
        std::fs::write(dir.path().join("a.txt"), "new file\n").unwrap();
        adapter.stage(vec!["a.txt".to_string()]).await.unwrap();
        let commit_hash = adapter.commit("feat: add a.txt".to_string()).await.unwrap();
        assert_ne!(before, commit_hash);
    }

    #[tokio::test]
    async fn rollback_restores_exact_hash() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let adapter = VcsAdapter::open(dir.path()).unwrap();
        let good_hash = adapter.current_hash().await.unwrap();
        std::fs::write(dir.path().join("README.md"), "changed\n").unwrap();
        adapter.stage(vec!["README.md".to_string()]).await.unwrap();
        adapter.commit("edit".to_string()).await.unwrap();
        adapter.rollback(good_hash.clone()).await.unwrap();
        assert_eq!(adapter.current_hash().await.unwrap(), good_hash);
    }

    #[tokio::test]
    async fn restore_file_discards_working_tree_change() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let adapter = VcsAdapter::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("README.md"), "temporary\n").unwrap();
        adapter.restore_file("README.md".to_string()).await.unwrap();
        let content = std::fs::read_to_string(dir.path().join("README.md")).unwrap();
        assert_eq!(content, "hello\n");
    }
}
