//! Local mirror of the remote content repository.
//!
//! The mirror clones on first need and fast-forwards on every pull. A pull
//! either moves the working tree and the recorded revision together, or
//! leaves both where they were: fetched objects land in remote-tracking refs
//! first, and a failed checkout is hard-reset back to the previous tip.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{BranchType, FetchOptions, Oid, RemoteCallbacks, Repository, ResetType};
use tracing::{debug, info, instrument, warn};

use gitblog_shared::{BlogError, CloneSettings, Result};

const REMOTE_NAME: &str = "origin";

/// Sibling directory a fresh clone is staged in.
const STAGING_SUFFIX: &str = ".cloning";

/// Sibling directory the replaced working copy waits in until the swap lands.
const RETIRED_SUFFIX: &str = ".previous";

// ---------------------------------------------------------------------------
// State & outcomes
// ---------------------------------------------------------------------------

/// Lifecycle of the working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Uninitialized,
    Cloning,
    Ready,
    Pulling,
}

/// Result of a clone or pull attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The working copy moved to a new revision ("mirror updated").
    Updated { revision: String, sequence: u64 },
    /// The remote had nothing new.
    Unchanged,
    /// Another sync was already in flight; this attempt was dropped.
    Skipped,
}

impl SyncOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

// ---------------------------------------------------------------------------
// RepositoryMirror
// ---------------------------------------------------------------------------

/// Owner of the local working copy. Mutated only through [`ensure_ready`],
/// [`pull`] and [`sync`].
///
/// [`ensure_ready`]: RepositoryMirror::ensure_ready
/// [`pull`]: RepositoryMirror::pull
/// [`sync`]: RepositoryMirror::sync
#[derive(Debug)]
pub struct RepositoryMirror {
    url: String,
    path: PathBuf,
    branch: Option<String>,
    clone_on_startup: bool,
    timeout: Duration,
    state: MirrorState,
    last_revision: Option<String>,
    sequence: u64,
}

impl RepositoryMirror {
    pub fn new(settings: &CloneSettings) -> Self {
        Self {
            url: settings.url.clone(),
            path: settings.path.clone(),
            branch: settings.branch.clone(),
            clone_on_startup: settings.on_startup,
            timeout: settings.pull_timeout,
            state: MirrorState::Uninitialized,
            last_revision: None,
            sequence: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> MirrorState {
        self.state
    }

    /// Revision the working copy was last synced to.
    pub fn last_revision(&self) -> Option<&str> {
        self.last_revision.as_deref()
    }

    /// Number of times the working copy has moved to a new revision.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether `path` holds a usable (non-bare) working copy.
    pub fn has_working_copy(&self) -> bool {
        Repository::open(&self.path).is_ok_and(|repo| !repo.is_bare())
    }

    /// Bring the mirror to `Ready`, cloning when there is no working copy
    /// or when a fresh clone at startup is configured.
    ///
    /// A failed clone falls back to an existing working copy if there is one.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn ensure_ready(&mut self) -> Result<SyncOutcome> {
        let existing = self.has_working_copy();

        if existing && !self.clone_on_startup {
            self.adopt_existing()?;
            info!(revision = ?self.last_revision, "using existing working copy");
            return Ok(SyncOutcome::Unchanged);
        }

        match self.clone_fresh() {
            Ok(outcome) => Ok(outcome),
            Err(e) if existing => {
                warn!(error = %e, "fresh clone failed; keeping existing working copy");
                self.adopt_existing()?;
                Ok(SyncOutcome::Unchanged)
            }
            Err(e) => Err(e),
        }
    }

    /// Clone if uninitialized, otherwise pull.
    pub fn sync(&mut self) -> Result<SyncOutcome> {
        if self.state == MirrorState::Uninitialized {
            if self.has_working_copy() {
                self.adopt_existing()?;
            } else {
                return self.clone_fresh();
            }
        }
        self.pull()
    }

    /// Fetch from the remote and fast-forward the checked-out branch.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn pull(&mut self) -> Result<SyncOutcome> {
        let repo = self.open()?;
        self.state = MirrorState::Pulling;
        let result = self.fetch_and_fast_forward(&repo);
        self.state = MirrorState::Ready;

        match result {
            Ok(Some(revision)) => {
                self.sequence += 1;
                self.last_revision = Some(revision.clone());
                info!(%revision, sequence = self.sequence, "mirror updated");
                Ok(SyncOutcome::Updated {
                    revision,
                    sequence: self.sequence,
                })
            }
            Ok(None) => {
                debug!("remote has nothing new");
                Ok(SyncOutcome::Unchanged)
            }
            Err(e) => Err(e),
        }
    }

    // -- internals ----------------------------------------------------------

    fn open(&self) -> Result<Repository> {
        Repository::open(&self.path).map_err(|e| git_error("open working copy", e))
    }

    fn adopt_existing(&mut self) -> Result<()> {
        let repo = self.open()?;
        self.last_revision = Some(head_revision(&repo)?);
        self.state = MirrorState::Ready;
        Ok(())
    }

    /// Clone into a staging directory and swap it into place, so the old
    /// working copy survives a failed clone.
    fn clone_fresh(&mut self) -> Result<SyncOutcome> {
        let previous_state = self.state;
        self.state = MirrorState::Cloning;
        let result = self.clone_into_place();
        self.state = match result {
            Ok(_) => MirrorState::Ready,
            Err(_) => previous_state,
        };

        let revision = result?;
        self.sequence += 1;
        self.last_revision = Some(revision.clone());
        info!(%revision, sequence = self.sequence, url = %self.url, "clone complete");
        Ok(SyncOutcome::Updated {
            revision,
            sequence: self.sequence,
        })
    }

    fn clone_into_place(&self) -> Result<String> {
        let staging = self.sibling_path(STAGING_SUFFIX);
        remove_dir_if_present(&staging)?;
        if let Some(parent) = staging.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BlogError::io(parent, e))?;
        }

        info!(url = %self.url, staging = %staging.display(), "cloning content repository");
        let deadline = Instant::now() + self.timeout;
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options(deadline));
        if let Some(branch) = &self.branch {
            builder.branch(branch);
        }

        let revision = match builder.clone(&self.url, &staging) {
            Ok(repo) => head_revision(&repo),
            Err(e) => Err(self.transfer_error("clone", e, deadline)),
        };
        let revision = match revision {
            Ok(revision) => revision,
            Err(e) => {
                let _ = remove_dir_if_present(&staging);
                return Err(e);
            }
        };

        self.swap_in(&staging)?;
        Ok(revision)
    }

    /// Move `staging` to `path`. The old copy is set aside first and only
    /// deleted once the new one is in place; a failed swap puts it back.
    fn swap_in(&self, staging: &Path) -> Result<()> {
        let retired = self.sibling_path(RETIRED_SUFFIX);
        remove_dir_if_present(&retired)?;

        let had_copy = self.path.exists();
        if had_copy {
            std::fs::rename(&self.path, &retired).map_err(|e| BlogError::io(&self.path, e))?;
        }

        if let Err(e) = std::fs::rename(staging, &self.path) {
            if had_copy {
                if let Err(restore) = std::fs::rename(&retired, &self.path) {
                    warn!(error = %restore, "failed to restore previous working copy");
                }
            }
            let _ = remove_dir_if_present(staging);
            return Err(BlogError::io(&self.path, e));
        }

        if let Err(e) = remove_dir_if_present(&retired) {
            warn!(error = %e, "failed to remove previous working copy");
        }
        Ok(())
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut sibling: OsString = self.path.as_os_str().to_owned();
        sibling.push(suffix);
        PathBuf::from(sibling)
    }

    /// Returns the new tip when the branch advanced, `None` when already
    /// up to date.
    fn fetch_and_fast_forward(&self, repo: &Repository) -> Result<Option<String>> {
        let head = repo.head().map_err(|e| git_error("read HEAD", e))?;
        if !head.is_branch() {
            return Err(BlogError::mirror("working copy HEAD is detached"));
        }
        let head_ref = head
            .name()
            .ok_or_else(|| BlogError::mirror("HEAD reference name is not UTF-8"))?
            .to_string();
        let branch_name = head
            .shorthand()
            .ok_or_else(|| BlogError::mirror("branch name is not UTF-8"))?
            .to_string();
        let local = head
            .target()
            .ok_or_else(|| BlogError::mirror("HEAD has no target"))?;

        let upstream_ref = repo
            .find_branch(&branch_name, BranchType::Local)
            .and_then(|branch| branch.upstream())
            .map_err(|e| git_error("resolve upstream", e))?
            .get()
            .name()
            .ok_or_else(|| BlogError::mirror("upstream name is not UTF-8"))?
            .to_string();

        let deadline = Instant::now() + self.timeout;
        let mut remote = repo
            .find_remote(REMOTE_NAME)
            .map_err(|e| git_error("find remote", e))?;
        remote
            .fetch(&[] as &[&str], Some(&mut fetch_options(deadline)), None)
            .map_err(|e| self.transfer_error("fetch", e, deadline))?;

        let upstream = repo
            .refname_to_id(&upstream_ref)
            .map_err(|e| git_error("resolve fetched tip", e))?;

        if upstream == local {
            return Ok(None);
        }

        let fast_forward = repo
            .graph_descendant_of(upstream, local)
            .map_err(|e| git_error("compare history", e))?;
        if !fast_forward {
            return Err(BlogError::mirror(format!(
                "{upstream_ref} ({upstream}) is not a fast-forward of {branch_name} ({local})"
            )));
        }

        apply_fast_forward(repo, &head_ref, local, upstream)?;
        Ok(Some(upstream.to_string()))
    }

    fn transfer_error(&self, action: &str, e: git2::Error, deadline: Instant) -> BlogError {
        if Instant::now() >= deadline {
            BlogError::Timeout(self.timeout)
        } else {
            git_error(action, e)
        }
    }
}

/// Check out `target` and move `head_ref` to it; on any failure reset hard
/// to `previous` so nothing is left half-applied.
fn apply_fast_forward(repo: &Repository, head_ref: &str, previous: Oid, target: Oid) -> Result<()> {
    let attempt = (|| -> std::result::Result<(), git2::Error> {
        let object = repo.find_object(target, None)?;
        repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))?;
        repo.find_reference(head_ref)?
            .set_target(target, "gitblog: fast-forward")?;
        Ok(())
    })();

    if let Err(e) = attempt {
        warn!(error = %e, %previous, "fast-forward failed; restoring previous revision");
        let restore = repo
            .find_object(previous, None)
            .and_then(|object| repo.reset(&object, ResetType::Hard, None));
        if let Err(restore_err) = restore {
            warn!(error = %restore_err, "failed to restore previous revision");
        }
        return Err(git_error("fast-forward", e));
    }
    Ok(())
}

/// Fetch options whose progress callback cancels the transfer once
/// `deadline` has passed.
fn fetch_options<'a>(deadline: Instant) -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |_| Instant::now() < deadline);
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

/// Full hex id of the commit HEAD points at.
pub fn head_revision(repo: &Repository) -> Result<String> {
    repo.head()
        .and_then(|head| head.peel_to_commit())
        .map(|commit| commit.id().to_string())
        .map_err(|e| git_error("read HEAD commit", e))
}

pub(crate) fn git_error(action: &str, e: git2::Error) -> BlogError {
    BlogError::mirror(format!("{action} failed: {}", e.message()))
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BlogError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, entry_path};

    fn mirror_for(remote: &Path, root: &Path) -> RepositoryMirror {
        let settings = testutil::settings(remote, &testutil::clone_dir(root));
        RepositoryMirror::new(&settings.clone)
    }

    #[test]
    fn clones_on_first_need() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        let tip = testutil::commit_files(&remote, &[(&entry_path("a.md"), "# A\n")], 1_000);

        let mut mirror = mirror_for(remote_dir.path(), local_root.path());
        assert_eq!(mirror.state(), MirrorState::Uninitialized);

        let outcome = mirror.ensure_ready().unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Updated {
                revision: tip.to_string(),
                sequence: 1
            }
        );
        assert_eq!(mirror.state(), MirrorState::Ready);
        assert_eq!(mirror.last_revision(), Some(tip.to_string().as_str()));
        assert!(mirror.path().join(entry_path("a.md")).is_file());
        assert!(!mirror.sibling_path(STAGING_SUFFIX).exists());
    }

    #[test]
    fn existing_working_copy_is_adopted() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        let tip = testutil::commit_files(&remote, &[("README.md", "hi")], 1_000);

        mirror_for(remote_dir.path(), local_root.path())
            .ensure_ready()
            .unwrap();

        let mut restarted = mirror_for(remote_dir.path(), local_root.path());
        assert_eq!(restarted.ensure_ready().unwrap(), SyncOutcome::Unchanged);
        assert_eq!(restarted.state(), MirrorState::Ready);
        assert_eq!(restarted.sequence(), 0);
        assert_eq!(restarted.last_revision(), Some(tip.to_string().as_str()));
    }

    #[test]
    fn clone_on_startup_replaces_existing_copy() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        testutil::commit_files(&remote, &[("README.md", "hi")], 1_000);

        let mut settings =
            testutil::settings(remote_dir.path(), &testutil::clone_dir(local_root.path()));
        RepositoryMirror::new(&settings.clone).ensure_ready().unwrap();
        std::fs::write(testutil::clone_dir(local_root.path()).join("stray.txt"), "x").unwrap();

        settings.clone.on_startup = true;
        let mut mirror = RepositoryMirror::new(&settings.clone);
        assert!(mirror.ensure_ready().unwrap().is_updated());
        assert!(!mirror.path().join("stray.txt").exists());
        assert!(!mirror.sibling_path(RETIRED_SUFFIX).exists());
    }

    #[test]
    fn failed_swap_restores_previous_copy() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        testutil::commit_files(&remote, &[("README.md", "hi")], 1_000);

        let mut mirror = mirror_for(remote_dir.path(), local_root.path());
        mirror.ensure_ready().unwrap();

        let missing = local_root.path().join("never-cloned");
        assert!(mirror.swap_in(&missing).is_err());
        assert!(mirror.path().join("README.md").is_file());
        assert!(!mirror.sibling_path(RETIRED_SUFFIX).exists());
        assert!(mirror.has_working_copy());
    }

    #[test]
    fn leftover_retired_copy_is_cleared_before_swap() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        testutil::commit_files(&remote, &[("README.md", "hi")], 1_000);

        let mut mirror = mirror_for(remote_dir.path(), local_root.path());
        let retired = mirror.sibling_path(RETIRED_SUFFIX);
        std::fs::create_dir_all(retired.join("junk")).unwrap();

        assert!(mirror.ensure_ready().unwrap().is_updated());
        assert!(!retired.exists());
        assert!(mirror.path().join("README.md").is_file());
    }

    #[test]
    fn failed_clone_keeps_existing_copy() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        let tip = testutil::commit_files(&remote, &[("README.md", "hi")], 1_000);

        let mut settings =
            testutil::settings(remote_dir.path(), &testutil::clone_dir(local_root.path()));
        RepositoryMirror::new(&settings.clone).ensure_ready().unwrap();

        settings.clone.on_startup = true;
        settings.clone.url = local_root.path().join("missing").to_string_lossy().into_owned();
        let mut mirror = RepositoryMirror::new(&settings.clone);
        assert_eq!(mirror.ensure_ready().unwrap(), SyncOutcome::Unchanged);
        assert_eq!(mirror.last_revision(), Some(tip.to_string().as_str()));
        assert!(mirror.path().join("README.md").is_file());
    }

    #[test]
    fn failed_first_clone_stays_uninitialized() {
        let local_root = tempfile::tempdir().unwrap();
        let mut mirror = mirror_for(&local_root.path().join("missing"), local_root.path());
        assert!(mirror.ensure_ready().is_err());
        assert_eq!(mirror.state(), MirrorState::Uninitialized);
        assert!(!mirror.has_working_copy());
    }

    #[test]
    fn pull_fast_forwards_and_reports_unchanged() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        testutil::commit_files(&remote, &[(&entry_path("a.md"), "# A\n")], 1_000);

        let mut mirror = mirror_for(remote_dir.path(), local_root.path());
        mirror.ensure_ready().unwrap();
        assert_eq!(mirror.pull().unwrap(), SyncOutcome::Unchanged);

        let tip = testutil::commit_files(&remote, &[(&entry_path("b.md"), "# B\n")], 2_000);
        assert_eq!(
            mirror.pull().unwrap(),
            SyncOutcome::Updated {
                revision: tip.to_string(),
                sequence: 2
            }
        );
        assert!(mirror.path().join(entry_path("b.md")).is_file());
        assert_eq!(mirror.pull().unwrap(), SyncOutcome::Unchanged);
        assert_eq!(mirror.sequence(), 2);
    }

    #[test]
    fn pull_removes_deleted_files() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        testutil::commit_files(&remote, &[(&entry_path("a.md"), "# A\n")], 1_000);

        let mut mirror = mirror_for(remote_dir.path(), local_root.path());
        mirror.ensure_ready().unwrap();
        testutil::remove_file(&remote, &entry_path("a.md"), 2_000);

        assert!(mirror.pull().unwrap().is_updated());
        assert!(!mirror.path().join(entry_path("a.md")).exists());
    }

    #[test]
    fn diverged_history_is_rejected_and_copy_untouched() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        let tip = testutil::commit_files(&remote, &[("README.md", "one")], 1_000);

        let mut mirror = mirror_for(remote_dir.path(), local_root.path());
        mirror.ensure_ready().unwrap();

        testutil::rewrite_history(&remote, &[("OTHER.md", "two")], 2_000);
        let err = mirror.pull().unwrap_err();
        assert!(err.to_string().contains("not a fast-forward"), "{err}");

        assert_eq!(mirror.state(), MirrorState::Ready);
        assert_eq!(mirror.last_revision(), Some(tip.to_string().as_str()));
        assert!(mirror.path().join("README.md").is_file());
        assert!(!mirror.path().join("OTHER.md").exists());
        let local = Repository::open(mirror.path()).unwrap();
        assert_eq!(head_revision(&local).unwrap(), tip.to_string());
    }

    #[test]
    fn unreachable_remote_fails_without_touching_copy() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        let tip = testutil::commit_files(&remote, &[("README.md", "one")], 1_000);

        let mut mirror = mirror_for(remote_dir.path(), local_root.path());
        mirror.ensure_ready().unwrap();

        drop(remote);
        let moved = local_root.path().join("moved-remote");
        std::fs::rename(remote_dir.path(), &moved).unwrap();

        assert!(mirror.pull().is_err());
        assert_eq!(mirror.state(), MirrorState::Ready);
        assert_eq!(mirror.sequence(), 1);
        assert_eq!(mirror.last_revision(), Some(tip.to_string().as_str()));

        // Put it back so the tempdir cleans up normally.
        std::fs::rename(&moved, remote_dir.path()).unwrap();
    }

    #[test]
    fn sync_clones_when_uninitialized() {
        let remote_dir = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let remote = testutil::init_repo(remote_dir.path());
        testutil::commit_files(&remote, &[("README.md", "one")], 1_000);

        let mut mirror = mirror_for(remote_dir.path(), local_root.path());
        assert!(mirror.sync().unwrap().is_updated());
        assert_eq!(mirror.sync().unwrap(), SyncOutcome::Unchanged);
    }
}
