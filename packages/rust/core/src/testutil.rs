//! Git fixtures for tests: local repositories with fixed commit times.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{Commit, Oid, Repository, RepositoryInitOptions, Signature, Time};

use gitblog_shared::{BlogSettings, Configuration};

/// Initialise a non-bare repository on branch `main`.
pub(crate) fn init_repo(dir: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    Repository::init_opts(dir, &opts).expect("init repo")
}

fn signature(secs: i64) -> Signature<'static> {
    Signature::new("Author", "author@example.com", &Time::new(secs, 0)).expect("signature")
}

/// Write `files` into the working tree and commit them on HEAD.
pub(crate) fn commit_files(repo: &Repository, files: &[(&str, &str)], secs: i64) -> Oid {
    let workdir = repo.workdir().expect("non-bare repo").to_path_buf();
    let mut index = repo.index().expect("index");
    for (path, body) in files {
        let full = workdir.join(path);
        fs::create_dir_all(full.parent().expect("parent")).expect("create dirs");
        fs::write(&full, body).expect("write file");
        index.add_path(Path::new(path)).expect("add path");
    }
    index.write().expect("write index");
    let tree = repo
        .find_tree(index.write_tree().expect("write tree"))
        .expect("find tree");

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&Commit<'_>> = parent.iter().collect();
    let sig = signature(secs);
    repo.commit(Some("HEAD"), &sig, &sig, &format!("commit at {secs}"), &tree, &parents)
        .expect("commit")
}

/// Remove `path` from the working tree and commit the removal.
pub(crate) fn remove_file(repo: &Repository, path: &str, secs: i64) -> Oid {
    let workdir = repo.workdir().expect("non-bare repo").to_path_buf();
    fs::remove_file(workdir.join(path)).expect("remove file");
    let mut index = repo.index().expect("index");
    index.remove_path(Path::new(path)).expect("remove path");
    index.write().expect("write index");
    let tree = repo
        .find_tree(index.write_tree().expect("write tree"))
        .expect("find tree");
    let parent = repo.head().expect("head").peel_to_commit().expect("commit");
    let sig = signature(secs);
    repo.commit(Some("HEAD"), &sig, &sig, "remove", &tree, &[&parent])
        .expect("commit")
}

/// Point `main` at a fresh root commit, discarding prior history.
pub(crate) fn rewrite_history(repo: &Repository, files: &[(&str, &str)], secs: i64) -> Oid {
    let mut builder = repo.treebuilder(None).expect("treebuilder");
    for (name, body) in files {
        let blob = repo.blob(body.as_bytes()).expect("blob");
        builder.insert(*name, blob, 0o100644).expect("insert");
    }
    let tree = repo.find_tree(builder.write().expect("write tree")).expect("tree");
    let sig = signature(secs);
    let oid = repo
        .commit(None, &sig, &sig, "rewrite", &tree, &[])
        .expect("commit");
    repo.reference("refs/heads/main", oid, true, "rewrite")
        .expect("move main");
    oid
}

/// Bundled settings pointed at a local remote and working copy.
pub(crate) fn settings(remote: &Path, clone_path: &Path) -> BlogSettings {
    let config = Configuration::bundled().expect("bundled config");
    let mut settings = BlogSettings::from_config(&config).expect("settings");
    settings.clone.url = remote.to_string_lossy().into_owned();
    settings.clone.path = clone_path.to_path_buf();
    settings
}

/// Path of a content entry inside a working copy, using bundled dirs.
pub(crate) fn entry_path(name: &str) -> String {
    format!("content/entries/{name}")
}

/// Path of a content page inside a working copy, using bundled dirs.
pub(crate) fn page_path(name: &str) -> String {
    format!("content/pages/{name}")
}

pub(crate) fn clone_dir(root: &Path) -> PathBuf {
    root.join("mirror")
}
