//! Builds a [`ContentSnapshot`] from a working copy.
//!
//! Walks the entries and pages directories, looks up each file's provenance
//! in the revision history, renders the markdown, and hands everything to
//! [`ContentSnapshot::new`] for ordering and truncation.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use chrono::{TimeZone, Utc};
use git2::{DiffOptions, Repository, Sort};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use gitblog_markdown::MarkdownConverter;
use gitblog_shared::{
    BlogError, ContentKind, ContentSettings, ContentSnapshot, Entry, EntryTag, Page, Provenance,
    Result,
};

use crate::mirror::{git_error, head_revision};

/// Extensions treated as content.
const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown"];

// ---------------------------------------------------------------------------
// Source files
// ---------------------------------------------------------------------------

/// A content file found on disk.
#[derive(Debug, Clone)]
struct SourceFile {
    /// Logical name (file stem).
    name: String,
    /// Absolute path on disk.
    path: PathBuf,
    /// Path relative to the working copy root, as git records it.
    relative: PathBuf,
}

/// A content file after rendering, before it becomes an entry or page.
#[derive(Debug)]
struct Document {
    name: String,
    title: String,
    tags: Vec<EntryTag>,
    provenance: Provenance,
    html: String,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Turns a working copy into a snapshot.
#[derive(Debug, Clone)]
pub struct ContentIndexBuilder {
    title: String,
    content: ContentSettings,
    converter: MarkdownConverter,
}

impl ContentIndexBuilder {
    /// `title` becomes the index entity's title.
    pub fn new(title: impl Into<String>, content: ContentSettings) -> Self {
        Self {
            title: title.into(),
            content,
            converter: MarkdownConverter::new(),
        }
    }

    /// Snapshot published when no working copy is available.
    pub fn empty(&self, sequence: u64) -> ContentSnapshot {
        ContentSnapshot::empty(sequence, self.title.clone())
    }

    /// Build a snapshot of the working copy at `workdir`.
    ///
    /// Individual malformed files are skipped with a warning. Errors are
    /// returned only when the repository or a content directory cannot be
    /// read at all.
    #[instrument(skip(self), fields(workdir = %workdir.display()))]
    pub fn build(&self, workdir: &Path, sequence: u64) -> Result<ContentSnapshot> {
        let repo = Repository::open(workdir).map_err(|e| git_error("open working copy", e))?;

        let revision = match head_revision(&repo) {
            Ok(revision) => Some(revision),
            Err(e) if repo.head().is_err() => {
                debug!(error = %e, "working copy has no commits yet");
                None
            }
            Err(e) => return Err(e),
        };

        let entry_files = collect_files(workdir, &self.content.entries_dir(workdir))?;
        let page_files = collect_files(workdir, &self.content.pages_dir(workdir))?;

        let history = if revision.is_some() {
            let wanted: HashSet<PathBuf> = entry_files
                .iter()
                .chain(&page_files)
                .map(|f| f.relative.clone())
                .collect();
            let scope = [
                pathspec(&self.content.root, &self.content.entries),
                pathspec(&self.content.root, &self.content.pages),
            ];
            last_revisions(&repo, &wanted, &scope)?
        } else {
            HashMap::new()
        };

        let entries: Vec<Entry> = self
            .load_all(ContentKind::Entry, &entry_files, &history)
            .into_iter()
            .map(|doc| Entry {
                name: doc.name,
                title: doc.title,
                tags: doc.tags,
                provenance: doc.provenance,
                html: doc.html,
            })
            .collect();

        let pages: Vec<Page> = self
            .load_all(ContentKind::Page, &page_files, &history)
            .into_iter()
            .map(|doc| Page {
                name: doc.name,
                title: doc.title,
                provenance: doc.provenance,
                html: doc.html,
            })
            .collect();

        let found_entries = entries.len();
        let snapshot = ContentSnapshot::new(
            sequence,
            revision,
            self.title.clone(),
            entries,
            pages,
            self.content.entry_limit,
        );

        info!(
            sequence,
            revision = ?snapshot.revision,
            entries = snapshot.entry_count(),
            found_entries,
            pages = snapshot.page_count(),
            "content snapshot built"
        );

        Ok(snapshot)
    }

    /// Load every file of one kind, skipping malformed ones and duplicate
    /// names (first path in sorted order wins).
    fn load_all(
        &self,
        kind: ContentKind,
        files: &[SourceFile],
        history: &HashMap<PathBuf, Provenance>,
    ) -> Vec<Document> {
        let mut seen = HashSet::new();
        let mut documents = Vec::with_capacity(files.len());

        for file in files {
            if !seen.insert(file.name.as_str()) {
                warn!(
                    %kind,
                    name = %file.name,
                    path = %file.relative.display(),
                    "duplicate content name, skipping"
                );
                continue;
            }

            match self.load(kind, file, history) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    warn!(
                        %kind,
                        path = %file.relative.display(),
                        error = %e,
                        "skipping malformed content file"
                    );
                }
            }
        }

        documents
    }

    fn load(
        &self,
        kind: ContentKind,
        file: &SourceFile,
        history: &HashMap<PathBuf, Provenance>,
    ) -> Result<Document> {
        let provenance = history.get(&file.relative).cloned().ok_or_else(|| {
            BlogError::validation(format!(
                "{} has no revision history (uncommitted?)",
                file.relative.display()
            ))
        })?;

        let raw = std::fs::read(&file.path).map_err(|e| BlogError::io(&file.path, e))?;
        let rendered = self.converter.render(&raw)?;

        let tags = match kind {
            ContentKind::Entry => rendered.tags,
            _ => Vec::new(),
        };

        Ok(Document {
            title: rendered.title.unwrap_or_else(|| file.name.clone()),
            name: file.name.clone(),
            tags,
            provenance,
            html: rendered.html,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Content files under `dir`, sorted by path. A missing directory yields
/// nothing; an unreadable one is an error.
fn collect_files(workdir: &Path, dir: &Path) -> Result<Vec<SourceFile>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "content directory missing");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk failed"));
                return Err(BlogError::io(dir, source));
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };

        if !entry.file_type().is_file() || !has_content_extension(entry.path()) {
            continue;
        }

        let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %entry.path().display(), "skipping file with non-UTF-8 name");
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(workdir) else {
            continue;
        };

        files.push(SourceFile {
            name: name.to_string(),
            path: entry.path().to_path_buf(),
            relative: relative.to_path_buf(),
        });
    }

    Ok(files)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

fn has_content_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            CONTENT_EXTENSIONS
                .iter()
                .any(|c| c.eq_ignore_ascii_case(ext))
        })
}

/// `root/dir` in git's form: `/`-separated, no `.` segments. Empty when
/// the directory is the repository root.
fn pathspec(root: &str, dir: &str) -> String {
    Path::new(root)
        .join(dir)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// For each wanted path, the newest commit reachable from HEAD that changed
/// it. Walks newest-first, diffing each commit against its parent, and
/// stops once every path is accounted for.
///
/// Merge commits are skipped; the commits they merge carry the changes.
fn last_revisions(
    repo: &Repository,
    wanted: &HashSet<PathBuf>,
    scope: &[String],
) -> Result<HashMap<PathBuf, Provenance>> {
    let mut found: HashMap<PathBuf, Provenance> = HashMap::new();
    if wanted.is_empty() {
        return Ok(found);
    }

    let mut revwalk = repo.revwalk().map_err(|e| git_error("revwalk", e))?;
    revwalk.push_head().map_err(|e| git_error("revwalk", e))?;
    revwalk
        .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
        .map_err(|e| git_error("revwalk", e))?;

    for oid in revwalk {
        let oid = oid.map_err(|e| git_error("revwalk", e))?;
        let commit = repo.find_commit(oid).map_err(|e| git_error("find commit", e))?;

        if commit.parent_count() > 1 {
            continue;
        }

        let tree = commit.tree().map_err(|e| git_error("read tree", e))?;
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => Some(
                commit
                    .parent(0)
                    .and_then(|p| p.tree())
                    .map_err(|e| git_error("read parent tree", e))?,
            ),
        };

        let mut opts = DiffOptions::new();
        // An empty spec is the whole tree; leave the diff unscoped.
        if scope.iter().all(|p| !p.is_empty()) {
            for path in scope {
                opts.pathspec(path.as_str());
            }
        }
        let diff = repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))
            .map_err(|e| git_error("diff", e))?;

        let Some(timestamp) = Utc.timestamp_opt(commit.time().seconds(), 0).single() else {
            warn!(%oid, "commit has an out-of-range timestamp, skipping");
            continue;
        };

        for delta in diff.deltas() {
            let Some(path) = delta.new_file().path() else {
                continue;
            };
            if wanted.contains(path) && !found.contains_key(path) {
                found.insert(
                    path.to_path_buf(),
                    Provenance {
                        revision: oid.to_string(),
                        timestamp,
                    },
                );
            }
        }

        if found.len() == wanted.len() {
            break;
        }
    }

    Ok(found)
}
