//! Core domain types for published blog content.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tag::EntryTag;

/// Display format for entity dates, e.g. `March 4, 2015`.
pub const DATE_DISPLAY_FORMAT: &str = "%B %-d, %Y";

/// Name of the synthetic index entity.
pub const INDEX_NAME: &str = "index";

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// The last revision that touched a content file, and when it was made.
///
/// Revision id and timestamp travel together; an entity either has both or
/// neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Full hex id of the revision.
    #[serde(rename = "commit")]
    pub revision: String,
    /// Committer time of that revision.
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
}

impl Provenance {
    /// Abbreviated revision id for display.
    pub fn short_revision(&self) -> &str {
        let end = self
            .revision
            .char_indices()
            .nth(7)
            .map_or(self.revision.len(), |(i, _)| i);
        &self.revision[..end]
    }
}

// ---------------------------------------------------------------------------
// ContentEntity
// ---------------------------------------------------------------------------

/// Discriminant of a [`ContentEntity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Index,
    Entry,
    Page,
}

impl ContentKind {
    /// Template the rendering layer uses for this kind.
    pub fn template_name(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Entry => "entry",
            Self::Page => "page",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.template_name())
    }
}

/// A dated blog entry.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub name: String,
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<EntryTag>,
    #[serde(flatten)]
    pub provenance: Provenance,
    pub html: String,
}

/// A static page.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub name: String,
    pub title: String,
    #[serde(flatten)]
    pub provenance: Provenance,
    pub html: String,
}

/// The synthetic index wrapper over the published entries. No body, no
/// provenance.
#[derive(Debug, Clone, Serialize)]
pub struct Index {
    pub name: String,
    pub title: String,
    /// Names of the published entries, most recent first.
    pub entries: Vec<String>,
}

/// One published unit of content.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentEntity {
    Index(Index),
    Entry(Entry),
    Page(Page),
}

impl ContentEntity {
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Index(_) => ContentKind::Index,
            Self::Entry(_) => ContentKind::Entry,
            Self::Page(_) => ContentKind::Page,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Index(index) => &index.name,
            Self::Entry(entry) => &entry.name,
            Self::Page(page) => &page.name,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Index(index) => &index.title,
            Self::Entry(entry) => &entry.title,
            Self::Page(page) => &page.title,
        }
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        match self {
            Self::Index(_) => None,
            Self::Entry(entry) => Some(&entry.provenance),
            Self::Page(page) => Some(&page.provenance),
        }
    }

    /// Rendered HTML body, absent for the index.
    pub fn html(&self) -> Option<&str> {
        match self {
            Self::Index(_) => None,
            Self::Entry(entry) => Some(&entry.html),
            Self::Page(page) => Some(&page.html),
        }
    }

    pub fn template_name(&self) -> &'static str {
        self.kind().template_name()
    }

    /// Last-modified date in [`DATE_DISPLAY_FORMAT`].
    pub fn formatted_date(&self) -> Option<String> {
        self.provenance()
            .map(|p| p.timestamp.format(DATE_DISPLAY_FORMAT).to_string())
    }
}

impl std::fmt::Display for ContentEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}, {})", self.kind(), self.name(), self.title())
    }
}

// ---------------------------------------------------------------------------
// ContentSnapshot
// ---------------------------------------------------------------------------

/// An immutable, fully built content set.
///
/// Holds exactly one index, then entries newest-first (never more than the
/// entry limit), then pages ordered by name.
#[derive(Debug, Clone, Serialize)]
pub struct ContentSnapshot {
    /// Mirror sync sequence this snapshot was built from.
    pub sequence: u64,
    /// Working-copy revision this snapshot was built from.
    pub revision: Option<String>,
    pub built_at: DateTime<Utc>,
    entities: Vec<ContentEntity>,
}

impl ContentSnapshot {
    /// Order, truncate and index the given entries and pages.
    ///
    /// Names must already be unique within each kind.
    pub fn new(
        sequence: u64,
        revision: Option<String>,
        title: impl Into<String>,
        mut entries: Vec<Entry>,
        mut pages: Vec<Page>,
        entry_limit: usize,
    ) -> Self {
        entries.sort_by(|a, b| {
            b.provenance
                .timestamp
                .cmp(&a.provenance.timestamp)
                .then_with(|| a.name.cmp(&b.name))
        });
        entries.truncate(entry_limit);
        pages.sort_by(|a, b| a.name.cmp(&b.name));

        let index = Index {
            name: INDEX_NAME.to_string(),
            title: title.into(),
            entries: entries.iter().map(|e| e.name.clone()).collect(),
        };

        let mut entities = Vec::with_capacity(1 + entries.len() + pages.len());
        entities.push(ContentEntity::Index(index));
        entities.extend(entries.into_iter().map(ContentEntity::Entry));
        entities.extend(pages.into_iter().map(ContentEntity::Page));

        Self {
            sequence,
            revision,
            built_at: Utc::now(),
            entities,
        }
    }

    /// A snapshot with an index and nothing else.
    pub fn empty(sequence: u64, title: impl Into<String>) -> Self {
        Self::new(sequence, None, title, Vec::new(), Vec::new(), 0)
    }

    /// All entities: index, entries, pages.
    pub fn entities(&self) -> &[ContentEntity] {
        &self.entities
    }

    pub fn index(&self) -> Option<&Index> {
        self.entities.iter().find_map(|e| match e {
            ContentEntity::Index(index) => Some(index),
            _ => None,
        })
    }

    /// Published entries, most recent first.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entities.iter().filter_map(|e| match e {
            ContentEntity::Entry(entry) => Some(entry),
            _ => None,
        })
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.entities.iter().filter_map(|e| match e {
            ContentEntity::Page(page) => Some(page),
            _ => None,
        })
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries().find(|e| e.name == name)
    }

    pub fn page(&self, name: &str) -> Option<&Page> {
        self.pages().find(|p| p.name == name)
    }

    pub fn get(&self, kind: ContentKind, name: &str) -> Option<&ContentEntity> {
        self.entities
            .iter()
            .find(|e| e.kind() == kind && e.name() == name)
    }

    pub fn entry_count(&self) -> usize {
        self.entries().count()
    }

    pub fn page_count(&self) -> usize {
        self.pages().count()
    }

    /// Entries carrying the given tag, most recent first.
    pub fn entries_tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries()
            .filter(move |e| e.tags.iter().any(|t| t.as_str() == tag))
    }
}
