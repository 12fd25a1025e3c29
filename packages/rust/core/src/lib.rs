//! Content synchronization and ingestion pipeline for gitblog.
//!
//! This crate ties together the repository mirror, the content index
//! builder, and the published snapshot into one sync service, plus the
//! media-type lookup the rendering layer uses for static files.

pub mod content_type;
pub mod index;
pub mod mirror;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testutil;

pub use content_type::ContentTypeResolver;
pub use index::ContentIndexBuilder;
pub use mirror::{MirrorState, RepositoryMirror, SyncOutcome};
pub use store::ContentStore;
pub use sync::{SchedulerHandle, SyncService};
