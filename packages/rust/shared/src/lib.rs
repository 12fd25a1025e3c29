//! Shared types, error model, and configuration for gitblog.
//!
//! This crate is the foundation depended on by all other gitblog crates.
//! It provides:
//! - [`BlogError`] — the unified error type
//! - Domain types ([`ContentEntity`], [`ContentSnapshot`], [`Provenance`], [`EntryTag`])
//! - Configuration ([`Configuration`], [`BlogSettings`], override loading)

pub mod config;
pub mod error;
pub mod tag;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BlogSettings, CloneSettings, Configuration, ContentSettings, locate_override_file,
    locate_override_file_with,
};
pub use error::{BlogError, Result};
pub use tag::{EntryTag, encode_and_escape_tag, encode_tag, escape_tag};
pub use types::{
    ContentEntity, ContentKind, ContentSnapshot, DATE_DISPLAY_FORMAT, Entry, INDEX_NAME, Index,
    Page, Provenance,
};
