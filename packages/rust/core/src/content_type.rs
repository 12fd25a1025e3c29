//! File extension → media type lookup backed by the `content-types` table.

use std::path::Path;
use std::sync::Arc;

use gitblog_shared::Configuration;

/// Config table holding the extension map.
const CONTENT_TYPES_KEY: &str = "content-types";

/// Resolves media types from configuration. Total over its input: every
/// lookup failure yields the caller's fallback.
#[derive(Debug, Clone)]
pub struct ContentTypeResolver {
    config: Arc<Configuration>,
}

impl ContentTypeResolver {
    pub fn new(config: Arc<Configuration>) -> Self {
        Self { config }
    }

    /// Media type for `extension` (with or without a leading dot), or
    /// `fallback` when the map or the key is missing.
    pub fn resolve(&self, extension: &str, fallback: &str) -> String {
        let ext = extension.trim_start_matches('.');
        let Ok(types) = self.config.get_table(CONTENT_TYPES_KEY) else {
            return fallback.to_string();
        };

        types
            .get(ext)
            .or_else(|| types.get(&ext.to_ascii_lowercase()))
            .and_then(toml::Value::as_str)
            .map_or_else(|| fallback.to_string(), str::to_string)
    }

    /// Media type for a file path's extension.
    pub fn resolve_path(&self, path: &Path, fallback: &str) -> String {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.resolve(ext, fallback),
            None => fallback.to_string(),
        }
    }
}
