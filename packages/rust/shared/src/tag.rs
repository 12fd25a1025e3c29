//! Entry tag transforms: HTML display form and URL form.
//!
//! Encoding is `application/x-www-form-urlencoded` over UTF-8: ASCII
//! alphanumerics and `*-._` pass through, space becomes `+`, every other
//! byte becomes an uppercase `%XX`. Escaping always runs after encoding;
//! percent-encoded text holds no HTML-reserved characters, so escaping it
//! is a no-op, whereas encoding escaped text would mangle the entities.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// A single content label, as authored in an entry's front matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryTag(String);

impl EntryTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as authored.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// HTML-escaped, for labels in rendered markup. Not URL safe.
    pub fn display_text(&self) -> String {
        escape_tag(&self.0)
    }

    /// Percent-encoded, for appending onto a URL.
    pub fn url_encoded_text(&self) -> String {
        encode_tag(&self.0)
    }

    /// Percent-encoded then HTML-escaped, for URLs inside attributes.
    pub fn encoded_and_escaped_text(&self) -> String {
        encode_and_escape_tag(&self.0)
    }
}

impl std::fmt::Display for EntryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Form-urlencode a tag.
pub fn encode_tag(tag: &str) -> String {
    form_urlencoded::byte_serialize(tag.as_bytes()).collect()
}

/// Replace HTML-reserved characters with their entity equivalents.
pub fn escape_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    for c in tag.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Encode first, then escape.
pub fn encode_and_escape_tag(tag: &str) -> String {
    escape_tag(&encode_tag(tag))
}
