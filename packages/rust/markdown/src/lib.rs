//! Markdown-to-HTML conversion for blog content files.
//!
//! Splits optional TOML front matter off the raw file, renders the body with
//! `pulldown-cmark`, and works out a title from the front matter or the
//! first level-one heading.

mod frontmatter;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html::push_html};
use tracing::{debug, instrument};

use gitblog_shared::{BlogError, EntryTag, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of rendering one content file.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    /// Title from front matter, else the first `# ` heading.
    pub title: Option<String>,
    /// Tags declared in front matter, in authored order.
    pub tags: Vec<EntryTag>,
    /// Rendered HTML body.
    pub html: String,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Stateless markdown renderer.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownConverter {
    options: Options,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownConverter {
    /// GFM-style extensions: tables, strikethrough, task lists, footnotes.
    pub fn new() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_FOOTNOTES,
        }
    }

    /// Render a raw content file.
    ///
    /// Fails on non-UTF-8 input and on malformed front matter; the caller
    /// decides whether that skips the file.
    #[instrument(skip_all, fields(len = raw.len()))]
    pub fn render(&self, raw: &[u8]) -> Result<RenderedContent> {
        let source = std::str::from_utf8(raw)
            .map_err(|e| BlogError::Conversion(format!("content is not valid UTF-8: {e}")))?;

        let (front, body) = frontmatter::split(source)?;

        let (html, heading) = self.render_body(body);

        let title = front
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or(heading);

        let tags = front
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(EntryTag::new)
            .collect();

        debug!(title = ?title, html_len = html.len(), "render complete");

        Ok(RenderedContent { title, tags, html })
    }

    /// Render markdown text (no front matter handling) to HTML.
    pub fn render_html(&self, markdown: &str) -> String {
        self.render_body(markdown).0
    }

    /// HTML plus the plain text of the first level-one heading, collected
    /// from the same event stream.
    fn render_body(&self, markdown: &str) -> (String, Option<String>) {
        let mut heading = HeadingText::default();
        let parser =
            Parser::new_ext(markdown, self.options).inspect(|event| heading.observe(event));

        let mut html = String::with_capacity(markdown.len() * 3 / 2);
        push_html(&mut html, parser);
        (html, heading.finish())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Accumulates the text of the first H1 (ATX or setext) seen in a stream.
#[derive(Debug, Default)]
struct HeadingText {
    text: String,
    inside: bool,
    done: bool,
}

impl HeadingText {
    fn observe(&mut self, event: &Event<'_>) {
        if self.done {
            return;
        }
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => self.inside = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                self.inside = false;
                self.done = !self.text.trim().is_empty();
                if !self.done {
                    self.text.clear();
                }
            }
            Event::Text(text) | Event::Code(text) if self.inside => self.text.push_str(text),
            _ => {}
        }
    }

    fn finish(self) -> Option<String> {
        self.done.then(|| self.text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn render(src: &str) -> RenderedContent {
        MarkdownConverter::new().render(src.as_bytes()).unwrap()
    }

    #[test]
    fn renders_basic_markdown() {
        let result = render("# Hello World\n\nSome *text*.\n");
        assert!(result.html.contains("<h1>Hello World</h1>"));
        assert!(result.html.contains("<em>text</em>"));
        assert_eq!(result.title.as_deref(), Some("Hello World"));
    }

    #[test]
    fn front_matter_title_beats_heading() {
        let result = render("+++\ntitle = \"From Front Matter\"\n+++\n# Heading\n");
        assert_eq!(result.title.as_deref(), Some("From Front Matter"));
        assert!(!result.html.contains("+++"));
        assert!(!result.html.contains("From Front Matter"));
    }

    #[test]
    fn blank_front_matter_title_falls_back_to_heading() {
        let result = render("+++\ntitle = \"  \"\n+++\n# Heading\n");
        assert_eq!(result.title.as_deref(), Some("Heading"));
    }

    #[test]
    fn tags_are_trimmed_and_blank_ones_dropped() {
        let result = render("+++\ntags = [\" rust \", \"\", \"C++ & Java\"]\n+++\nBody\n");
        let tags: Vec<_> = result.tags.iter().map(EntryTag::as_str).collect();
        assert_eq!(tags, ["rust", "C++ & Java"]);
    }

    #[test]
    fn no_title_when_no_heading() {
        let result = render("Just a paragraph.\n\n## Second level\n");
        assert!(result.title.is_none());
    }

    #[test]
    fn heading_title_strips_closing_hashes() {
        assert_eq!(render("# Title ##\n").title.as_deref(), Some("Title"));
        assert_eq!(render("# C#\n").title.as_deref(), Some("C#"));
        assert_eq!(render("#NoSpace\n").title, None);
    }

    #[test]
    fn heading_title_is_plain_text() {
        let result = render("# Hello *big* `world`\n");
        assert_eq!(result.title.as_deref(), Some("Hello big world"));
    }

    #[test]
    fn setext_heading_is_a_title() {
        assert_eq!(render("Underlined\n==========\n").title.as_deref(), Some("Underlined"));
    }

    #[test]
    fn comment_in_code_block_is_not_a_title() {
        let result = render("Intro text.\n\n```sh\n# install deps\nmake\n```\n");
        assert!(result.title.is_none());
        assert!(result.html.contains("# install deps"));

        let result = render("```sh\n# install deps\n```\n\n# Real Title\n");
        assert_eq!(result.title.as_deref(), Some("Real Title"));
    }

    #[test]
    fn renders_tables_and_strikethrough() {
        let result = render("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n");
        assert!(result.html.contains("<table>"));
        assert!(result.html.contains("<del>gone</del>"));
    }

    #[test]
    fn renders_code_blocks() {
        let result = render("```rust\nfn main() {}\n```\n");
        assert!(result.html.contains("<code class=\"language-rust\">"));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = MarkdownConverter::new().render(&[0x23, 0x20, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, BlogError::Conversion(_)));
    }

    #[test]
    fn malformed_front_matter_is_rejected() {
        let err = MarkdownConverter::new()
            .render(b"+++\ntitle = \"x\"\n")
            .unwrap_err();
        assert!(matches!(err, BlogError::Parse { .. }));
    }

    #[test]
    fn empty_input_renders_empty() {
        let result = render("");
        assert!(result.html.is_empty());
        assert!(result.title.is_none());
    }
}
