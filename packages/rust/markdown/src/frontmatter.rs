//! TOML front matter split off the top of a content file.
//!
//! ```text
//! +++
//! title = "Hello"
//! tags = ["rust", "git"]
//! +++
//! Body...
//! ```

use serde::Deserialize;

use gitblog_shared::{BlogError, Result};

const DELIMITER: &str = "+++";

/// Recognized front matter fields. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FrontMatter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Split `source` into its front matter (if any) and body.
pub(crate) fn split(source: &str) -> Result<(FrontMatter, &str)> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);

    let Some(rest) = strip_delimiter_line(source) else {
        return Ok((FrontMatter::default(), source));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let front: FrontMatter = toml::from_str(header)
                .map_err(|e| BlogError::parse(format!("invalid front matter: {e}")))?;
            return Ok((front, body));
        }
        offset += line.len();
    }

    Err(BlogError::parse("unterminated front matter block"))
}

/// If the first line is the delimiter, return everything after it.
fn strip_delimiter_line(source: &str) -> Option<&str> {
    let (first, rest) = match source.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (source, ""),
    };
    (first.trim_end() == DELIMITER).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_front_matter_returns_whole_body() {
        let (front, body) = split("# Title\n\nText\n").unwrap();
        assert!(front.title.is_none());
        assert!(front.tags.is_empty());
        assert_eq!(body, "# Title\n\nText\n");
    }

    #[test]
    fn parses_title_and_tags() {
        let src = "+++\ntitle = \"Hello\"\ntags = [\"a\", \"b\"]\n+++\nBody\n";
        let (front, body) = split(src).unwrap();
        assert_eq!(front.title.as_deref(), Some("Hello"));
        assert_eq!(front.tags, ["a", "b"]);
        assert_eq!(body, "Body\n");
    }

    #[test]
    fn tolerates_crlf_and_bom() {
        let src = "\u{feff}+++\r\ntitle = \"Win\"\r\n+++\r\nBody";
        let (front, body) = split(src).unwrap();
        assert_eq!(front.title.as_deref(), Some("Win"));
        assert_eq!(body, "Body");
    }

    #[test]
    fn unterminated_block_is_an_error() {
        assert!(split("+++\ntitle = \"x\"\nBody\n").is_err());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(split("+++\ntitle = \n+++\nBody\n").is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let (front, _) = split("+++\ndraft = true\n+++\n").unwrap();
        assert!(front.title.is_none());
    }
}
