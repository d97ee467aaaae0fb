//! HTML to plain text.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&(#[0-9]+|[a-z]+);").unwrap());

/// Strip tags and entities.
///
/// Non-breaking spaces become spaces and `&quot;` becomes `"`; every other
/// entity is replaced by a space.
pub fn html_to_text(html: &str) -> String {
    let text = TAG_RE.replace_all(html, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&quot;", "\"");
    ENTITY_RE.replace_all(&text, " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_removed() {
        assert_eq!(
            html_to_text("<p class=\"x\">Hello <b>world</b></p><br/>"),
            "Hello world"
        );
    }

    #[test]
    fn test_entities() {
        assert_eq!(
            html_to_text("a&nbsp;b&#160;c &quot;d&quot; e&amp;f &#39;g"),
            "a b c \"d\" e f  g"
        );
    }

    #[test]
    fn test_non_tags_are_kept() {
        assert_eq!(html_to_text("1 < 2 and 3 > 2"), "1 < 2 and 3 > 2");
    }
}
