//! Markdown to HTML conversion
//!
//! The only place pulldown-cmark is referenced.

use pulldown_cmark::{html, Event, Options, Parser};

/// Body used when a page has no content at all
pub const EMPTY_BODY: &str = "<p>&nbsp;</p>";

/// Minimal page shell used when no layout file exists
pub const SIMPLE_LAYOUT: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n</head>\n<body>\n{% BODY %}\n<footer><small>{% TIMESTAMP %}</small></footer>\n</body>\n</html>\n";

/// Render Markdown, treating single newlines as line breaks
pub fn markdown_to_html(markdown: &str) -> String {
    if markdown.trim().is_empty() {
        return EMPTY_BODY.to_string();
    }

    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

/// Escape text for use inside HTML content or a quoted attribute
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_markdown() {
        let html = markdown_to_html("# Title\n\nSome *text*.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn test_soft_breaks_become_hard() {
        let html = markdown_to_html("line one\nline two");
        assert!(html.contains("line one<br />"));
    }

    #[test]
    fn test_tables_enabled() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(markdown_to_html("   \n"), EMPTY_BODY);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">&'"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}
