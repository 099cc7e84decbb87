//! Plain-text cleanup passes applied after text extraction.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on extracted text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = text.to_string();

    result = collapse_line_whitespace(&result);
    result = drop_blank_lines(&result);

    result
}

/// Collapse runs of spaces, tabs and non-breaking spaces and trim the ends.
pub(crate) fn collapse_spaces(text: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{00A0}\r\n]+").expect("valid regex"));

    SPACES_RE.replace_all(text, " ").trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Collapse whitespace within each line
// ---------------------------------------------------------------------------

fn collapse_line_whitespace(text: &str) -> String {
    text.lines()
        .map(collapse_spaces)
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Drop blank lines
// ---------------------------------------------------------------------------

fn drop_blank_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_inner_whitespace() {
        assert_eq!(collapse_spaces("  a \t b\u{00A0}\u{00A0}c  "), "a b c");
    }

    #[test]
    fn pipeline_joins_non_blank_lines() {
        let raw = "\n  Title  \n\n\n   body   text \n \t \nend";
        assert_eq!(run_pipeline(raw), "Title\nbody text\nend");
    }
}
