//! Text cleanup passes applied after visible text is collected.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw extracted text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = text.replace("\r\n", "\n");

    result = strip_permalink_marks(&result);
    result = collapse_inline_whitespace(&result);
    result = collapse_blank_lines(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Heading permalink glyphs
// ---------------------------------------------------------------------------

/// Remove the `¶` anchors Sphinx and MkDocs append to headings.
fn strip_permalink_marks(text: &str) -> String {
    text.replace('\u{00B6}', "")
}

// ---------------------------------------------------------------------------
// Pass 2: Inline whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces, tabs, and non-breaking spaces into one space.
fn collapse_inline_whitespace(text: &str) -> String {
    static INLINE_WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\r\x0B\x0C\u{00A0}]+").expect("valid regex"));

    INLINE_WS_RE.replace_all(text, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Line trimming
// ---------------------------------------------------------------------------

/// Trim every line and keep at most one blank line between paragraphs.
fn collapse_blank_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    if lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
