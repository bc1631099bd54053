//! Markdown assembly for converted pages
//!
//! Each page becomes a `## Page N` section holding its tables and its
//! cleaned text blocks; pages are joined with [`PAGE_SEPARATOR`].

use once_cell::sync::Lazy;
use regex::Regex;

/// Placed between consecutive page sections
pub const PAGE_SEPARATOR: &str = "\n---\n";

/// Normalize block text for output.
///
/// - Words hyphenated across a line break are joined ("docu-\nment" -> "document")
/// - Soft hyphens (U+00AD) are removed
/// - Runs of whitespace collapse to a single space, ends trimmed
pub fn clean_text(text: &str) -> String {
    static BROKEN_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)-\s*\n\s*(\w+)").unwrap());
    static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

    let joined = BROKEN_WORD_RE.replace_all(text, "${1}${2}");
    let without_soft = joined.replace('\u{00AD}', "");
    WHITESPACE_RE
        .replace_all(&without_soft, " ")
        .trim()
        .to_string()
}

/// Assemble one page section from rendered tables and cleaned text parts
pub fn render_page(page_num: u32, tables: &[String], text_parts: &[String]) -> String {
    let mut sections = vec![format!("## Page {}", page_num)];

    if !tables.is_empty() {
        sections.push(format!("### Tables\n{}", tables.join("\n")));
    }
    if !text_parts.is_empty() {
        sections.push(format!("### Text Content\n{}", text_parts.join("\n\n")));
    }

    sections.join("\n\n")
}

/// Section emitted in place of a page that could not be processed
pub fn page_error(page_num: u32, err: &impl std::fmt::Display) -> String {
    format!("## Page {}\n\nProcessing error: {}", page_num, err)
}
