//! Content-type classification for chunks.
//!
//! A chunk counts as code when it contains at least one block found by
//! one of three heuristics:
//!
//! - fenced blocks delimited by triple backticks,
//! - single-line inline backtick spans longer than 10 characters,
//! - two or more consecutive lines indented by four spaces or a tab that
//!   also contain a code indicator token.
//!
//! Blocks of 20 characters or fewer after trimming are treated as noise.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ContentType;

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z0-9_\-]*\n(.*?)```").expect("valid regex"));
static INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));
static INDENTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:\n(?: {4}|\t).+){2,})").expect("valid regex"));

const CODE_INDICATORS: [&str; 11] = [
    "{", "}", "=", "(", ")", "def ", "import ", "return", "var ", "const ", "function",
];

const MIN_INLINE_CHARS: usize = 10;
const MIN_BLOCK_CHARS: usize = 20;

/// Collect every code block that survives the heuristics, trimmed.
pub fn extract_code_blocks(text: &str) -> Vec<String> {
    let fenced = FENCED
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str());
    let inline = INLINE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| s.chars().count() > MIN_INLINE_CHARS);
    let indented = INDENTED
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|block| CODE_INDICATORS.iter().any(|ind| block.contains(ind)));

    fenced
        .chain(inline)
        .chain(indented)
        .map(str::trim)
        .filter(|b| b.chars().count() > MIN_BLOCK_CHARS)
        .map(str::to_string)
        .collect()
}

pub fn classify(text: &str) -> ContentType {
    if extract_code_blocks(text).is_empty() {
        ContentType::Text
    } else {
        ContentType::Code
    }
}
