//! Chapter-aware chunk annotation.
//!
//! [`ChunkAnnotator`] turns the full text of a document (and optionally
//! its source map) into [`Chunk`]s carrying offsets, chapter, page and
//! paragraph attribution, and a content-type label.
//!
//! # Algorithm
//!
//! 1. Detect chapter headings (`Chapter 3 ...`, `section 2 ...`). With no
//!    match the whole document is one synthetic `"Introduction"` chapter.
//! 2. Split the text with the [`RecursiveSplitter`].
//! 3. Recover each chunk's start offset by searching for its text at or
//!    after the previous chunk's end moved back by the overlap, falling
//!    back to a search from the beginning.
//! 4. Advance the chapter pointer past every heading at or before the
//!    chunk start. The pointer never moves backwards.
//! 5. Attribute pages and paragraphs from every overlapping span.
//! 6. Classify the chunk as prose or code.
//!
//! # Example
//!
//! ```rust
//! use docgraph_core::chunk::ChunkAnnotator;
//!
//! let text = "Chapter 1 Intro\n\nAlice founded Acme.";
//! let chunks = ChunkAnnotator::default().annotate("doc-1", text, None);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chapter_title, "Chapter 1 Intro");
//! ```

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::content;
use crate::models::{Chapter, Chunk, SourceSpan};
use crate::split::RecursiveSplitter;

pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 300;

static CHAPTER_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^((?:chapter|section)[ \t]+\d+[^\n]*)").expect("valid regex")
});

/// Find chapter headings in `text`, in offset order.
pub fn detect_chapters(text: &str) -> Vec<Chapter> {
    let chapters: Vec<Chapter> = CHAPTER_HEADING
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| Chapter {
            start_offset: m.start(),
            title: m.as_str().trim().to_string(),
        })
        .collect();

    if chapters.is_empty() {
        vec![Chapter::introduction()]
    } else {
        chapters
    }
}

/// Splits documents into annotated, overlapping chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkAnnotator {
    splitter: RecursiveSplitter,
}

impl ChunkAnnotator {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            splitter: RecursiveSplitter::new(chunk_size, chunk_overlap),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.splitter.chunk_size()
    }

    pub fn chunk_overlap(&self) -> usize {
        self.splitter.chunk_overlap()
    }

    /// Annotate `text` for document `doc_id`.
    ///
    /// When `spans` is `None` every chunk gets page label `"Unknown"`,
    /// primary page 1 and paragraph 0.
    pub fn annotate(&self, doc_id: &str, text: &str, spans: Option<&[SourceSpan]>) -> Vec<Chunk> {
        let chapters = detect_chapters(text);
        let pieces = self.splitter.split(text);

        let mut chunks = Vec::with_capacity(pieces.len());
        let mut lower_bound = 0usize;
        let mut chapter_idx = 0usize;

        for piece in pieces {
            let start = locate(text, &piece, lower_bound);
            let end = start + piece.len();
            lower_bound = retreat_chars(text, end, self.splitter.chunk_overlap());

            while chapter_idx + 1 < chapters.len()
                && start >= chapters[chapter_idx + 1].start_offset
            {
                chapter_idx += 1;
            }

            let attribution = attribute(start, end, spans.unwrap_or(&[]));
            let content_type = content::classify(&piece);

            chunks.push(Chunk {
                text: piece,
                start,
                end,
                page: attribution.page,
                pages: attribution.pages,
                page_label: attribution.label,
                paragraph_index: attribution.paragraph_index,
                chapter_title: chapters[chapter_idx].title.clone(),
                content_type,
                doc_id: doc_id.to_string(),
            });
        }

        chunks
    }
}

/// Byte offset of `needle` in `text`, preferring matches at or after
/// `lower_bound`.
fn locate(text: &str, needle: &str, lower_bound: usize) -> usize {
    let from = floor_char_boundary(text, lower_bound);
    text[from..]
        .find(needle)
        .map(|i| from + i)
        .or_else(|| text.find(needle))
        .unwrap_or(from)
}

/// Move back `chars` characters from byte offset `end`.
fn retreat_chars(text: &str, end: usize, chars: usize) -> usize {
    if chars == 0 {
        return end;
    }
    text[..end]
        .char_indices()
        .rev()
        .nth(chars - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

struct Attribution {
    page: u32,
    pages: Vec<u32>,
    label: String,
    paragraph_index: usize,
}

fn attribute(start: usize, end: usize, spans: &[SourceSpan]) -> Attribution {
    let mut pages = BTreeSet::new();
    let mut paragraphs = BTreeSet::new();
    for span in spans {
        if start.max(span.start) < end.min(span.end) {
            pages.insert(span.page);
            paragraphs.insert(span.paragraph_index);
        }
    }

    let pages: Vec<u32> = pages.into_iter().collect();
    let label = if pages.is_empty() {
        "Unknown".to_string()
    } else {
        pages
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    Attribution {
        page: pages.first().copied().unwrap_or(1),
        label,
        pages,
        paragraph_index: paragraphs.first().copied().unwrap_or(0),
    }
}
