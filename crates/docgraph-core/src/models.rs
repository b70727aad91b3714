//! Core data models shared by the ingestion and graph pipelines.
//!
//! Offsets are UTF-8 byte offsets into the reconstructed full text of a
//! document, so `&text[span.start..span.end]` is always a valid slice.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Offset range in the extracted full text, attributed to one page and
/// one paragraph of the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    /// 1-based physical page number.
    pub page: u32,
    pub paragraph_index: usize,
}

/// Position of a detected chapter or section heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub start_offset: usize,
    pub title: String,
}

impl Chapter {
    /// The synthetic chapter used when a document has no detectable headings.
    pub fn introduction() -> Self {
        Self {
            start_offset: 0,
            title: "Introduction".to_string(),
        }
    }
}

/// Coarse classification of a chunk's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Code,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Code => "code",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded, overlapping window of document text annotated with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// Smallest overlapping page, or 1 when no span overlaps.
    pub page: u32,
    /// Every overlapping page, ascending.
    pub pages: Vec<u32>,
    /// `pages` joined with `", "`, or `"Unknown"`.
    pub page_label: String,
    pub paragraph_index: usize,
    pub chapter_title: String,
    pub content_type: ContentType,
    pub doc_id: String,
}

impl Chunk {
    /// The metadata record exported to the vector index alongside the text.
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            page_label: self.page_label.clone(),
            page: self.page,
            paragraph_index: self.paragraph_index,
            chapter_title: self.chapter_title.clone(),
            content_type: self.content_type,
            doc_id: self.doc_id.clone(),
            start: self.start,
            end: self.end,
        }
    }
}

/// Per-chunk metadata stored next to its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub page_label: String,
    pub page: u32,
    pub paragraph_index: usize,
    pub chapter_title: String,
    pub content_type: ContentType,
    pub doc_id: String,
    pub start: usize,
    pub end: usize,
}

/// A normalized subject–predicate–object fact.
///
/// Construct through [`Triple::new`], which case-folds and trims every
/// field and rejects triples with an empty component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(subject: &str, predicate: &str, object: &str) -> Option<Self> {
        let subject = normalize_entity(subject);
        let predicate = normalize_entity(predicate);
        let object = normalize_entity(object);
        if subject.is_empty() || predicate.is_empty() || object.is_empty() {
            return None;
        }
        Some(Self {
            subject,
            predicate,
            object,
        })
    }
}

/// Canonical form used for graph node names and relation labels.
pub fn normalize_entity(raw: &str) -> String {
    raw.trim().to_lowercase()
}
