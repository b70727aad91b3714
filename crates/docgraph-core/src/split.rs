//! Recursive character text splitter.
//!
//! Splits text on the coarsest separator that occurs in it (`"\n\n"`,
//! then `"\n"`, then `" "`, then individual characters), recursing into
//! pieces that are still too long, and merges adjacent pieces into
//! windows of at most `chunk_size` characters that share up to
//! `chunk_overlap` characters with their predecessor.
//!
//! Separators stay attached to the start of the piece that follows them,
//! so every merged window is a contiguous substring of the input. Windows
//! are whitespace-trimmed before they are returned.
//!
//! The splitter only returns the chunk strings. Recovering their offsets
//! is the caller's job (see [`crate::chunk`]).

use std::collections::VecDeque;
use std::ops::Range;

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Character-length recursive splitter.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    /// Lengths are counted in characters. `chunk_size` is clamped to at
    /// least 2 and `chunk_overlap` to below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(2);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty windows in source order.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_range(text, 0..text.len(), &SEPARATORS)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn split_range<'a>(
        &self,
        root: &'a str,
        range: Range<usize>,
        separators: &[&str],
    ) -> Vec<&'a str> {
        let slice = &root[range.clone()];
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || slice.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = &separators[(position + 1).min(separators.len())..];

        let mut out = Vec::new();
        let mut pending: Vec<Range<usize>> = Vec::new();
        for piece in split_keep_start(root, range, separator) {
            if char_len(&root[piece.clone()]) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                out.extend(self.merge(root, &pending));
                pending.clear();
            }
            if finer.is_empty() {
                let trimmed = root[piece].trim();
                if !trimmed.is_empty() {
                    out.push(trimmed);
                }
            } else {
                out.extend(self.split_range(root, piece, finer));
            }
        }
        if !pending.is_empty() {
            out.extend(self.merge(root, &pending));
        }
        out
    }

    /// Merge adjacent pieces into overlapping windows.
    ///
    /// `pieces` must be contiguous: each one starts where the previous ended.
    fn merge<'a>(&self, root: &'a str, pieces: &[Range<usize>]) -> Vec<&'a str> {
        let mut docs = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&root[piece.clone()]);
            if total + len > self.chunk_size && !window.is_empty() {
                push_window(root, &window, &mut docs);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, popped)) => total -= popped,
                        None => break,
                    }
                }
            }
            window.push_back((piece.clone(), len));
            total += len;
        }
        push_window(root, &window, &mut docs);
        docs
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self::new(2000, 300)
    }
}

fn push_window<'a>(
    root: &'a str,
    window: &VecDeque<(Range<usize>, usize)>,
    docs: &mut Vec<&'a str>,
) {
    let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) else {
        return;
    };
    let doc = root[first.start..last.end].trim();
    if !doc.is_empty() {
        docs.push(doc);
    }
}

/// Split `root[range]` on `separator`, attaching each separator to the
/// start of the piece that follows it. Empty pieces are dropped.
fn split_keep_start(root: &str, range: Range<usize>, separator: &str) -> Vec<Range<usize>> {
    let slice = &root[range.clone()];
    if separator.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| range.start + i..range.start + i + c.len_utf8())
            .collect();
    }

    let mut pieces = Vec::new();
    let mut piece_start = range.start;
    for (i, _) in slice.match_indices(separator) {
        let at = range.start + i;
        if at > piece_start {
            pieces.push(piece_start..at);
        }
        piece_start = at;
    }
    if piece_start < range.end {
        pieces.push(piece_start..range.end);
    }
    pieces
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}
