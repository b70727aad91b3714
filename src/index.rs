//! File-backed vector index for exported chunks.
//!
//! One JSON document holds every record. The index is loaded whole, edited
//! in memory, and written back atomically with [`ChunkIndex::save`].
//! Upserts replace every record of the same `doc_id`, so re-ingesting a
//! document never leaves stale chunks behind.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docgraph_core::embedding::cosine_distance;
use docgraph_core::models::{Chunk, ChunkMetadata};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::write_atomic;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

impl IndexRecord {
    pub fn new(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: record_id(chunk),
            text: chunk.text.clone(),
            metadata: chunk.metadata(),
            vector,
        }
    }
}

/// Stable id for a chunk: SHA-256 over document id, offsets, and text.
pub fn record_id(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.doc_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(chunk.start.to_le_bytes());
    hasher.update(chunk.end.to_le_bytes());
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A ranked query result; lower distance is closer.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    records: Vec<IndexRecord>,
}

pub struct ChunkIndex {
    path: PathBuf,
    file: IndexFile,
}

impl ChunkIndex {
    /// Load the index at `path`; a missing file is an empty index.
    pub fn open(path: &Path) -> Result<Self> {
        let file = match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse index file: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexFile::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read index file: {}", path.display()))
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn len(&self) -> usize {
        self.file.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.records.is_empty()
    }

    pub fn model(&self) -> Option<&str> {
        self.file.model.as_deref()
    }

    pub fn set_model(&mut self, model: &str) {
        self.file.model = Some(model.to_string());
    }

    /// Number of distinct documents in the index.
    pub fn document_count(&self) -> usize {
        let mut ids: Vec<&str> = self
            .file
            .records
            .iter()
            .map(|r| r.metadata.doc_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Replace all records of each incoming `doc_id` with `records`.
    pub fn upsert(&mut self, records: Vec<IndexRecord>) {
        let doc_ids: std::collections::HashSet<String> =
            records.iter().map(|r| r.metadata.doc_id.clone()).collect();
        self.file
            .records
            .retain(|r| !doc_ids.contains(&r.metadata.doc_id));
        self.file.records.extend(records);
    }

    /// The `k` records closest to `vector` by cosine distance.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .file
            .records
            .iter()
            .map(|r| SearchHit {
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(vector, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.metadata.doc_id.cmp(&b.metadata.doc_id))
                .then_with(|| a.metadata.start.cmp(&b.metadata.start))
        });
        hits.truncate(k);
        hits
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.file)?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write index file: {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_core::models::ContentType;

    fn chunk(doc_id: &str, start: usize, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            start,
            end: start + text.len(),
            page: 1,
            pages: vec![1],
            page_label: "1".to_string(),
            paragraph_index: 0,
            chapter_title: "Introduction".to_string(),
            content_type: ContentType::Text,
            doc_id: doc_id.to_string(),
        }
    }

    #[test]
    fn query_ranks_by_distance() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = ChunkIndex::open(&dir.path().join("index.json")).unwrap();
        index.upsert(vec![
            IndexRecord::new(&chunk("d", 0, "east"), vec![1.0, 0.0]),
            IndexRecord::new(&chunk("d", 10, "north"), vec![0.0, 1.0]),
            IndexRecord::new(&chunk("d", 20, "northeast"), vec![0.7, 0.7]),
        ]);
        let hits = index.query(&[0.0, 1.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[1].text, "northeast");
        assert!(hits[0].distance < 1e-6);
    }

    #[test]
    fn upsert_replaces_same_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = ChunkIndex::open(&dir.path().join("index.json")).unwrap();
        index.upsert(vec![
            IndexRecord::new(&chunk("a", 0, "old one"), vec![1.0]),
            IndexRecord::new(&chunk("a", 9, "old two"), vec![1.0]),
            IndexRecord::new(&chunk("b", 0, "other"), vec![1.0]),
        ]);
        index.upsert(vec![IndexRecord::new(&chunk("a", 0, "new"), vec![1.0])]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.document_count(), 2);
    }

    #[test]
    fn save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        let mut index = ChunkIndex::open(&path).unwrap();
        index.set_model("tiny");
        index.upsert(vec![IndexRecord::new(&chunk("a", 0, "hello"), vec![0.1, 0.2])]);
        index.save().unwrap();

        let reopened = ChunkIndex::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.model(), Some("tiny"));
        assert_eq!(reopened.query(&[0.1, 0.2], 1)[0].metadata.chapter_title, "Introduction");
    }

    #[test]
    fn record_ids_differ_by_offset() {
        assert_ne!(record_id(&chunk("a", 0, "same")), record_id(&chunk("a", 5, "same")));
        assert_eq!(record_id(&chunk("a", 0, "same")).len(), 64);
    }
}
