//! Ingestion pipeline: files → chunks → vector index and knowledge graph.
//!
//! ```text
//! scan ──► per document (concurrent tokio task):
//!            extract (blocking pool)
//!              └─► annotate into chunks
//!                    ├─► embed + upsert into the chunk index   (if enabled)
//!                    └─► extract triples, one model call per chunk
//!                          └─► GraphStore::merge (blocking, file lock)
//! ```
//!
//! Triple extraction runs without any lock, so documents overlap freely;
//! the snapshot merge is the only point where they serialize. A document
//! that fails is reported and skipped; the others carry on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use docgraph_core::chunk::ChunkAnnotator;
use docgraph_core::llm::LanguageModel;
use docgraph_core::models::{Chunk, ContentType, Triple};
use docgraph_core::triples::TripleExtractor;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embedding::{embed_all, Embedder};
use crate::extract::extract_document;
use crate::index::{ChunkIndex, IndexRecord};
use crate::scan::{scan_paths, SourceFile};
use crate::store::{GraphStore, MergeReport};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Skip triple extraction and graph merging.
    pub skip_graph: bool,
    /// Override the document id; only valid for a single input file.
    pub doc_id: Option<String>,
}

/// Outcome for one successfully ingested document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub doc_id: String,
    pub path: PathBuf,
    pub format: &'static str,
    pub pages: u32,
    pub paragraphs: usize,
    pub chunks: usize,
    pub code_chunks: usize,
    pub indexed: usize,
    pub triples: usize,
    pub graph: Option<MergeReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub doc_id: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub documents: Vec<DocumentReport>,
    pub failed: Vec<FailedDocument>,
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize {
        self.documents.iter().map(|d| d.chunks).sum()
    }

    pub fn total_triples(&self) -> usize {
        self.documents.iter().map(|d| d.triples).sum()
    }
}

/// Shared by every document task.
struct Pipeline {
    annotator: ChunkAnnotator,
    store: GraphStore,
    llm: Arc<dyn LanguageModel>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Mutex<ChunkIndex>>,
    batch_size: usize,
    rate_limit: Duration,
    skip_graph: bool,
}

/// Ingest every document under `paths`.
///
/// Returns an error only for setup problems (bad paths, unreadable index,
/// failed index write); per-document failures land in
/// [`IngestReport::failed`].
pub async fn ingest_paths(
    config: &Config,
    paths: &[PathBuf],
    llm: Arc<dyn LanguageModel>,
    embedder: Option<Arc<dyn Embedder>>,
    options: IngestOptions,
) -> Result<IngestReport> {
    let mut files = scan_paths(paths, &config.ingest)?;
    if let Some(doc_id) = options.doc_id {
        if files.len() != 1 {
            bail!("--doc-id requires exactly one input file, found {}", files.len());
        }
        files[0].doc_id = doc_id;
    }
    if files.is_empty() {
        warn!("no documents matched");
        return Ok(IngestReport::default());
    }

    let index = match &embedder {
        Some(e) => {
            let mut index = ChunkIndex::open(&config.index.path)?;
            if let Some(existing) = index.model() {
                if existing != e.model_name() {
                    bail!(
                        "index {} was built with model '{}', configured model is '{}'",
                        config.index.path.display(),
                        existing,
                        e.model_name()
                    );
                }
            }
            index.set_model(e.model_name());
            Some(Mutex::new(index))
        }
        None => None,
    };

    let pipeline = Arc::new(Pipeline {
        annotator: ChunkAnnotator::new(config.chunking.chunk_size, config.chunking.chunk_overlap),
        store: GraphStore::new(&config.graph.path),
        llm,
        embedder,
        index,
        batch_size: config.embedding.batch_size,
        rate_limit: Duration::from_millis(config.llm.rate_limit_ms),
        skip_graph: options.skip_graph,
    });

    info!(documents = files.len(), "ingesting");
    let mut tasks = JoinSet::new();
    for (pos, file) in files.into_iter().enumerate() {
        let pipeline = Arc::clone(&pipeline);
        tasks.spawn(async move {
            let doc_id = file.doc_id.clone();
            (pos, doc_id, ingest_document(&pipeline, file).await)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.context("ingest task panicked")?);
    }
    results.sort_by_key(|(pos, _, _)| *pos);

    let mut report = IngestReport::default();
    for (_, doc_id, result) in results {
        match result {
            Ok(doc) => report.documents.push(doc),
            Err(e) => {
                error!(doc_id = %doc_id, error = %format!("{e:#}"), "document failed");
                report.failed.push(FailedDocument {
                    doc_id,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    if let Some(index) = &pipeline.index {
        index.lock().await.save()?;
    }

    info!(
        documents = report.documents.len(),
        failed = report.failed.len(),
        chunks = report.total_chunks(),
        triples = report.total_triples(),
        "ingest complete"
    );
    Ok(report)
}

async fn ingest_document(pipeline: &Pipeline, file: SourceFile) -> Result<DocumentReport> {
    let path = file.path.clone();
    let extracted = tokio::task::spawn_blocking(move || extract_document(&path))
        .await
        .context("extraction task panicked")?
        .with_context(|| format!("Failed to extract {}", file.path.display()))?;

    let chunks = pipeline
        .annotator
        .annotate(&file.doc_id, &extracted.text, Some(&extracted.spans));
    info!(
        doc_id = %file.doc_id,
        format = extracted.format.as_str(),
        paragraphs = extracted.spans.len(),
        chunks = chunks.len(),
        "document chunked"
    );

    let mut report = DocumentReport {
        doc_id: file.doc_id.clone(),
        path: file.path.clone(),
        format: extracted.format.as_str(),
        pages: extracted.page_count(),
        paragraphs: extracted.spans.len(),
        chunks: chunks.len(),
        code_chunks: chunks
            .iter()
            .filter(|c| c.content_type == ContentType::Code)
            .count(),
        indexed: 0,
        triples: 0,
        graph: None,
    };

    if let (Some(embedder), Some(index)) = (&pipeline.embedder, &pipeline.index) {
        report.indexed =
            index_chunks(embedder.as_ref(), index, &chunks, pipeline.batch_size).await?;
    }

    if !pipeline.skip_graph {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let triples = TripleExtractor::new(pipeline.llm.as_ref())
            .with_rate_limit(pipeline.rate_limit)
            .extract_all(&texts)
            .await;
        report.triples = triples.len();
        report.graph = Some(merge_triples(&pipeline.store, triples).await?);
    }

    Ok(report)
}

async fn index_chunks(
    embedder: &dyn Embedder,
    index: &Mutex<ChunkIndex>,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<usize> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_all(embedder, &texts, batch_size).await?;
    let records: Vec<IndexRecord> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexRecord::new(chunk, vector))
        .collect();
    let count = records.len();
    index.lock().await.upsert(records);
    Ok(count)
}

/// Merge `triples` into the persisted graph from async code.
pub async fn merge_triples(store: &GraphStore, triples: Vec<Triple>) -> Result<MergeReport> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.merge(&triples))
        .await
        .context("graph merge task panicked")?
}

/// Extract and annotate one file without touching the index or graph.
pub async fn chunk_file(
    config: &Config,
    path: &Path,
    doc_id: Option<String>,
) -> Result<Vec<Chunk>> {
    let owned = path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || extract_document(&owned))
        .await
        .context("extraction task panicked")?
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    let doc_id = doc_id.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    });
    let annotator = ChunkAnnotator::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
    Ok(annotator.annotate(&doc_id, &extracted.text, Some(&extracted.spans)))
}
