//! Read-side commands: graph context, vector search, and store stats.
//!
//! Nothing here takes the graph lock. Each call loads the current
//! snapshot, so a merge that lands mid-query is simply not visible yet.

use anyhow::{bail, Result};
use docgraph_core::llm::LanguageModel;
use docgraph_core::retrieve::{GraphRetriever, RetrievalOptions};
use serde::Serialize;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::{ChunkIndex, SearchHit};
use crate::store::GraphStore;

/// Graph facts relevant to `query`, or `""` when none of its entities are
/// in the graph.
pub async fn graph_context(
    config: &Config,
    llm: &dyn LanguageModel,
    query: &str,
    depth: Option<usize>,
) -> Result<String> {
    let graph = GraphStore::new(&config.graph.path).load();
    let options = RetrievalOptions {
        max_path_nodes: config.retrieval.max_path_nodes,
        top_nodes: config.retrieval.top_nodes,
    };
    let depth = depth.unwrap_or(config.retrieval.depth);
    Ok(GraphRetriever::new(&graph, llm)
        .with_options(options)
        .relevant_context(query, depth)
        .await)
}

/// Nearest chunks to `query` in the vector index.
pub async fn search_chunks(
    config: &Config,
    embedder: &dyn Embedder,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let index = ChunkIndex::open(&config.index.path)?;
    if index.is_empty() {
        return Ok(Vec::new());
    }
    let mut vectors = embedder.embed(&[query.to_string()]).await?;
    let Some(vector) = vectors.pop() else {
        bail!("embedder returned no vector for the query");
    };
    Ok(index.query(&vector, limit.unwrap_or(config.retrieval.search_limit)))
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub graph_path: String,
    pub nodes: usize,
    pub edges: usize,
    pub relations: usize,
    pub index_path: String,
    pub indexed_chunks: usize,
    pub indexed_documents: usize,
}

pub fn store_stats(config: &Config) -> Result<StoreStats> {
    let graph = GraphStore::new(&config.graph.path).load();
    let index = ChunkIndex::open(&config.index.path)?;
    Ok(StoreStats {
        graph_path: config.graph.path.display().to_string(),
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        relations: graph.edges().map(|(_, _, r)| r.len()).sum(),
        index_path: config.index.path.display().to_string(),
        indexed_chunks: index.len(),
        indexed_documents: index.document_count(),
    })
}
