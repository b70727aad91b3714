//! End-to-end pipeline tests with an in-process language model.
//!
//! The scripted model reads the text after `Text:` in an extraction prompt
//! and turns every line of the form `Subject verb Object.` into a triple.
//! Entity prompts get a fixed entity list.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use docgraph::config::Config;
use docgraph::ingest::{ingest_paths, IngestOptions};
use docgraph::query::graph_context;
use docgraph::store::GraphStore;
use docgraph_core::llm::{CompletionRequest, LanguageModel};
use docgraph_core::models::ContentType;

struct SentenceModel {
    entities: Vec<&'static str>,
    extraction_calls: AtomicUsize,
}

impl SentenceModel {
    fn new(entities: &[&'static str]) -> Self {
        Self {
            entities: entities.to_vec(),
            extraction_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LanguageModel for SentenceModel {
    fn name(&self) -> &str {
        "sentences"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let prompt = &request.messages[0].content;
        if let Some(rest) = prompt.split("Text:\n").nth(1) {
            self.extraction_calls.fetch_add(1, Ordering::SeqCst);
            let body = rest.split("\n\nJSON Format:").next().unwrap_or("");
            let triples: Vec<serde_json::Value> = body
                .split_inclusive('.')
                .filter(|segment| segment.ends_with('.'))
                .filter_map(|segment| {
                    let sentence = segment.lines().last()?.trim_end_matches('.');
                    let words: Vec<&str> = sentence.split_whitespace().collect();
                    match words.as_slice() {
                        [s, p, o] => Some(serde_json::json!({
                            "subject": s, "predicate": p, "object": o
                        })),
                        _ => None,
                    }
                })
                .collect();
            return Ok(serde_json::json!({ "triples": triples }).to_string());
        }
        Ok(serde_json::json!({ "entities": self.entities }).to_string())
    }
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.graph.path = root.join("data").join("graph.json");
    config.index.path = root.join("data").join("index.json");
    config.llm.rate_limit_ms = 0;
    config
}

#[tokio::test]
async fn two_chapter_document_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let book = tmp.path().join("book.txt");
    std::fs::write(
        &book,
        "Chapter 1 Intro\n\nAlice founded Acme.\n\nChapter 2 Details\n\nAcme makes widgets.",
    )
    .unwrap();

    let mut config = test_config(tmp.path());
    config.chunking.chunk_size = 45;
    config.chunking.chunk_overlap = 0;

    let chunks = docgraph::ingest::chunk_file(&config, &book, None).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chapter_title, "Chapter 1 Intro");
    assert_eq!(chunks[1].chapter_title, "Chapter 2 Details");
    assert!(chunks.iter().all(|c| c.content_type == ContentType::Text));
    assert_eq!(chunks[1].paragraph_index, 2);

    let model = Arc::new(SentenceModel::new(&["alice", "acme"]));
    let report = ingest_paths(&config, &[book], model.clone(), None, IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(report.documents[0].chunks, 2);
    assert_eq!(report.documents[0].triples, 2);
    assert_eq!(model.extraction_calls.load(Ordering::SeqCst), 2);

    let context = graph_context(&config, model.as_ref(), "What did Alice found?", None)
        .await
        .unwrap();
    assert_eq!(
        context,
        "--- Multi-hop Connections ---\n\
         alice --[founded]--> acme\n\
         \n--- Key Concepts & Relations ---\n\
         alice --[founded]--> acme\n\
         acme --[makes]--> widgets"
    );
}

#[tokio::test]
async fn concurrent_documents_all_reach_the_graph() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    for i in 0..6 {
        std::fs::write(
            docs.join(format!("doc{i}.txt")),
            format!("Node{i} links Hub.\n\nNode{i} owns Item{i}."),
        )
        .unwrap();
    }

    let config = test_config(tmp.path());
    let model = Arc::new(SentenceModel::new(&[]));
    let report = ingest_paths(&config, &[docs], model, None, IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(report.documents.len(), 6);
    assert!(report.failed.is_empty());

    let graph = GraphStore::new(&config.graph.path).load();
    assert_eq!(graph.node_count(), 13);
    assert_eq!(graph.edge_count(), 12);
    for i in 0..6 {
        assert_eq!(
            graph.relations(&format!("node{i}"), "hub").unwrap(),
            &["links".to_string()]
        );
        assert!(graph.contains(&format!("item{i}")));
    }
}

#[tokio::test]
async fn reingesting_does_not_duplicate_relations() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("facts.md");
    std::fs::write(&file, "Rust prevents races.\n\nCargo builds Rust.").unwrap();

    let config = test_config(tmp.path());
    let model = Arc::new(SentenceModel::new(&[]));
    for _ in 0..2 {
        ingest_paths(&config, &[file.clone()], model.clone(), None, IngestOptions::default())
            .await
            .unwrap();
    }

    let graph = GraphStore::new(&config.graph.path).load();
    assert_eq!(graph.relations("rust", "races").unwrap().len(), 1);
    assert_eq!(graph.relations("cargo", "rust").unwrap(), &["builds".to_string()]);
}

#[tokio::test]
async fn unknown_entities_give_empty_context() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("facts.txt");
    std::fs::write(&file, "Alice founded Acme.").unwrap();

    let config = test_config(tmp.path());
    let model = Arc::new(SentenceModel::new(&["zeppelin"]));
    ingest_paths(&config, &[file], model.clone(), None, IngestOptions::default())
        .await
        .unwrap();

    let context = graph_context(&config, model.as_ref(), "Tell me about zeppelins", None)
        .await
        .unwrap();
    assert_eq!(context, "");
}
