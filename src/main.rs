//! # docgraph CLI (`dg`)
//!
//! ## Usage
//!
//! ```bash
//! dg --config ./config/dg.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dg ingest <paths..>` | Chunk documents, index them, and grow the knowledge graph |
//! | `dg chunks <file>` | Print a file's annotated chunks as JSON |
//! | `dg merge <triples.json>` | Merge hand-written triples into the graph |
//! | `dg context "<query>"` | Print multi-hop graph context for a query |
//! | `dg search "<query>"` | Nearest chunks from the vector index |
//! | `dg stats` | Graph and index sizes |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docgraph::config::{self, Config};
use docgraph::embedding::create_embedder;
use docgraph::ingest::{chunk_file, ingest_paths, merge_triples, IngestOptions};
use docgraph::llm::OpenAiChatModel;
use docgraph::logger;
use docgraph::query::{graph_context, search_chunks, store_stats};
use docgraph::store::GraphStore;
use docgraph_core::models::Triple;
use serde::Deserialize;

/// docgraph: documents in, provenance-tagged chunks and a knowledge graph out.
#[derive(Parser)]
#[command(name = "dg", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dg.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files or directories.
    ///
    /// Each document is extracted, split into chunks, embedded into the
    /// vector index when a provider is configured, and mined for triples
    /// that are merged into the knowledge graph.
    Ingest {
        /// Files and/or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Skip triple extraction and graph merging.
        #[arg(long)]
        no_graph: bool,

        /// Document id to use instead of the file name (single file only).
        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Print the annotated chunks of one file as JSON.
    Chunks {
        file: PathBuf,

        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Merge triples from a JSON file into the graph.
    ///
    /// Accepts either a list of `{"subject","predicate","object"}` objects
    /// or `{"triples": [...]}`.
    Merge { file: PathBuf },

    /// Print graph context for a query.
    Context {
        query: String,

        /// Neighborhood depth around each matched entity.
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Search the vector index.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show graph and index statistics as JSON.
    Stats,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TriplesFile {
    List(Vec<Triple>),
    Wrapped { triples: Vec<Triple> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logger::init(&cfg.log.level)?;

    match cli.command {
        Commands::Ingest {
            paths,
            no_graph,
            doc_id,
        } => run_ingest(&cfg, &paths, no_graph, doc_id).await?,
        Commands::Chunks { file, doc_id } => {
            let chunks = chunk_file(&cfg, &file, doc_id).await?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        }
        Commands::Merge { file } => run_merge(&cfg, &file).await?,
        Commands::Context { query, depth } => {
            let llm = OpenAiChatModel::new(&cfg.llm)?;
            let context = graph_context(&cfg, &llm, &query, depth).await?;
            if context.is_empty() {
                eprintln!("No graph context for this query.");
            } else {
                println!("{}", context);
            }
        }
        Commands::Search { query, limit } => {
            let Some(embedder) = create_embedder(&cfg.embedding)? else {
                bail!("search requires an embedding provider (set [embedding].provider)");
            };
            let hits = search_chunks(&cfg, embedder.as_ref(), &query, limit).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                let m = &hit.metadata;
                println!(
                    "{}. [{:.3}] {} | page {} | para {} | {} | {}",
                    i + 1,
                    hit.distance,
                    m.doc_id,
                    m.page_label,
                    m.paragraph_index,
                    m.chapter_title,
                    m.content_type
                );
                println!("    {}", snippet(&hit.text, 160));
            }
        }
        Commands::Stats => {
            let stats = store_stats(&cfg)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

async fn run_ingest(
    cfg: &Config,
    paths: &[PathBuf],
    no_graph: bool,
    doc_id: Option<String>,
) -> Result<()> {
    let llm = Arc::new(OpenAiChatModel::new(&cfg.llm)?);
    let embedder = create_embedder(&cfg.embedding)?;
    let report = ingest_paths(
        cfg,
        paths,
        llm,
        embedder,
        IngestOptions {
            skip_graph: no_graph,
            doc_id,
        },
    )
    .await?;

    for doc in &report.documents {
        print!(
            "{}: {} chunks ({} code), {} pages, {} paragraphs",
            doc.doc_id, doc.chunks, doc.code_chunks, doc.pages, doc.paragraphs
        );
        if doc.indexed > 0 {
            print!(", {} indexed", doc.indexed);
        }
        if let Some(graph) = &doc.graph {
            print!(
                ", {} triples (+{} nodes, +{} edges)",
                doc.triples, graph.nodes_added, graph.edges_added
            );
        }
        println!();
    }
    for failed in &report.failed {
        println!("{}: FAILED: {}", failed.doc_id, failed.error);
    }
    println!(
        "Ingested {} document(s), {} chunk(s), {} triple(s).",
        report.documents.len(),
        report.total_chunks(),
        report.total_triples()
    );

    if !report.failed.is_empty() && report.documents.is_empty() {
        bail!("all {} document(s) failed", report.failed.len());
    }
    Ok(())
}

async fn run_merge(cfg: &Config, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let triples = match serde_json::from_str::<TriplesFile>(&json)
        .with_context(|| format!("Failed to parse triples from {}", file.display()))?
    {
        TriplesFile::List(t) | TriplesFile::Wrapped { triples: t } => t,
    };
    let report = merge_triples(&GraphStore::new(&cfg.graph.path), triples).await?;
    println!(
        "Merged {} of {} triple(s): +{} nodes, +{} edges, +{} relations ({} nodes, {} edges total).",
        report.triples_applied,
        report.triples_in,
        report.nodes_added,
        report.edges_added,
        report.relations_added,
        report.node_count,
        report.edge_count
    );
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}
