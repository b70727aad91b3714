//! # docgraph
//!
//! Turns documents into provenance-tagged chunks for a vector index and
//! grows a persisted knowledge graph of `(subject, predicate, object)`
//! triples mined from them by a language model. At query time the graph
//! supplies multi-hop facts that nearest-neighbor search alone misses.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Extract   │──▶│   Annotate   │──▶│ Chunk index  │
//! │ txt/docx/  │   │ chapters +   │   │ (embeddings) │
//! │    pdf     │   │ page/para    │   └──────────────┘
//! └────────────┘   └──────┬───────┘
//!                         ▼
//!                  ┌──────────────┐   ┌──────────────┐
//!                  │   Triples    │──▶│  GraphStore  │◀── dg context
//!                  │  (LLM, JSON) │   │ (lock+merge) │
//!                  └──────────────┘   └──────────────┘
//! ```
//!
//! Pure logic (chunking, triples, graph algorithms, retrieval) lives in
//! `docgraph-core`; this crate adds configuration, file and network IO,
//! locking, and the `dg` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logger`] | tracing subscriber setup |
//! | [`extract`] | Text + paragraph spans from txt/md, docx, pdf |
//! | [`scan`] | Directory walking with include/exclude globs |
//! | [`llm`] | OpenAI-compatible chat client |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | File-backed vector index of chunks |
//! | [`store`] | Lock-guarded knowledge graph snapshot |
//! | [`ingest`] | The ingestion pipeline |
//! | [`query`] | Graph context, vector search, stats |

pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logger;
pub mod query;
pub mod scan;
pub mod store;
