//! # docgraph core
//!
//! IO-free logic for docgraph: data models, chunk annotation with
//! page/paragraph provenance, triple extraction over a pluggable
//! language model, the knowledge graph with its merge fold, and the
//! multi-hop graph retriever.
//!
//! This crate performs no filesystem or network I/O. Persistence,
//! locking, HTTP clients and configuration live in the `docgraph`
//! application crate.

pub mod chunk;
pub mod content;
pub mod embedding;
pub mod graph;
pub mod llm;
pub mod models;
pub mod retrieve;
pub mod split;
pub mod triples;
