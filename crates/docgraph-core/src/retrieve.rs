//! Multi-hop retrieval over the knowledge graph.
//!
//! [`GraphRetriever::relevant_context`] resolves the entities a query
//! mentions, connects pairs of them through short paths, expands their
//! neighborhoods, ranks the resulting subgraph with personalized
//! PageRank, and renders the most important relations as text:
//!
//! ```text
//! --- Multi-hop Connections ---
//! a --[leads_to]--> b --[causes]--> c
//!
//! --- Key Concepts & Relations ---
//! a --[leads_to]--> b
//! b --[causes]--> c
//! ```
//!
//! Retrieval is read-only: it works on a loaded snapshot and never
//! touches the persisted graph.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::graph::algo::{
    personalized_pagerank, shortest_path, within_hops, DEFAULT_ALPHA, DEFAULT_MAX_ITER,
    DEFAULT_TOLERANCE,
};
use crate::graph::KnowledgeGraph;
use crate::llm::{parse_json_object, CompletionRequest, LanguageModel};
use crate::models::normalize_entity;

pub const MULTI_HOP_HEADER: &str = "--- Multi-hop Connections ---";
pub const KEY_CONCEPTS_HEADER: &str = "\n--- Key Concepts & Relations ---";

/// Words of at most this many characters are ignored by the fallback
/// entity heuristic.
const FALLBACK_MIN_WORD_CHARS: usize = 3;

/// Tuning knobs for retrieval.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    /// Longest accepted connecting path, counted in nodes.
    pub max_path_nodes: usize,
    /// Number of ranked nodes whose relations are rendered.
    pub top_nodes: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            max_path_nodes: 4,
            top_nodes: 15,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntitiesPayload {
    #[serde(default)]
    entities: Vec<String>,
}

/// Query-time reader of a loaded knowledge graph.
pub struct GraphRetriever<'a> {
    graph: &'a KnowledgeGraph,
    model: &'a dyn LanguageModel,
    options: RetrievalOptions,
}

impl<'a> GraphRetriever<'a> {
    pub fn new(graph: &'a KnowledgeGraph, model: &'a dyn LanguageModel) -> Self {
        Self {
            graph,
            model,
            options: RetrievalOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.options = options;
        self
    }

    /// Render graph facts relevant to `query`, expanding `depth` hops
    /// around each matched entity. Empty when no entity is in the graph.
    pub async fn relevant_context(&self, query: &str, depth: usize) -> String {
        if self.graph.is_empty() {
            return String::new();
        }
        let entities = self.resolve_entities(query).await;
        self.context_for_entities(&entities, depth)
    }

    /// Ask the model for the query's entities, falling back to every
    /// word longer than three characters.
    pub async fn resolve_entities(&self, query: &str) -> Vec<String> {
        let request = CompletionRequest::json(entity_prompt(query));
        let from_model = match self.model.complete(&request).await {
            Ok(response) => match parse_json_object::<EntitiesPayload>(&response) {
                Ok(payload) => payload.entities,
                Err(e) => {
                    warn!(
                        model = self.model.name(),
                        error = %e,
                        "unparseable entity extraction output"
                    );
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(model = self.model.name(), error = %e, "entity extraction call failed");
                Vec::new()
            }
        };

        let entities = dedupe(from_model.iter().map(|e| normalize_entity(e)));
        if !entities.is_empty() {
            return entities;
        }
        debug!("falling back to keyword entities");
        fallback_entities(query)
    }

    /// Render the context block for already-resolved entities.
    pub fn context_for_entities(&self, entities: &[String], depth: usize) -> String {
        let found: Vec<NodeIndex> = dedupe(entities.iter().map(|e| normalize_entity(e)))
            .iter()
            .filter_map(|e| self.graph.node_index(e))
            .collect();
        if found.is_empty() {
            return String::new();
        }

        let mut lines: Vec<String> = Vec::new();
        let mut working: HashSet<NodeIndex> = found.iter().copied().collect();

        if found.len() > 1 {
            lines.push(MULTI_HOP_HEADER.to_string());
            for (i, &from) in found.iter().enumerate() {
                for &to in &found[i + 1..] {
                    let Some(path) = shortest_path(self.graph, from, to) else {
                        continue;
                    };
                    if path.len() > self.options.max_path_nodes {
                        continue;
                    }
                    lines.push(self.render_path(&path));
                    working.extend(path);
                }
            }
        }

        for &node in &found {
            working.extend(within_hops(self.graph, node, depth));
        }

        let subgraph = self.graph.induced_subgraph(&working);
        let top = self.rank(&subgraph, &found);

        lines.push(KEY_CONCEPTS_HEADER.to_string());
        let top_set: HashSet<NodeIndex> = top.into_iter().collect();
        let key = subgraph.induced_subgraph(&top_set);
        for (u, v, relations) in key.edges() {
            lines.push(format!("{u} --[{}]--> {v}", relations.join(", ")));
        }

        lines.join("\n")
    }

    fn render_path(&self, path: &[NodeIndex]) -> String {
        let mut out = self.graph.name(path[0]).to_string();
        for pair in path.windows(2) {
            let relations = match self.graph.relations_between(pair[0], pair[1]) {
                Some(r) if !r.is_empty() => r.join("|"),
                _ => "related".to_string(),
            };
            out.push_str(&format!(" --[{relations}]--> {}", self.graph.name(pair[1])));
        }
        out
    }

    /// Top nodes of `subgraph` by personalized PageRank seeded on the
    /// found entities; ties go to the lexically smaller name.
    fn rank(&self, subgraph: &KnowledgeGraph, found: &[NodeIndex]) -> Vec<NodeIndex> {
        let seeds: HashMap<NodeIndex, f64> = found
            .iter()
            .filter_map(|&n| subgraph.node_index(self.graph.name(n)))
            .map(|n| (n, 1.0))
            .collect();

        let mut nodes: Vec<NodeIndex> = (0..subgraph.node_count()).map(NodeIndex::new).collect();
        match personalized_pagerank(
            subgraph,
            &seeds,
            DEFAULT_ALPHA,
            DEFAULT_MAX_ITER,
            DEFAULT_TOLERANCE,
        ) {
            Ok(scores) => nodes.sort_by(|a, b| {
                scores[b.index()]
                    .partial_cmp(&scores[a.index()])
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| subgraph.name(*a).cmp(subgraph.name(*b)))
            }),
            Err(e) => {
                debug!(error = %e, "ranking failed, using unranked nodes");
                nodes.sort_by(|a, b| subgraph.name(*a).cmp(subgraph.name(*b)));
            }
        }
        nodes.truncate(self.options.top_nodes);
        nodes
    }
}

fn entity_prompt(query: &str) -> String {
    format!(
        r#"Extract the main entities (keywords) from this query.
Return a JSON object with a key "entities" containing a list of strings.

Query: {query}

JSON Format:
{{
    "entities": ["entity1", "entity2"]
}}"#
    )
}

/// Every query word longer than three characters, case-folded, with
/// surrounding punctuation removed.
pub fn fallback_entities(query: &str) -> Vec<String> {
    dedupe(
        query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.chars().count() > FALLBACK_MIN_WORD_CHARS),
    )
}

fn dedupe(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}
