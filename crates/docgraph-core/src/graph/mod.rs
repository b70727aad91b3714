//! Append-only knowledge graph of entities and relation-labeled edges.
//!
//! Uses a `petgraph` undirected graph for structure and a name → index
//! map for O(1) node lookups. Each edge carries the insertion-ordered,
//! duplicate-free list of relation labels merged between its endpoints.
//!
//! Nodes and edges are never removed and relation lists only grow. The
//! graph is persisted as a versioned [`GraphSnapshot`]; reading and
//! writing the snapshot file is the app crate's job.

pub mod algo;

use std::collections::HashMap;

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::models::Triple;

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors raised when decoding a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid graph snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported graph snapshot version {found} (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion { found: u32 },
}

/// Counters describing what a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub triples_applied: usize,
    pub nodes_added: usize,
    pub edges_added: usize,
    pub relations_added: usize,
}

/// Undirected, edge-labeled entity graph.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    graph: UnGraph<String, Vec<String>>,
    index: HashMap<String, NodeIndex>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx]
    }

    /// Node names in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    /// Edges in insertion order as `(source, target, relations)`, with
    /// endpoints in the order they were first merged.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &[String])> {
        self.graph.edge_references().map(|e| {
            (
                self.graph[e.source()].as_str(),
                self.graph[e.target()].as_str(),
                e.weight().as_slice(),
            )
        })
    }

    /// Relation labels on the edge between `a` and `b`, in either direction.
    pub fn relations(&self, a: &str, b: &str) -> Option<&[String]> {
        let edge = self.find_edge(self.node_index(a)?, self.node_index(b)?)?;
        Some(self.graph[edge].as_slice())
    }

    pub(crate) fn relations_between(&self, a: NodeIndex, b: NodeIndex) -> Option<&[String]> {
        self.find_edge(a, b).map(|e| self.graph[e].as_slice())
    }

    pub(crate) fn inner(&self) -> &UnGraph<String, Vec<String>> {
        &self.graph
    }

    fn find_edge(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(a, b)
    }

    /// Ensure a node exists for `name`, returning its index and whether it
    /// was created.
    fn ensure_node(&mut self, name: &str) -> (NodeIndex, bool) {
        if let Some(idx) = self.index.get(name) {
            return (*idx, false);
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        (idx, true)
    }

    /// Fold one normalized triple into the graph.
    pub fn insert_triple(&mut self, triple: &Triple) -> MergeStats {
        let mut stats = MergeStats {
            triples_applied: 1,
            ..MergeStats::default()
        };
        let (subject, created) = self.ensure_node(&triple.subject);
        stats.nodes_added += created as usize;
        let (object, created) = self.ensure_node(&triple.object);
        stats.nodes_added += created as usize;

        match self.find_edge(subject, object) {
            Some(edge) => {
                let relations = &mut self.graph[edge];
                if !relations.iter().any(|r| r == &triple.predicate) {
                    relations.push(triple.predicate.clone());
                    stats.relations_added += 1;
                }
            }
            None => {
                self.graph
                    .add_edge(subject, object, vec![triple.predicate.clone()]);
                stats.edges_added += 1;
                stats.relations_added += 1;
            }
        }
        stats
    }

    /// Fold a batch of triples. Triples with an empty field after
    /// normalization are skipped.
    pub fn merge(&mut self, triples: &[Triple]) -> MergeStats {
        let mut total = MergeStats::default();
        for triple in triples {
            let Some(triple) = Triple::new(&triple.subject, &triple.predicate, &triple.object)
            else {
                continue;
            };
            let stats = self.insert_triple(&triple);
            total.triples_applied += stats.triples_applied;
            total.nodes_added += stats.nodes_added;
            total.edges_added += stats.edges_added;
            total.relations_added += stats.relations_added;
        }
        total
    }

    /// The subgraph induced by `keep`: those nodes (in this graph's node
    /// order) and every edge between two of them.
    pub fn induced_subgraph(&self, keep: &std::collections::HashSet<NodeIndex>) -> KnowledgeGraph {
        let mut sub = KnowledgeGraph::new();
        for idx in self.graph.node_indices().filter(|i| keep.contains(i)) {
            sub.ensure_node(&self.graph[idx]);
        }
        for edge in self.graph.edge_references() {
            if keep.contains(&edge.source()) && keep.contains(&edge.target()) {
                let a = sub.index[&self.graph[edge.source()]];
                let b = sub.index[&self.graph[edge.target()]];
                sub.graph.add_edge(a, b, edge.weight().clone());
            }
        }
        sub
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            version: SNAPSHOT_VERSION,
            nodes: self
                .nodes()
                .map(|id| NodeRecord { id: id.to_string() })
                .collect(),
            edges: self
                .edges()
                .map(|(source, target, relations)| EdgeRecord {
                    source: source.to_string(),
                    target: target.to_string(),
                    relations: relations.to_vec(),
                })
                .collect(),
        }
    }

    /// Rebuild a graph from a snapshot. Edge endpoints missing from the
    /// node list are created; repeated edges have their relations unioned.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
            });
        }
        let mut graph = KnowledgeGraph::new();
        for node in &snapshot.nodes {
            graph.ensure_node(&node.id);
        }
        for edge in &snapshot.edges {
            let (a, _) = graph.ensure_node(&edge.source);
            let (b, _) = graph.ensure_node(&edge.target);
            match graph.find_edge(a, b) {
                Some(existing) => {
                    let relations = &mut graph.graph[existing];
                    for r in &edge.relations {
                        if !relations.contains(r) {
                            relations.push(r.clone());
                        }
                    }
                }
                None => {
                    let mut relations: Vec<String> = Vec::with_capacity(edge.relations.len());
                    for r in &edge.relations {
                        if !relations.contains(r) {
                            relations.push(r.clone());
                        }
                    }
                    graph.graph.add_edge(a, b, relations);
                }
            }
        }
        Ok(graph)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: GraphSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    /// Pretty-printed snapshot JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_snapshot())
    }
}

/// On-disk representation of a [`KnowledgeGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub relations: Vec<String>,
}
