//! Graph algorithms used by retrieval: hop-count shortest paths, bounded
//! breadth-first neighborhoods, and personalized PageRank.

use std::collections::{HashMap, HashSet};

use petgraph::algo::astar;
use petgraph::graph::NodeIndex;

use super::KnowledgeGraph;

/// Damping factor for PageRank.
pub const DEFAULT_ALPHA: f64 = 0.85;
pub const DEFAULT_MAX_ITER: usize = 100;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RankError {
    #[error("cannot rank an empty graph")]
    EmptyGraph,
    #[error("power iteration failed to converge within {0} iterations")]
    NoConvergence(usize),
}

/// Shortest path by hop count from `from` to `to`, inclusive of both ends.
/// Returns `None` when the nodes are disconnected.
pub fn shortest_path(
    kg: &KnowledgeGraph,
    from: NodeIndex,
    to: NodeIndex,
) -> Option<Vec<NodeIndex>> {
    if from == to {
        return Some(vec![from]);
    }
    astar(kg.inner(), from, |n| n == to, |_| 1usize, |_| 0usize).map(|(_, path)| path)
}

/// Every node within `depth` hops of `start`, including `start`.
pub fn within_hops(kg: &KnowledgeGraph, start: NodeIndex, depth: usize) -> Vec<NodeIndex> {
    let graph = kg.inner();
    let mut seen: HashSet<NodeIndex> = HashSet::from([start]);
    let mut order = vec![start];
    let mut frontier = vec![start];

    for _ in 0..depth {
        let mut next_frontier = Vec::new();
        for node in frontier {
            for next in graph.neighbors(node) {
                if seen.insert(next) {
                    order.push(next);
                    next_frontier.push(next);
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }
    order
}

/// Personalized PageRank over the undirected graph, each edge walked in
/// both directions with unit weight.
///
/// `personalization` biases teleports (and dangling-node mass) toward the
/// given nodes; weights are normalized. An empty map or one summing to
/// zero means uniform teleports. Returns one score per node, indexed by
/// `NodeIndex::index()`, summing to 1.
pub fn personalized_pagerank(
    kg: &KnowledgeGraph,
    personalization: &HashMap<NodeIndex, f64>,
    alpha: f64,
    max_iter: usize,
    tolerance: f64,
) -> Result<Vec<f64>, RankError> {
    let graph = kg.inner();
    let n = graph.node_count();
    if n == 0 {
        return Err(RankError::EmptyGraph);
    }

    let total_bias: f64 = personalization.values().filter(|w| **w > 0.0).sum();
    let teleport: Vec<f64> = if total_bias > 0.0 {
        graph
            .node_indices()
            .map(|i| personalization.get(&i).copied().unwrap_or(0.0).max(0.0) / total_bias)
            .collect()
    } else {
        vec![1.0 / n as f64; n]
    };

    let out_degree: Vec<usize> = graph
        .node_indices()
        .map(|i| graph.neighbors(i).count())
        .collect();

    let mut scores = vec![1.0 / n as f64; n];
    for _ in 0..max_iter {
        let previous = scores;
        scores = vec![0.0; n];

        let dangling: f64 = graph
            .node_indices()
            .filter(|i| out_degree[i.index()] == 0)
            .map(|i| previous[i.index()])
            .sum::<f64>()
            * alpha;

        for node in graph.node_indices() {
            let deg = out_degree[node.index()];
            if deg == 0 {
                continue;
            }
            let share = alpha * previous[node.index()] / deg as f64;
            for next in graph.neighbors(node) {
                scores[next.index()] += share;
            }
        }
        for (i, score) in scores.iter_mut().enumerate() {
            *score += dangling * teleport[i] + (1.0 - alpha) * teleport[i];
        }

        let err: f64 = scores
            .iter()
            .zip(previous.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        if err < n as f64 * tolerance {
            return Ok(scores);
        }
    }
    Err(RankError::NoConvergence(max_iter))
}
