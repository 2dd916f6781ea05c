//! Weighted multi-relation similarity graph

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Kind of overlap an edge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Language,
    Specialization,
    Friend,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Language => "language",
            Relation::Specialization => "specialization",
            Relation::Friend => "friend",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a single edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimilarityEdge {
    pub relation: Relation,

    /// Intersection size for tag relations, declared-direction weight for friends
    pub weight: u32,
}

/// Unique key of an edge. `lo` is always the endpoint with the smaller id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct EdgeKey {
    lo: usize,
    hi: usize,
    relation: Relation,
}

/// Undirected multigraph over entity indices. At most one edge exists per
/// `(pair, relation)`, so a pair carries up to one parallel edge per relation.
#[derive(Debug, Clone)]
pub struct SimilarityGraph {
    graph: UnGraph<usize, SimilarityEdge>,

    /// Entity ids, indexed like the nodes
    node_ids: Vec<String>,

    keys: HashMap<EdgeKey, EdgeIndex>,

    /// Pairs joined by at least one edge, stored as (smaller index, larger index)
    connected: HashSet<(usize, usize)>,
}

impl SimilarityGraph {
    /// Create a graph with one node per id and no edges
    pub fn with_nodes(node_ids: Vec<String>) -> Self {
        let mut graph = UnGraph::with_capacity(node_ids.len(), 0);
        for idx in 0..node_ids.len() {
            graph.add_node(idx);
        }
        Self {
            graph,
            node_ids,
            keys: HashMap::new(),
            connected: HashSet::new(),
        }
    }

    /// Order a pair of node indices by id
    fn ordered(&self, a: usize, b: usize) -> (usize, usize) {
        if self.node_ids[a] <= self.node_ids[b] {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Insert an edge, or return the existing one for the same pair and relation
    pub fn add_edge(&mut self, a: usize, b: usize, edge: SimilarityEdge) -> EdgeIndex {
        let (lo, hi) = self.ordered(a, b);
        let key = EdgeKey { lo, hi, relation: edge.relation };
        if let Some(&existing) = self.keys.get(&key) {
            return existing;
        }

        let idx = self.graph.add_edge(NodeIndex::new(lo), NodeIndex::new(hi), edge);
        self.keys.insert(key, idx);
        self.connected.insert((lo.min(hi), lo.max(hi)));
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    /// Edge for a pair and relation, in either endpoint order
    pub fn edge(&self, a: usize, b: usize, relation: Relation) -> Option<&SimilarityEdge> {
        let (lo, hi) = self.ordered(a, b);
        self.keys
            .get(&EdgeKey { lo, hi, relation })
            .and_then(|&idx| self.graph.edge_weight(idx))
    }

    /// Whether any relation joins the two nodes
    pub fn are_connected(&self, a: usize, b: usize) -> bool {
        self.connected.contains(&(a.min(b), a.max(b)))
    }

    /// All edges as `(lo, hi, edge)` in insertion order
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, &SimilarityEdge)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), e.weight()))
    }

    /// Incident edges of a node as `(other endpoint, edge)`
    pub fn incident(&self, node: usize) -> impl Iterator<Item = (usize, &SimilarityEdge)> + '_ {
        self.graph.edges(NodeIndex::new(node)).map(move |e| {
            let other = if e.source().index() == node { e.target() } else { e.source() };
            (other.index(), e.weight())
        })
    }

    /// Edge counts per relation
    pub fn relation_counts(&self) -> HashMap<Relation, usize> {
        let mut counts = HashMap::new();
        for (_, _, edge) in self.edges() {
            *counts.entry(edge.relation).or_insert(0) += 1;
        }
        counts
    }

    /// Simple weighted adjacency with parallel edges summed, neighbors sorted by index
    pub fn collapsed_adjacency(&self) -> Vec<Vec<(usize, f64)>> {
        let mut merged: Vec<HashMap<usize, f64>> = vec![HashMap::new(); self.node_count()];
        for (a, b, edge) in self.edges() {
            let w = edge.weight as f64;
            *merged[a].entry(b).or_insert(0.0) += w;
            if a != b {
                *merged[b].entry(a).or_insert(0.0) += w;
            }
        }

        merged
            .into_iter()
            .map(|neighbors| {
                let mut list: Vec<(usize, f64)> = neighbors.into_iter().collect();
                list.sort_unstable_by_key(|&(n, _)| n);
                list
            })
            .collect()
    }
}
