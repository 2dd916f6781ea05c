//! Modularity-based community detection
//!
//! A deterministic Louvain implementation: nodes are visited in index order,
//! candidate communities in ascending id order, and a node only moves when the
//! modularity gain is strictly better than staying. Running it twice over the
//! same graph always gives the same partition.

use crate::cluster::Partition;
use crate::graph::SimilarityGraph;
use std::collections::BTreeMap;

/// Gains smaller than this are treated as ties
const GAIN_EPSILON: f64 = 1e-12;

/// Upper bound on local-move sweeps per level
const MAX_SWEEPS: usize = 100;

/// One level of the Louvain hierarchy: a weighted simple graph with self loops
struct LevelGraph {
    /// Neighbors with summed weights, self loops excluded, sorted by index
    adjacency: Vec<Vec<(usize, f64)>>,

    /// Weight of internal edges folded into each node
    self_loops: Vec<f64>,

    /// Weighted degree; self loops count twice
    degrees: Vec<f64>,

    /// Total edge weight m
    total_weight: f64,
}

impl LevelGraph {
    fn new(adjacency: Vec<Vec<(usize, f64)>>, self_loops: Vec<f64>) -> Self {
        let degrees: Vec<f64> = adjacency
            .iter()
            .zip(&self_loops)
            .map(|(neighbors, &loop_weight)| {
                neighbors.iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * loop_weight
            })
            .collect();
        let total_weight = degrees.iter().sum::<f64>() / 2.0;

        Self {
            adjacency,
            self_loops,
            degrees,
            total_weight,
        }
    }

    fn from_similarity(graph: &SimilarityGraph) -> Self {
        let node_count = graph.node_count();
        Self::new(graph.collapsed_adjacency(), vec![0.0; node_count])
    }

    fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Local moving phase. Returns the community of every node and whether anything moved.
    fn local_moves(&self, resolution: f64) -> (Vec<usize>, bool) {
        let node_count = self.node_count();
        let mut community: Vec<usize> = (0..node_count).collect();

        if self.total_weight <= 0.0 {
            return (community, false);
        }

        let two_m = 2.0 * self.total_weight;
        let mut totals = self.degrees.clone();
        let mut moved_any = false;

        for sweep in 0..MAX_SWEEPS {
            let mut moved = false;

            for node in 0..node_count {
                let own = community[node];
                let k_i = self.degrees[node];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(neighbor, weight) in &self.adjacency[node] {
                    *links.entry(community[neighbor]).or_insert(0.0) += weight;
                }

                totals[own] -= k_i;

                let own_links = links.get(&own).copied().unwrap_or(0.0);
                let mut best = own;
                let mut best_gain = own_links - resolution * totals[own] * k_i / two_m;

                for (&candidate, &weight) in &links {
                    if candidate == own {
                        continue;
                    }
                    let gain = weight - resolution * totals[candidate] * k_i / two_m;
                    if gain > best_gain + GAIN_EPSILON {
                        best = candidate;
                        best_gain = gain;
                    }
                }

                totals[best] += k_i;
                if best != own {
                    community[node] = best;
                    moved = true;
                }
            }

            if !moved {
                log::debug!("Local moves settled after {} sweeps", sweep + 1);
                break;
            }
            moved_any = true;
        }

        (community, moved_any)
    }

    /// Collapse each community into a single node
    fn aggregate(&self, labels: &[usize], count: usize) -> Self {
        let mut merged: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        let mut self_loops = vec![0.0; count];

        for (node, neighbors) in self.adjacency.iter().enumerate() {
            let cu = labels[node];
            self_loops[cu] += self.self_loops[node];

            for &(neighbor, weight) in neighbors {
                if neighbor <= node {
                    continue;
                }
                let cv = labels[neighbor];
                if cu == cv {
                    self_loops[cu] += weight;
                } else {
                    *merged[cu].entry(cv).or_insert(0.0) += weight;
                    *merged[cv].entry(cu).or_insert(0.0) += weight;
                }
            }
        }

        let adjacency = merged.into_iter().map(|m| m.into_iter().collect()).collect();
        Self::new(adjacency, self_loops)
    }
}

/// Renumber labels to 0..count in order of first appearance
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
    let mut order = Vec::with_capacity(labels.len());
    for &label in labels {
        let next = mapping.len();
        order.push(*mapping.entry(label).or_insert(next));
    }
    (order, mapping.len())
}

/// Runs Louvain community detection over a similarity graph
#[derive(Debug, Clone)]
pub struct CommunityDetector {
    resolution: f64,
}

impl CommunityDetector {
    pub fn new(resolution: f64) -> Self {
        Self { resolution }
    }

    /// Assign every node to a community. Isolated nodes end up as singletons.
    pub fn detect(&self, graph: &SimilarityGraph) -> Partition {
        log::info!(
            "Detecting communities over {} nodes and {} edges (resolution {})",
            graph.node_count(),
            graph.edge_count(),
            self.resolution
        );

        let mut level = LevelGraph::from_similarity(graph);
        let mut membership: Vec<usize> = (0..graph.node_count()).collect();
        let mut levels = 0;

        loop {
            let (labels, moved) = level.local_moves(self.resolution);
            if !moved {
                break;
            }

            let (labels, count) = renumber(&labels);
            for slot in membership.iter_mut() {
                *slot = labels[*slot];
            }
            levels += 1;

            log::debug!("Level {}: {} -> {} nodes", levels, level.node_count(), count);

            if count == level.node_count() {
                break;
            }
            level = level.aggregate(&labels, count);
        }

        let (labels, _) = renumber(&membership);
        let partition = Partition::from_labels(labels);

        log::info!(
            "Found {} communities after {} levels (modularity {:.4})",
            partition.len(),
            levels,
            modularity(graph, &partition.labels, self.resolution)
        );

        partition
    }
}

/// Modularity of a labeling with the given resolution. Parallel edges add up.
pub fn modularity(graph: &SimilarityGraph, labels: &[usize], resolution: f64) -> f64 {
    let adjacency = graph.collapsed_adjacency();
    let two_m: f64 = adjacency.iter().flatten().map(|&(_, w)| w).sum();
    if two_m <= 0.0 {
        return 0.0;
    }

    let count = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut internal = vec![0.0; count];
    let mut totals = vec![0.0; count];

    for (node, neighbors) in adjacency.iter().enumerate() {
        let label = labels[node];
        for &(neighbor, weight) in neighbors {
            totals[label] += weight;
            if labels[neighbor] == label {
                internal[label] += weight;
            }
        }
    }

    internal
        .iter()
        .zip(&totals)
        .map(|(&inside, &total)| inside / two_m - resolution * (total / two_m).powi(2))
        .sum()
}
