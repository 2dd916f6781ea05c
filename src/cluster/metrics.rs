//! Cluster statistics and metrics

use crate::graph::SimilarityGraph;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// How many central members are reported per cluster
const CENTRAL_MEMBER_COUNT: usize = 5;

/// Structural statistics of one cluster inside the similarity graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMetrics {
    /// Connected member pairs / possible member pairs
    pub density: f32,

    /// Members with the highest intra-cluster weighted degree, best first
    pub central_members: Vec<usize>,

    /// Sum of edge weights with both endpoints inside the cluster
    pub internal_weight: u64,
}

/// Calculate metrics for a cluster's members
pub fn calculate_cluster_metrics(graph: &SimilarityGraph, members: &[usize]) -> ClusterMetrics {
    let member_set: HashSet<usize> = members.iter().copied().collect();

    let mut degrees: HashMap<usize, u64> = HashMap::with_capacity(members.len());
    let mut connected_pairs: HashSet<(usize, usize)> = HashSet::new();
    let mut internal_weight = 0;

    for &node in members {
        let mut degree = 0;
        for (other, edge) in graph.incident(node) {
            if !member_set.contains(&other) {
                continue;
            }
            degree += edge.weight as u64;
            if node < other {
                internal_weight += edge.weight as u64;
                connected_pairs.insert((node, other));
            }
        }
        degrees.insert(node, degree);
    }

    ClusterMetrics {
        density: pair_density(connected_pairs.len(), members.len()),
        central_members: top_by_degree(members, &degrees),
        internal_weight,
    }
}

/// Density of an undirected cluster with `n` members and `pairs` connected pairs
pub fn pair_density(pairs: usize, n: usize) -> f32 {
    if n <= 1 {
        return 1.0; // By convention, singleton clusters have density 1
    }
    let potential = n * (n - 1) / 2;
    pairs as f32 / potential as f32
}

fn top_by_degree(members: &[usize], degrees: &HashMap<usize, u64>) -> Vec<usize> {
    let mut ranked: Vec<(usize, u64)> = members
        .iter()
        .map(|&m| (m, degrees.get(&m).copied().unwrap_or(0)))
        .collect();

    // Highest degree first, member order breaks ties
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ranked
        .into_iter()
        .take(CENTRAL_MEMBER_COUNT)
        .map(|(member, _)| member)
        .collect()
}
