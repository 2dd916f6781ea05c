//! Size-constrained rebalancing of detected communities
//!
//! Communities below the minimum size are merged with the pending community
//! they share the most similarity edges with; communities above the maximum
//! are cut into contiguous, evenly sized chunks. This is a single-pass
//! heuristic, not an optimal bin packing.

use crate::cluster::{Cluster, Community};
use crate::config::RebalanceConfig;
use crate::graph::SimilarityGraph;
use itertools::Itertools;
use serde::Serialize;

/// Last-in, first-out collection of pending groups.
///
/// Processing order is part of the contract: the most recently pushed group is
/// always handled next, and merged groups are pushed back on top. Iteration
/// (used for merge candidate search) runs from the oldest entry to the newest.
#[derive(Debug, Clone, Default)]
pub struct Worklist<T> {
    items: Vec<T>,
}

impl<T> Worklist<T> {
    /// Push every item in order, so the last one is popped first
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        Self { items: items.into_iter().collect() }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Remove the entry at `position` (as yielded by `iter`)
    pub fn remove(&mut self, position: usize) -> T {
        self.items.remove(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    Undersized,
    Oversized,
}

/// A final cluster that still falls outside the configured bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundsViolation {
    pub cluster_id: usize,
    pub size: usize,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebalanceStats {
    pub passes: usize,
    pub merges: usize,
    pub splits: usize,

    /// Final clusters kept undersized because no connected merge candidate existed
    pub undersized_exceptions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceOutcome {
    pub clusters: Vec<Cluster>,

    /// Every final cluster outside the bounds, whatever the cause
    pub violations: Vec<BoundsViolation>,

    /// Ids of undersized clusters that had no connected pending group when finalized
    pub exceptions: Vec<usize>,

    pub stats: RebalanceStats,
}

impl RebalanceOutcome {
    /// Whether a cluster was accepted outside the bounds
    pub fn is_flagged(&self, cluster_id: usize) -> bool {
        self.violations.iter().any(|v| v.cluster_id == cluster_id)
    }

    /// Whether a cluster was kept undersized for lack of a connected merge candidate
    pub fn is_exception(&self, cluster_id: usize) -> bool {
        self.exceptions.contains(&cluster_id)
    }
}

/// Groups finalized by one pass, in finalization order
struct PassResult {
    groups: Vec<Vec<usize>>,

    /// Positions in `groups` finalized without a connected merge candidate
    exceptions: Vec<usize>,
}

/// Enforces `[min_cluster_size, max_cluster_size]` on a set of communities
pub struct ClusterRebalancer<'a> {
    config: &'a RebalanceConfig,
    graph: &'a SimilarityGraph,
}

impl<'a> ClusterRebalancer<'a> {
    pub fn new(config: &'a RebalanceConfig, graph: &'a SimilarityGraph) -> Self {
        Self { config, graph }
    }

    fn violation_kind(&self, size: usize) -> Option<ViolationKind> {
        if size < self.config.min_cluster_size {
            Some(ViolationKind::Undersized)
        } else if size > self.config.max_cluster_size {
            Some(ViolationKind::Oversized)
        } else {
            None
        }
    }

    /// Rebalance communities into clusters.
    ///
    /// Extra passes over the finalized set run while violations remain, retry
    /// depth is left, and the previous pass strictly reduced the violation count.
    pub fn rebalance(&self, communities: &[Community]) -> RebalanceOutcome {
        log::info!(
            "Rebalancing {} communities into clusters of {}..={} members",
            communities.len(),
            self.config.min_cluster_size,
            self.config.max_cluster_size
        );

        let groups: Vec<Vec<usize>> = communities.iter().map(|c| c.members.clone()).collect();
        let mut stats = RebalanceStats::default();
        let mut retries_left = self.config.max_depth;
        let mut previous_violations: Option<usize> = None;
        let mut pass = self.single_pass(groups, &mut stats);

        loop {
            stats.passes += 1;

            let violating = pass
                .groups
                .iter()
                .filter(|g| self.violation_kind(g.len()).is_some())
                .count();
            if violating == 0 {
                break;
            }

            log::info!("Pass {} left {} clusters outside bounds", stats.passes, violating);

            let stalled = previous_violations.is_some_and(|p| violating >= p);
            if retries_left == 0 || stalled {
                break;
            }
            previous_violations = Some(violating);
            retries_left -= 1;
            pass = self.single_pass(pass.groups, &mut stats);
        }

        stats.undersized_exceptions = pass.exceptions.len();
        let exceptions = pass.exceptions;
        let clusters: Vec<Cluster> = pass
            .groups
            .into_iter()
            .enumerate()
            .map(|(id, members)| Cluster { id, members })
            .collect();

        let violations: Vec<BoundsViolation> = clusters
            .iter()
            .filter_map(|c| {
                self.violation_kind(c.size()).map(|kind| BoundsViolation {
                    cluster_id: c.id,
                    size: c.size(),
                    kind,
                })
            })
            .collect();

        if !violations.is_empty() {
            let undersized = violations.iter().filter(|v| v.kind == ViolationKind::Undersized).count();
            log::warn!(
                "Constraint violation: {} of {} clusters outside {}..={} after {} passes ({} undersized, {} oversized)",
                violations.len(),
                clusters.len(),
                self.config.min_cluster_size,
                self.config.max_cluster_size,
                stats.passes,
                undersized,
                violations.len() - undersized
            );
        }

        log::info!(
            "Rebalanced into {} clusters ({} merges, {} splits)",
            clusters.len(),
            stats.merges,
            stats.splits
        );

        RebalanceOutcome {
            clusters,
            violations,
            exceptions,
            stats,
        }
    }

    fn single_pass(&self, groups: Vec<Vec<usize>>, stats: &mut RebalanceStats) -> PassResult {
        let mut worklist = Worklist::from_items(groups);
        let mut finalized = Vec::with_capacity(worklist.len());
        let mut exceptions = Vec::new();

        while let Some(group) = worklist.pop() {
            if group.len() < self.config.min_cluster_size {
                match self.find_merge_candidate(&group, &worklist) {
                    Some(position) => {
                        let candidate = worklist.remove(position);
                        let mut merged = group;
                        merged.extend(candidate);
                        stats.merges += 1;
                        worklist.push(merged);
                    }
                    None => {
                        log::debug!("No connected merge candidate for group of {}", group.len());
                        exceptions.push(finalized.len());
                        finalized.push(group);
                    }
                }
            } else if group.len() > self.config.max_cluster_size {
                stats.splits += 1;
                finalized.extend(split_evenly(&group, self.config.max_cluster_size));
            } else {
                finalized.push(group);
            }
        }

        PassResult {
            groups: finalized,
            exceptions,
        }
    }

    /// Pending entry with the most connecting pairs; the first one wins ties
    fn find_merge_candidate(&self, group: &[usize], worklist: &Worklist<Vec<usize>>) -> Option<usize> {
        let mut best = None;
        let mut best_pairs = 0;

        for (position, candidate) in worklist.iter().enumerate() {
            let pairs = self.connecting_pairs(group, candidate);
            if pairs > best_pairs {
                best = Some(position);
                best_pairs = pairs;
            }
        }

        best
    }

    /// Member pairs across the two groups joined by at least one similarity edge
    pub fn connecting_pairs(&self, a: &[usize], b: &[usize]) -> usize {
        a.iter()
            .cartesian_product(b.iter())
            .filter(|&(&x, &y)| self.graph.are_connected(x, y))
            .count()
    }
}

/// Cut `members` into `ceil(n / max)` contiguous chunks of `ceil(n / chunks)` members
pub fn split_evenly(members: &[usize], max_cluster_size: usize) -> Vec<Vec<usize>> {
    if members.is_empty() {
        return Vec::new();
    }
    let chunk_count = members.len().div_ceil(max_cluster_size);
    let chunk_size = members.len().div_ceil(chunk_count);
    members.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Relation, SimilarityEdge};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn graph(node_count: usize, edges: &[(usize, usize)]) -> SimilarityGraph {
        let ids = (0..node_count).map(|i| format!("e{:04}", i)).collect();
        let mut graph = SimilarityGraph::with_nodes(ids);
        for &(a, b) in edges {
            if a != b {
                graph.add_edge(a, b, SimilarityEdge { relation: Relation::Language, weight: 1 });
            }
        }
        graph
    }

    fn communities(sizes: &[usize]) -> Vec<Community> {
        let mut next = 0;
        sizes
            .iter()
            .enumerate()
            .map(|(id, &size)| {
                let members = (next..next + size).collect();
                next += size;
                Community { id, members }
            })
            .collect()
    }

    fn bounds(min: usize, max: usize) -> RebalanceConfig {
        RebalanceConfig { min_cluster_size: min, max_cluster_size: max, max_depth: 20 }
    }

    fn single_pass_bounds(min: usize, max: usize) -> RebalanceConfig {
        RebalanceConfig { max_depth: 0, ..bounds(min, max) }
    }

    fn as_sets(clusters: &[Cluster]) -> BTreeSet<BTreeSet<usize>> {
        clusters.iter().map(|c| c.members.iter().copied().collect()).collect()
    }

    #[test]
    fn worklist_is_last_in_first_out() {
        let mut worklist = Worklist::from_items(vec![1, 2, 3]);
        worklist.push(4);
        assert_eq!(worklist.pop(), Some(4));
        assert_eq!(worklist.pop(), Some(3));
        assert_eq!(worklist.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(worklist.remove(0), 1);
        assert_eq!(worklist.len(), 1);
    }

    #[test]
    fn split_fifty_two_by_twenty_five() {
        let members: Vec<usize> = (0..52).collect();
        let chunks = split_evenly(&members, 25);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![18, 18, 16]);
        assert_eq!(chunks[0][0], 0);
        assert_eq!(chunks[2][15], 51);
    }

    #[test]
    fn oversized_community_is_split() {
        let g = graph(52, &[]);
        let config = bounds(0, 25);
        let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&[52]));

        assert_eq!(outcome.clusters.len(), 3);
        assert!(outcome.clusters.iter().all(|c| c.size() <= 25));
        assert!(outcome.violations.is_empty());
        assert_eq!(outcome.stats.splits, 1);
    }

    #[test]
    fn within_bounds_is_untouched() {
        let g = graph(3, &[(0, 1), (0, 2)]);
        let config = bounds(0, 10);
        let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&[3]));

        assert_eq!(outcome.clusters, vec![Cluster { id: 0, members: vec![0, 1, 2] }]);
        assert_eq!(outcome.stats.passes, 1);
        assert_eq!(outcome.stats.merges, 0);
    }

    #[test]
    fn undersized_merges_with_most_connected_candidate() {
        // Groups: [0,1] [2,3] [4]; node 4 links to 0 and 1 but only to 2
        let g = graph(5, &[(4, 0), (4, 1), (4, 2)]);
        let config = single_pass_bounds(3, 5);
        let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&[2, 2, 1]));

        assert_eq!(outcome.stats.merges, 1);
        assert_eq!(
            outcome.clusters,
            vec![
                Cluster { id: 0, members: vec![4, 0, 1] },
                Cluster { id: 1, members: vec![2, 3] },
            ]
        );
        // [2,3] is popped last, with nothing left to merge into
        assert_eq!(
            outcome.violations,
            vec![BoundsViolation { cluster_id: 1, size: 2, kind: ViolationKind::Undersized }]
        );
        assert_eq!(outcome.stats.undersized_exceptions, 1);
        assert_eq!(outcome.exceptions, vec![1]);
        assert!(outcome.is_flagged(1));
        assert!(!outcome.is_flagged(0));
    }

    #[test]
    fn retry_pass_merges_groups_finalized_too_early() {
        let g = graph(5, &[(4, 0), (4, 1), (4, 2)]);
        let config = bounds(3, 5);
        let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&[2, 2, 1]));

        assert!(outcome.violations.is_empty());
        assert_eq!(outcome.stats.passes, 2);
        assert_eq!(outcome.clusters, vec![Cluster { id: 0, members: vec![2, 3, 4, 0, 1] }]);
    }

    #[test]
    fn merged_order_puts_popped_group_first() {
        let g = graph(4, &[(3, 0)]);
        let config = bounds(4, 10);
        let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&[3, 1]));
        assert_eq!(outcome.clusters[0].members, vec![3, 0, 1, 2]);
    }

    #[test]
    fn ties_go_to_the_oldest_candidate() {
        let g = graph(3, &[(2, 0), (2, 1)]);
        let config = single_pass_bounds(2, 2);
        let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&[1, 1, 1]));
        assert!(outcome.clusters.iter().any(|c| c.members == vec![2, 0]));
    }

    #[test]
    fn isolated_undersized_groups_are_exceptions() {
        let g = graph(4, &[]);
        let config = bounds(3, 5);
        let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&[2, 2]));

        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.violations.len(), 2);
        assert!(outcome.is_flagged(0) && outcome.is_flagged(1));
        assert!(outcome.is_exception(0) && outcome.is_exception(1));
        assert_eq!(outcome.stats.undersized_exceptions, 2);
        // Second pass makes no progress, so retries stop there
        assert_eq!(outcome.stats.passes, 2);
    }

    #[test]
    fn undersized_split_chunks_are_not_exceptions() {
        let edges: Vec<(usize, usize)> = (0..26).flat_map(|a| ((a + 1)..26).map(move |b| (a, b))).collect();
        let g = graph(26, &edges);
        let config = bounds(20, 25);
        let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&[26]));

        // 26 splits into 13 + 13; merging them back only recreates the 26
        let sizes: Vec<usize> = outcome.clusters.iter().map(Cluster::size).collect();
        assert_eq!(sizes, vec![13, 13]);
        assert_eq!(outcome.violations.len(), 2);
        assert!(outcome.is_flagged(0) && outcome.is_flagged(1));
        assert!(outcome.exceptions.is_empty());
        assert_eq!(outcome.stats.undersized_exceptions, 0);
        assert_eq!(outcome.stats.merges, 1);
        assert_eq!(outcome.stats.splits, 2);
        assert_eq!(outcome.stats.passes, 2);
    }

    /// Nothing finalized after an exception may connect to it
    fn exceptions_have_no_connected_successor(g: &SimilarityGraph, outcome: &RebalanceOutcome) -> bool {
        outcome.exceptions.iter().all(|&id| {
            let members = &outcome.clusters[id].members;
            outcome.clusters[id + 1..].iter().all(|later| {
                members
                    .iter()
                    .all(|&a| later.members.iter().all(|&b| !g.are_connected(a, b)))
            })
        })
    }

    #[test]
    fn exception_check_catches_connected_leftovers() {
        let g = graph(4, &[(0, 2)]);
        let outcome = RebalanceOutcome {
            clusters: vec![
                Cluster { id: 0, members: vec![0, 1] },
                Cluster { id: 1, members: vec![2, 3] },
            ],
            violations: Vec::new(),
            exceptions: vec![0],
            stats: RebalanceStats::default(),
        };
        assert!(!exceptions_have_no_connected_successor(&g, &outcome));
    }

    proptest! {
        #[test]
        fn rebalanced_clusters_respect_bounds(
            sizes in prop::collection::vec(1usize..60, 1..8),
            raw_edges in prop::collection::vec((0usize..400, 0usize..400), 0..200),
            min in 0usize..25,
            extra in 0usize..10,
        ) {
            let max = (min + extra).max(1);
            let node_count: usize = sizes.iter().sum();
            let edges: Vec<(usize, usize)> = raw_edges
                .into_iter()
                .map(|(a, b)| (a % node_count, b % node_count))
                .collect();
            let g = graph(node_count, &edges);
            let config = bounds(min, max);
            let outcome = ClusterRebalancer::new(&config, &g).rebalance(&communities(&sizes));

            // Exhaustive and disjoint
            let mut all: Vec<usize> = outcome.clusters.iter().flat_map(|c| c.members.clone()).collect();
            all.sort_unstable();
            prop_assert_eq!(all, (0..node_count).collect::<Vec<_>>());

            for cluster in &outcome.clusters {
                prop_assert!(cluster.size() <= max);
                if !outcome.is_flagged(cluster.id) {
                    prop_assert!(cluster.size() >= min);
                }
                if outcome.is_exception(cluster.id) {
                    prop_assert!(cluster.size() < min);
                }
            }
            prop_assert_eq!(outcome.stats.undersized_exceptions, outcome.exceptions.len());
            prop_assert!(exceptions_have_no_connected_successor(&g, &outcome));
        }

        #[test]
        fn rebalancing_a_valid_partition_is_idempotent(
            raw_sizes in prop::collection::vec(0usize..100, 1..8),
            raw_edges in prop::collection::vec((0usize..400, 0usize..400), 0..100),
            min in 1usize..10,
            extra in 0usize..10,
        ) {
            let max = min + extra;
            let sizes: Vec<usize> = raw_sizes.iter().map(|s| min + s % (extra + 1)).collect();
            let node_count: usize = sizes.iter().sum();
            let edges: Vec<(usize, usize)> = raw_edges
                .into_iter()
                .map(|(a, b)| (a % node_count, b % node_count))
                .collect();
            let g = graph(node_count, &edges);
            let config = bounds(min, max);

            let input = communities(&sizes);
            let outcome = ClusterRebalancer::new(&config, &g).rebalance(&input);

            let expected: BTreeSet<BTreeSet<usize>> = input
                .iter()
                .map(|c| c.members.iter().copied().collect())
                .collect();
            prop_assert_eq!(as_sets(&outcome.clusters), expected);
            prop_assert_eq!(outcome.stats.merges, 0);
            prop_assert_eq!(outcome.stats.splits, 0);
            prop_assert!(outcome.violations.is_empty());
        }
    }
}
