//! Similarity graph construction

use crate::config::GraphConfig;
use crate::data::entity::{intersection_size, AttributeGroup};
use crate::data::EntityStore;
use crate::graph::similarity::{Relation, SimilarityEdge, SimilarityGraph};
use rayon::prelude::*;

/// Builds a `SimilarityGraph` from pairwise attribute overlap.
///
/// Every unordered pair is compared once per enabled relation, so construction
/// is O(n² · k) for n entities with k tags on average. That is fine for
/// cohorts of a few thousand entities; beyond that the pair scan dominates.
pub struct GraphBuilder<'a> {
    config: &'a GraphConfig,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a GraphConfig) -> Self {
        Self { config }
    }

    fn tag_relations(&self) -> Vec<(Relation, AttributeGroup)> {
        let mut relations = Vec::with_capacity(2);
        if self.config.language_edges {
            relations.push((Relation::Language, AttributeGroup::Languages));
        }
        if self.config.specialization_edges {
            relations.push((Relation::Specialization, AttributeGroup::Specializations));
        }
        relations
    }

    /// Build the graph over every entity in the store
    pub fn build(&self, store: &EntityStore) -> SimilarityGraph {
        let node_count = store.len();
        log::info!("Building similarity graph over {} entities", node_count);

        let relations = self.tag_relations();
        let friend_weight = self.config.friend_edges.then_some(self.config.friend_weight);

        // Shard the outer loop; each shard yields its edges in (j, relation) order
        let per_node: Vec<Vec<(usize, usize, SimilarityEdge)>> = (0..node_count)
            .into_par_iter()
            .map(|a| {
                let mut local = Vec::new();
                let sets_a = store.tag_sets(a);

                for b in (a + 1)..node_count {
                    let sets_b = store.tag_sets(b);

                    for &(relation, group) in &relations {
                        let shared = intersection_size(sets_a.get(group), sets_b.get(group));
                        if shared > 0 {
                            local.push((a, b, SimilarityEdge { relation, weight: shared as u32 }));
                        }
                    }

                    if let Some(weight) = friend_weight {
                        let directions = store.friends_of(a).contains(&b) as u32
                            + store.friends_of(b).contains(&a) as u32;
                        if directions > 0 {
                            local.push((
                                a,
                                b,
                                SimilarityEdge { relation: Relation::Friend, weight: weight.saturating_mul(directions) },
                            ));
                        }
                    }
                }

                local
            })
            .collect();

        let node_ids = store.entities().iter().map(|e| e.id.clone()).collect();
        let mut graph = SimilarityGraph::with_nodes(node_ids);
        for (a, b, edge) in per_node.into_iter().flatten() {
            graph.add_edge(a, b, edge);
        }

        let counts = graph.relation_counts();
        log::info!(
            "Built similarity graph with {} nodes and {} edges (language: {}, specialization: {}, friend: {})",
            graph.node_count(),
            graph.edge_count(),
            counts.get(&Relation::Language).copied().unwrap_or(0),
            counts.get(&Relation::Specialization).copied().unwrap_or(0),
            counts.get(&Relation::Friend).copied().unwrap_or(0),
        );

        graph
    }
}
