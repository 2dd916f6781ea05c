//! Similarity graph representation and construction

pub mod builder;
pub mod similarity;

pub use builder::GraphBuilder;
pub use similarity::{Relation, SimilarityEdge, SimilarityGraph};
