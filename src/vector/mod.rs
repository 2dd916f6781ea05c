//! Feature vectorization and k-means clustering

pub mod features;
pub mod kmeans;

pub use features::{FeatureSchema, FeatureVectorizer};
pub use kmeans::{KMeans, KMeansResult};
