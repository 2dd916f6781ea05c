//! Configuration management for the cohort clusterer

use thiserror::Error;

/// Invalid combinations of tuning parameters
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("maximum cluster size must be at least 1")]
    ZeroMaxClusterSize,

    #[error("minimum cluster size {min} exceeds maximum cluster size {max}")]
    InvertedBounds { min: usize, max: usize },

    #[error("cluster count K must be at least 1")]
    ZeroClusterCount,

    #[error("resolution must be a positive finite number, got {0}")]
    InvalidResolution(f64),

    #[error("tolerance must be a non-negative finite number, got {0}")]
    InvalidTolerance(f64),

    #[error("friend bucket count must be at least 1 when enabled")]
    ZeroFriendBuckets,

    #[error("friend edge weight must be at least 1")]
    ZeroFriendWeight,
}

/// Similarity graph construction settings
#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    /// Add edges between entities sharing languages
    pub language_edges: bool,

    /// Add edges between entities sharing specializations
    pub specialization_edges: bool,

    /// Add edges for declared friendships
    pub friend_edges: bool,

    /// Weight contributed by each direction of a declared friendship
    pub friend_weight: u32,

    /// Louvain resolution; higher values produce more, smaller communities
    pub resolution: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            language_edges: true,
            specialization_edges: true,
            friend_edges: false,
            friend_weight: 5,
            resolution: 1.2,
        }
    }
}

/// Size bounds enforced on communities after detection
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceConfig {
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,

    /// How many extra passes may run over the finalized set
    pub max_depth: usize,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 20,
            max_cluster_size: 25,
            max_depth: 20,
        }
    }
}

/// Feature vector layout
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureConfig {
    /// Number of hashed friend buckets prepended to each vector (None = disabled)
    pub friend_buckets: Option<usize>,

    /// Append a gender indicator as the last coordinate
    pub gender: bool,
}

/// Distance used by k-means for assignment and inertia
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Euclidean distance over every coordinate
    #[default]
    Euclidean,

    /// Euclidean distance ignoring the final coordinate
    TruncatedEuclidean,
}

/// K-means settings
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansConfig {
    pub clusters: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
    pub distance: DistanceMetric,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            clusters: 3,
            max_iterations: 100,
            tolerance: 1e-6,
            seed: 42,
            distance: DistanceMetric::Euclidean,
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub graph: GraphConfig,
    pub rebalance: RebalanceConfig,
    pub features: FeatureConfig,
    pub kmeans: KMeansConfig,
}

impl Config {
    /// Check every setting before any pipeline work starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = &self.rebalance;
        if bounds.max_cluster_size == 0 {
            return Err(ConfigError::ZeroMaxClusterSize);
        }
        if bounds.min_cluster_size > bounds.max_cluster_size {
            return Err(ConfigError::InvertedBounds {
                min: bounds.min_cluster_size,
                max: bounds.max_cluster_size,
            });
        }
        if self.kmeans.clusters == 0 {
            return Err(ConfigError::ZeroClusterCount);
        }
        if !(self.graph.resolution.is_finite() && self.graph.resolution > 0.0) {
            return Err(ConfigError::InvalidResolution(self.graph.resolution));
        }
        if !(self.kmeans.tolerance.is_finite() && self.kmeans.tolerance >= 0.0) {
            return Err(ConfigError::InvalidTolerance(self.kmeans.tolerance));
        }
        if self.features.friend_buckets == Some(0) {
            return Err(ConfigError::ZeroFriendBuckets);
        }
        if self.graph.friend_weight == 0 {
            return Err(ConfigError::ZeroFriendWeight);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.rebalance.min_cluster_size, 20);
        assert_eq!(config.rebalance.max_cluster_size, 25);
        assert_eq!(config.kmeans.clusters, 3);
        assert!((config.graph.resolution - 1.2).abs() < f64::EPSILON);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut config = Config::default();
        config.rebalance.min_cluster_size = 30;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedBounds { min: 30, max: 25 })
        );
    }

    #[test]
    fn rejects_degenerate_settings() {
        let mut config = Config::default();
        config.kmeans.clusters = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroClusterCount));

        let mut config = Config::default();
        config.graph.resolution = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidResolution(_))));

        let mut config = Config::default();
        config.features.friend_buckets = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroFriendBuckets));

        let mut config = Config::default();
        config.graph.friend_weight = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroFriendWeight));
    }
}
