//! Community detection, size rebalancing, and cluster statistics

pub mod detection;
pub mod metrics;
pub mod rebalance;

use serde::Serialize;

/// A group of nodes produced by modularity optimization, before size rebalancing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Community {
    pub id: usize,

    /// Member entity indices in ascending order
    pub members: Vec<usize>,
}

/// Result of community detection: a label for every node plus the grouped view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Community id per node
    pub labels: Vec<usize>,

    /// Communities ordered by id
    pub communities: Vec<Community>,
}

impl Partition {
    /// Group nodes by label; labels must already be contiguous from zero
    pub fn from_labels(labels: Vec<usize>) -> Self {
        let count = labels.iter().copied().max().map_or(0, |m| m + 1);
        let mut communities: Vec<Community> = (0..count)
            .map(|id| Community { id, members: Vec::new() })
            .collect();
        for (node, &label) in labels.iter().enumerate() {
            communities[label].members.push(node);
        }
        Self { labels, communities }
    }

    pub fn len(&self) -> usize {
        self.communities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }
}

/// A final output group, from either pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    /// 0-based index in finalization order
    pub id: usize,

    /// Member entity indices, in the order they were gathered
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}
