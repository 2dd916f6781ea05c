//! Composition statistics of exported clusters

use crate::cluster::Cluster;
use crate::data::EntityStore;
use itertools::Itertools;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashSet};

/// Attribute make-up of one cluster, or of all clusters together
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Composition {
    pub size: usize,
    pub languages: BTreeMap<String, usize>,
    pub specializations: BTreeMap<String, usize>,
    pub genders: BTreeMap<String, usize>,

    /// Friends listed by members, counting only ids present in the input
    pub friend_requests: usize,

    /// Listed friends that ended up in the same cluster
    pub friends_accepted: usize,
}

impl Composition {
    pub fn acceptance_ratio(&self) -> f64 {
        if self.friend_requests == 0 {
            0.0
        } else {
            self.friends_accepted as f64 / self.friend_requests as f64
        }
    }

    fn absorb(&mut self, other: &Composition) {
        self.size += other.size;
        self.friend_requests += other.friend_requests;
        self.friends_accepted += other.friends_accepted;
        for (target, source) in [
            (&mut self.languages, &other.languages),
            (&mut self.specializations, &other.specializations),
            (&mut self.genders, &other.genders),
        ] {
            for (key, count) in source {
                *target.entry(key.clone()).or_insert(0) += count;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterComposition {
    pub cluster_id: usize,

    #[serde(flatten)]
    pub composition: Composition,

    pub acceptance_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SizeStats {
    pub count: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionReport {
    pub clusters: Vec<ClusterComposition>,
    pub overall: Composition,
    pub overall_acceptance_ratio: f64,
    pub sizes: SizeStats,
}

fn composition_of(store: &EntityStore, cluster: &Cluster) -> Composition {
    let members = store.members(&cluster.members);
    let member_set: HashSet<usize> = cluster.members.iter().copied().collect();
    let requests = || cluster.members.iter().flat_map(|&m| store.friends_of(m));

    let count = |values: Vec<&String>| -> BTreeMap<String, usize> {
        values.into_iter().counts().into_iter().map(|(k, v)| (k.clone(), v)).collect()
    };

    Composition {
        size: members.len(),
        languages: count(members.iter().flat_map(|e| &e.options.languages).collect()),
        specializations: count(members.iter().flat_map(|e| &e.options.specialization).collect()),
        genders: members
            .iter()
            .map(|e| e.gender.clone().unwrap_or_else(|| "unknown".to_string()))
            .counts()
            .into_iter()
            .collect(),
        friend_requests: requests().count(),
        friends_accepted: requests().filter(|&&f| member_set.contains(&f)).count(),
    }
}

fn size_stats(clusters: &[Cluster]) -> SizeStats {
    if clusters.is_empty() {
        return SizeStats::default();
    }

    let sizes: Vec<f64> = clusters.iter().map(|c| c.size() as f64).collect();
    let std_dev = if sizes.len() > 1 { sizes.iter().std_dev() } else { 0.0 };

    SizeStats {
        count: clusters.len(),
        min: Iterator::min(clusters.iter().map(Cluster::size)).unwrap_or(0),
        max: Iterator::max(clusters.iter().map(Cluster::size)).unwrap_or(0),
        mean: sizes.iter().mean(),
        std_dev,
    }
}

/// Summarize who ended up where
pub fn build_report(store: &EntityStore, clusters: &[Cluster]) -> CompositionReport {
    let mut overall = Composition::default();
    let per_cluster: Vec<ClusterComposition> = clusters
        .iter()
        .map(|cluster| {
            let composition = composition_of(store, cluster);
            overall.absorb(&composition);
            ClusterComposition {
                cluster_id: cluster.id,
                acceptance_ratio: composition.acceptance_ratio(),
                composition,
            }
        })
        .collect();

    CompositionReport {
        clusters: per_cluster,
        overall_acceptance_ratio: overall.acceptance_ratio(),
        overall,
        sizes: size_stats(clusters),
    }
}

/// Log a short summary of a report
pub fn log_report(label: &str, report: &CompositionReport) {
    log::info!(
        "{}: {} clusters, sizes {}..{} (mean {:.2}, std dev {:.2}), friend acceptance {:.1}% ({}/{})",
        label,
        report.sizes.count,
        report.sizes.min,
        report.sizes.max,
        report.sizes.mean,
        report.sizes.std_dev,
        report.overall_acceptance_ratio * 100.0,
        report.overall.friends_accepted,
        report.overall.friend_requests
    );
    for cluster in &report.clusters {
        log::debug!(
            "{} cluster {}: {} members, {} languages, {} specializations, acceptance {:.2}",
            label,
            cluster.cluster_id,
            cluster.composition.size,
            cluster.composition.languages.len(),
            cluster.composition.specializations.len(),
            cluster.acceptance_ratio
        );
    }
}
