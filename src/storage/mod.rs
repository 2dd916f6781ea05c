//! Results persistence module

use crate::cluster::metrics::calculate_cluster_metrics;
use crate::cluster::rebalance::RebalanceOutcome;
use crate::cluster::{Cluster, Partition};
use crate::data::{Entity, EntityStore};
use crate::graph::{Relation, SimilarityGraph};
use crate::report::CompositionReport;
use crate::vector::{FeatureSchema, KMeansResult};
use anyhow::{Context, Result};
use ndarray::Array2;
use serde::Serialize;
use serde_json::{json, to_string_pretty};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A results directory that only appears at its final location once complete.
///
/// Files are written into a hidden sibling directory; `commit` swaps it into
/// place. Dropping an uncommitted directory removes the partial output.
#[derive(Debug)]
pub struct StagedDir {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedDir {
    pub fn create(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("Output path has no directory name: {}", target.display()))?;
        let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
        let staging = parent.join(format!(".{}.staging-{}", name, std::process::id()));

        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("clearing stale staging directory {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("creating staging directory {}", staging.display()))?;

        Ok(Self {
            staging,
            target,
            committed: false,
        })
    }

    /// Where files should be written before commit
    pub fn path(&self) -> &Path {
        &self.staging
    }

    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.staging.join(name);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(dir)
    }

    /// Replace the target directory with the staged contents
    pub fn commit(mut self) -> Result<PathBuf> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target)
                .with_context(|| format!("removing previous output {}", self.target.display()))?;
        }
        fs::rename(&self.staging, &self.target).with_context(|| {
            format!("moving {} to {}", self.staging.display(), self.target.display())
        })?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_dir_all(&self.staging);
        }
    }
}

fn write_compact<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn write_pretty(path: &Path, value: &serde_json::Value) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(to_string_pretty(value)?.as_bytes())?;
    Ok(())
}

/// Write one `<index>.json` member list per group
fn save_member_lists(dir: &Path, store: &EntityStore, groups: &[&[usize]]) -> Result<()> {
    for (index, members) in groups.iter().enumerate() {
        let entities: Vec<&Entity> = store.members(members);
        write_compact(&dir.join(format!("{}.json", index)), &entities)?;
    }
    Ok(())
}

fn ids(store: &EntityStore, members: &[usize]) -> Vec<String> {
    store.members(members).into_iter().map(|e| e.id.clone()).collect()
}

/// Save similarity-graph pipeline results
pub fn save_graph_results(
    staged: &StagedDir,
    store: &EntityStore,
    graph: &SimilarityGraph,
    partition: &Partition,
    outcome: &RebalanceOutcome,
    report: &CompositionReport,
) -> Result<()> {
    log::info!(
        "Saving {} communities and {} clusters to {}",
        partition.len(),
        outcome.clusters.len(),
        staged.path().display()
    );

    let communities_dir = staged.subdir("communities")?;
    let community_groups: Vec<&[usize]> = partition.communities.iter().map(|c| c.members.as_slice()).collect();
    save_member_lists(&communities_dir, store, &community_groups)?;

    let clusters_dir = staged.subdir("clusters")?;
    let cluster_groups: Vec<&[usize]> = outcome.clusters.iter().map(|c| c.members.as_slice()).collect();
    save_member_lists(&clusters_dir, store, &cluster_groups)?;

    save_graph_summary(staged.path(), store, graph, partition, outcome)?;
    write_compact(&staged.path().join("report.json"), report)?;

    log::info!("Graph results saved successfully");
    Ok(())
}

fn save_graph_summary(
    dir: &Path,
    store: &EntityStore,
    graph: &SimilarityGraph,
    partition: &Partition,
    outcome: &RebalanceOutcome,
) -> Result<()> {
    let relation_counts = graph.relation_counts();
    let edge_count = |relation| relation_counts.get(&relation).copied().unwrap_or(0);

    let clusters: Vec<serde_json::Value> = outcome
        .clusters
        .iter()
        .map(|cluster| {
            let metrics = calculate_cluster_metrics(graph, &cluster.members);
            json!({
                "id": cluster.id,
                "size": cluster.size(),
                "density": metrics.density,
                "internal_weight": metrics.internal_weight,
                "central_members": ids(store, &metrics.central_members),
                "outside_bounds": outcome.is_flagged(cluster.id),
                "undersized_exception": outcome.is_exception(cluster.id),
            })
        })
        .collect();

    let summary = json!({
        "graph_stats": {
            "node_count": graph.node_count(),
            "edge_count": graph.edge_count(),
            "language_edges": edge_count(Relation::Language),
            "specialization_edges": edge_count(Relation::Specialization),
            "friend_edges": edge_count(Relation::Friend),
            "data_errors": store.issues().iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        },
        "community_stats": {
            "community_count": partition.len(),
            "sizes": partition.communities.iter().map(|c| c.members.len()).collect::<Vec<_>>(),
        },
        "rebalance": {
            "stats": outcome.stats,
            "violations": outcome.violations,
            "exceptions": outcome.exceptions,
        },
        "clusters": clusters,
    });

    write_pretty(&dir.join("summary.json"), &summary)
}

/// Binary snapshot of the feature space, for offline inspection
#[derive(Debug, Serialize)]
struct FeatureSnapshot<'a> {
    schema: &'a FeatureSchema,
    ids: Vec<&'a str>,
    rows: Vec<Vec<u8>>,
}

fn binary_rows(matrix: &Array2<f64>) -> Vec<Vec<u8>> {
    matrix
        .outer_iter()
        .map(|row| row.iter().map(|&v| v as u8).collect())
        .collect()
}

/// Save k-means pipeline results
pub fn save_kmeans_results(
    staged: &StagedDir,
    store: &EntityStore,
    schema: &FeatureSchema,
    matrix: &Array2<f64>,
    result: &KMeansResult,
    clusters: &[Cluster],
    report: &CompositionReport,
) -> Result<()> {
    log::info!("Saving {} k-means clusters to {}", clusters.len(), staged.path().display());

    let clusters_dir = staged.subdir("clusters")?;
    let groups: Vec<&[usize]> = clusters.iter().map(|c| c.members.as_slice()).collect();
    save_member_lists(&clusters_dir, store, &groups)?;

    let rows = binary_rows(matrix);
    let vectors_dir = staged.subdir("vectors")?;
    for (index, row) in rows.iter().enumerate() {
        write_compact(&vectors_dir.join(format!("{}.json", index)), row)?;
    }

    let snapshot = FeatureSnapshot {
        schema,
        ids: store.entities().iter().map(|e| e.id.as_str()).collect(),
        rows,
    };
    let snapshot_path = staged.path().join("features.bin");
    let mut writer = BufWriter::new(
        File::create(&snapshot_path).with_context(|| format!("creating {}", snapshot_path.display()))?,
    );
    bincode::serialize_into(&mut writer, &snapshot)?;
    writer.flush()?;

    let summary = json!({
        "entity_count": store.len(),
        "dimension": schema.dimension(),
        "coordinates": schema.labels(),
        "iterations": result.iterations,
        "converged": result.converged,
        "inertia": result.inertia,
        "cluster_sizes": clusters.iter().map(Cluster::size).collect::<Vec<_>>(),
    });
    write_pretty(&staged.path().join("summary.json"), &summary)?;
    write_compact(&staged.path().join("report.json"), report)?;

    log::info!("K-means results saved successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_previous_output() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("graph");
        fs::create_dir_all(target.join("clusters")).unwrap();
        fs::write(target.join("clusters/99.json"), "[]").unwrap();

        let staged = StagedDir::create(&target).unwrap();
        fs::write(staged.path().join("summary.json"), "{}").unwrap();
        let staging_path = staged.path().to_path_buf();
        staged.commit().unwrap();

        assert!(target.join("summary.json").exists());
        assert!(!target.join("clusters/99.json").exists());
        assert!(!staging_path.exists());
    }

    #[test]
    fn dropped_stage_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("kmeans");

        let staged = StagedDir::create(&target).unwrap();
        let staging_path = staged.path().to_path_buf();
        fs::write(staging_path.join("partial.json"), "[").unwrap();
        drop(staged);

        assert!(!staging_path.exists());
        assert!(!target.exists());
    }

    #[test]
    fn member_lists_serialize_entities() {
        let root = tempfile::tempdir().unwrap();
        let store = EntityStore::from_entities(vec![
            Entity::new("a", &["EN"], &[]),
            Entity::new("b", &["FR"], &["AI"]),
        ]);
        save_member_lists(root.path(), &store, &[&[1, 0], &[]]).unwrap();

        let first: Vec<Entity> =
            serde_json::from_str(&fs::read_to_string(root.path().join("0.json")).unwrap()).unwrap();
        assert_eq!(first.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);

        let second: Vec<Entity> =
            serde_json::from_str(&fs::read_to_string(root.path().join("1.json")).unwrap()).unwrap();
        assert!(second.is_empty());
    }
}
