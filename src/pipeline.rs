//! End-to-end runs of the two clustering strategies over one entity snapshot

use crate::cluster::detection::{modularity, CommunityDetector};
use crate::cluster::rebalance::{ClusterRebalancer, RebalanceOutcome};
use crate::cluster::{Cluster, Partition};
use crate::config::Config;
use crate::data::EntityStore;
use crate::graph::{GraphBuilder, SimilarityGraph};
use crate::report::{build_report, log_report, CompositionReport};
use crate::storage::{save_graph_results, save_kmeans_results, StagedDir};
use crate::vector::{FeatureSchema, FeatureVectorizer, KMeans, KMeansResult};
use crate::viz;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything the graph pipeline produced
#[derive(Debug)]
pub struct GraphRun {
    pub graph: SimilarityGraph,
    pub partition: Partition,
    pub modularity: f64,
    pub outcome: RebalanceOutcome,
    pub report: CompositionReport,
    pub output: PathBuf,
}

/// Everything the k-means pipeline produced
#[derive(Debug)]
pub struct KMeansRun {
    pub schema: FeatureSchema,
    pub result: KMeansResult,
    pub clusters: Vec<Cluster>,
    pub report: CompositionReport,
    pub output: PathBuf,
}

/// Which pipelines a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub graph: bool,
    pub kmeans: bool,
    pub render: bool,
}

/// Similarity graph, community detection, then size rebalancing.
///
/// Results land in `<output_dir>/graph`, replacing any previous run. When
/// `render` is set, images are drawn into the same directory; rendering
/// failures are logged and never fail the run.
pub fn run_graph_pipeline(store: &EntityStore, config: &Config, output_dir: &Path, render: bool) -> Result<GraphRun> {
    let selection = Selection { graph: true, kmeans: false, render };
    let (graph, _) = run_pipelines(store, config, output_dir, selection)?;
    graph.ok_or_else(|| anyhow::anyhow!("graph pipeline produced no result"))
}

/// One-hot feature vectors clustered with k-means.
///
/// Results land in `<output_dir>/kmeans`, replacing any previous run.
pub fn run_kmeans_pipeline(store: &EntityStore, config: &Config, output_dir: &Path) -> Result<KMeansRun> {
    let selection = Selection { graph: false, kmeans: true, render: false };
    let (_, kmeans) = run_pipelines(store, config, output_dir, selection)?;
    kmeans.ok_or_else(|| anyhow::anyhow!("k-means pipeline produced no result"))
}

/// Run the selected pipelines, committing their output only once all of them succeeded.
///
/// On failure nothing is committed, and an output directory created by this
/// call is removed again.
pub fn run_pipelines(
    store: &EntityStore,
    config: &Config,
    output_dir: &Path,
    selection: Selection,
) -> Result<(Option<GraphRun>, Option<KMeansRun>)> {
    let created = !output_dir.exists();
    let result = stage_and_commit(store, config, output_dir, selection);
    if result.is_err() && created {
        // Only succeeds when nothing was left inside
        let _ = fs::remove_dir(output_dir);
    }
    result
}

fn stage_and_commit(
    store: &EntityStore,
    config: &Config,
    output_dir: &Path,
    selection: Selection,
) -> Result<(Option<GraphRun>, Option<KMeansRun>)> {
    let graph = if selection.graph {
        Some(stage_graph(store, config, output_dir, selection.render)?)
    } else {
        None
    };
    let kmeans = if selection.kmeans {
        Some(stage_kmeans(store, config, output_dir)?)
    } else {
        None
    };

    let graph = graph
        .map(|(run, staged)| {
            staged.commit()?;
            log::info!("Graph results saved to {}", run.output.display());
            Ok::<_, anyhow::Error>(run)
        })
        .transpose()?;
    let kmeans = kmeans
        .map(|(run, staged)| {
            staged.commit()?;
            log::info!("K-means results saved to {}", run.output.display());
            Ok::<_, anyhow::Error>(run)
        })
        .transpose()?;
    Ok((graph, kmeans))
}

fn stage_graph(store: &EntityStore, config: &Config, output_dir: &Path, render: bool) -> Result<(GraphRun, StagedDir)> {
    log::info!("Starting graph pipeline");

    let graph = GraphBuilder::new(&config.graph).build(store);

    let partition = CommunityDetector::new(config.graph.resolution).detect(&graph);
    let quality = modularity(&graph, &partition.labels, config.graph.resolution);
    log::info!("Found {} communities (modularity {:.4})", partition.len(), quality);

    let outcome = ClusterRebalancer::new(&config.rebalance, &graph).rebalance(&partition.communities);

    let report = build_report(store, &outcome.clusters);
    log_report("graph", &report);

    let output = output_dir.join("graph");
    let staged = StagedDir::create(&output)?;
    save_graph_results(&staged, store, &graph, &partition, &outcome, &report)?;
    viz::write_graphml(&graph, &partition, &staged.path().join("similarity.graphml"))?;
    if render {
        viz::generate_visualizations(staged.path(), &graph, &partition, &outcome);
    }

    log::info!("Graph pipeline complete");
    let run = GraphRun {
        graph,
        partition,
        modularity: quality,
        outcome,
        report,
        output,
    };
    Ok((run, staged))
}

fn stage_kmeans(store: &EntityStore, config: &Config, output_dir: &Path) -> Result<(KMeansRun, StagedDir)> {
    log::info!("Starting k-means pipeline");

    let vectorizer = FeatureVectorizer::new(FeatureSchema::from_store(store, &config.features));
    let matrix = vectorizer.vectorize(store);

    let result = KMeans::new(&config.kmeans).fit(&matrix);
    let clusters: Vec<Cluster> = result
        .groups()
        .into_iter()
        .enumerate()
        .map(|(id, members)| Cluster { id, members })
        .collect();

    let empty = clusters.iter().filter(|c| c.members.is_empty()).count();
    if empty > 0 {
        log::warn!("{} of {} k-means clusters are empty", empty, clusters.len());
    }

    let report = build_report(store, &clusters);
    log_report("kmeans", &report);

    let output = output_dir.join("kmeans");
    let staged = StagedDir::create(&output)?;
    save_kmeans_results(&staged, store, vectorizer.schema(), &matrix, &result, &clusters, &report)?;

    log::info!("K-means pipeline complete");
    let run = KMeansRun {
        schema: vectorizer.schema().clone(),
        result,
        clusters,
        report,
        output,
    };
    Ok((run, staged))
}
