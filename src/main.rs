use anyhow::Result;
use clap::{Parser, ValueEnum};
use cohort_clusterer::config::{
    Config, DistanceMetric, FeatureConfig, GraphConfig, KMeansConfig, RebalanceConfig,
};
use cohort_clusterer::data::EntityStore;
use cohort_clusterer::pipeline;
use std::path::Path;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PipelineChoice {
    /// Similarity graph, community detection, size rebalancing
    Graph,
    /// Feature vectors and k-means
    Kmeans,
    /// Run both pipelines over the same input
    Both,
}

#[derive(Parser, Debug)]
#[clap(
    name = "cohort-clusterer",
    about = "Partition students into balanced groups by shared attributes"
)]
struct Cli {
    /// Path to input JSON file with entity records
    #[clap(long)]
    input: String,

    /// Output directory for results
    #[clap(long, default_value = "cluster_results")]
    output_dir: String,

    /// Which clustering pipeline to run
    #[clap(long, value_enum, default_value = "both")]
    pipeline: PipelineChoice,

    /// Minimum cluster size after rebalancing
    #[clap(long, default_value = "20")]
    min_cluster_size: usize,

    /// Maximum cluster size after rebalancing
    #[clap(long, default_value = "25")]
    max_cluster_size: usize,

    /// Louvain resolution parameter
    #[clap(long, default_value = "1.2")]
    resolution: f64,

    /// Extra rebalancing passes over the finalized clusters
    #[clap(long, default_value = "20")]
    max_rebalance_depth: usize,

    /// Number of k-means clusters (K)
    #[clap(long, default_value = "3")]
    clusters: usize,

    /// K-means iteration limit
    #[clap(long, default_value = "100")]
    max_iterations: usize,

    /// Centroid movement below which k-means has converged
    #[clap(long, default_value = "1e-6")]
    tolerance: f64,

    /// Seed for k-means++ initialization
    #[clap(long, default_value = "42")]
    seed: u64,

    /// Connect declared friends in the similarity graph
    #[clap(long)]
    friend_edges: bool,

    /// Edge weight per declared friendship direction
    #[clap(long, default_value = "5")]
    friend_weight: u32,

    /// Hash friend ids into this many leading vector coordinates
    #[clap(long, num_args = 0..=1, default_missing_value = "5")]
    friend_buckets: Option<usize>,

    /// Append a gender indicator to feature vectors
    #[clap(long)]
    gender_feature: bool,

    /// Ignore the last vector coordinate when measuring k-means distance
    #[clap(long)]
    legacy_distance: bool,

    /// Skip visualizations
    #[clap(long)]
    skip_viz: bool,

    /// Number of worker threads (0 = use all available cores)
    #[clap(long, default_value = "0")]
    threads: usize,

    /// Verbose logging
    #[clap(long, short)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            graph: GraphConfig {
                friend_edges: self.friend_edges,
                friend_weight: self.friend_weight,
                resolution: self.resolution,
                ..GraphConfig::default()
            },
            rebalance: RebalanceConfig {
                min_cluster_size: self.min_cluster_size,
                max_cluster_size: self.max_cluster_size,
                max_depth: self.max_rebalance_depth,
            },
            features: FeatureConfig {
                friend_buckets: self.friend_buckets,
                gender: self.gender_feature,
            },
            kmeans: KMeansConfig {
                clusters: self.clusters,
                max_iterations: self.max_iterations,
                tolerance: self.tolerance,
                seed: self.seed,
                distance: if self.legacy_distance {
                    DistanceMetric::TruncatedEuclidean
                } else {
                    DistanceMetric::Euclidean
                },
            },
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Cli::parse();

    // Configure logging
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let config = args.config();
    config.validate()?;

    // Set number of threads
    let num_threads = if args.threads > 0 {
        args.threads
    } else {
        // If threads = 0, use all available cores
        num_cpus::get()
    };

    log::info!("Using {} worker threads", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    log::info!("Starting cohort clustering");
    log::info!("Input: {}", args.input);
    log::info!("Output: {}", args.output_dir);

    let output_dir = Path::new(&args.output_dir);

    // 1. Load entities
    let store = EntityStore::load(&args.input)?;
    if !store.issues().is_empty() {
        log::warn!("Skipped or ignored {} malformed references in input", store.issues().len());
    }

    // 2. Run the selected pipelines; output is committed only if all of them succeed
    let selection = pipeline::Selection {
        graph: matches!(args.pipeline, PipelineChoice::Graph | PipelineChoice::Both),
        kmeans: matches!(args.pipeline, PipelineChoice::Kmeans | PipelineChoice::Both),
        render: !args.skip_viz,
    };
    let (graph_run, kmeans_run) = pipeline::run_pipelines(&store, &config, output_dir, selection)?;

    if let Some(run) = graph_run {
        log::info!(
            "Graph pipeline produced {} clusters from {} communities",
            run.outcome.clusters.len(),
            run.partition.len()
        );
    }
    if let Some(run) = kmeans_run {
        log::info!(
            "K-means pipeline produced {} clusters in {} iterations",
            run.clusters.len(),
            run.result.iterations
        );
    }

    log::info!("Clustering complete. Results saved to {}", args.output_dir);

    Ok(())
}
