//! K-means clustering over feature vectors

use crate::config::{DistanceMetric, KMeansConfig};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

impl DistanceMetric {
    /// Number of leading coordinates the metric looks at
    fn span(&self, dimension: usize) -> usize {
        match self {
            DistanceMetric::Euclidean => dimension,
            DistanceMetric::TruncatedEuclidean => dimension.saturating_sub(1),
        }
    }

    /// Squared distance between two points
    pub fn squared(&self, p: ArrayView1<f64>, q: ArrayView1<f64>) -> f64 {
        let span = self.span(p.len().min(q.len()));
        (0..span).map(|i| (p[i] - q[i]).powi(2)).sum()
    }

    pub fn distance(&self, p: ArrayView1<f64>, q: ArrayView1<f64>) -> f64 {
        self.squared(p, q).sqrt()
    }
}

/// Output of a k-means run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KMeansResult {
    /// Cluster index in `0..k` per input row
    pub assignments: Vec<usize>,

    #[serde(skip)]
    pub centroids: Array2<f64>,

    pub iterations: usize,
    pub converged: bool,

    /// Sum of squared distances to the assigned centroid
    pub inertia: f64,
}

impl KMeansResult {
    /// Row indices grouped per cluster; empty clusters are kept
    pub fn groups(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.centroids.nrows()];
        for (row, &cluster) in self.assignments.iter().enumerate() {
            groups[cluster].push(row);
        }
        groups
    }
}

/// Lloyd's algorithm with k-means++ seeding
pub struct KMeans<'a> {
    config: &'a KMeansConfig,
}

impl<'a> KMeans<'a> {
    pub fn new(config: &'a KMeansConfig) -> Self {
        Self { config }
    }

    fn nearest(&self, point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
        let mut best = (0, f64::INFINITY);
        for (idx, centroid) in centroids.outer_iter().enumerate() {
            let d = self.config.distance.squared(point, centroid);
            if d < best.1 {
                best = (idx, d);
            }
        }
        best
    }

    /// Choose initial centroids, each new one with probability proportional to D²
    fn seed_centroids(&self, data: &Array2<f64>, rng: &mut StdRng) -> Array2<f64> {
        let k = self.config.clusters;
        let n = data.nrows();
        let mut centroids = Array2::zeros((k, data.ncols()));

        let first = rng.gen_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        let mut closest: Vec<f64> = data
            .outer_iter()
            .map(|p| self.config.distance.squared(p, data.row(first)))
            .collect();

        for c in 1..k {
            let total: f64 = closest.iter().sum();
            let chosen = if total > 0.0 {
                let mut target = rng.gen_range(0.0..total);
                let mut pick = n - 1;
                for (idx, &d) in closest.iter().enumerate() {
                    if target < d {
                        pick = idx;
                        break;
                    }
                    target -= d;
                }
                pick
            } else {
                // Every point already coincides with a centroid
                rng.gen_range(0..n)
            };

            centroids.row_mut(c).assign(&data.row(chosen));
            for (idx, point) in data.outer_iter().enumerate() {
                let d = self.config.distance.squared(point, data.row(chosen));
                if d < closest[idx] {
                    closest[idx] = d;
                }
            }
        }

        centroids
    }

    /// Cluster the rows of `data`
    pub fn fit(&self, data: &Array2<f64>) -> KMeansResult {
        let k = self.config.clusters;
        let (n, dimension) = data.dim();
        log::info!("Running k-means with K={} over {} points ({} dimensions)", k, n, dimension);

        if n == 0 {
            return KMeansResult {
                assignments: Vec::new(),
                centroids: Array2::zeros((k, dimension)),
                iterations: 0,
                converged: true,
                inertia: 0.0,
            };
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut centroids = self.seed_centroids(data, &mut rng);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let assignments: Vec<usize> = (0..n)
                .into_par_iter()
                .map(|row| self.nearest(data.row(row), &centroids).0)
                .collect();

            let mut sums = Array2::<f64>::zeros((k, dimension));
            let mut counts = vec![0usize; k];
            for (point, &cluster) in data.outer_iter().zip(&assignments) {
                let mut row = sums.row_mut(cluster);
                row += &point;
                counts[cluster] += 1;
            }

            let mut movement: f64 = 0.0;
            for (cluster, &count) in counts.iter().enumerate() {
                // Empty clusters keep their previous centroid
                if count == 0 {
                    continue;
                }
                let mean: Array1<f64> = sums.row(cluster).mapv(|v| v / count as f64);
                movement = movement.max(self.config.distance.distance(centroids.row(cluster), mean.view()));
                centroids.row_mut(cluster).assign(&mean);
            }

            log::debug!("Iteration {}: max centroid movement {:.3e}", iterations, movement);

            if movement <= self.config.tolerance {
                converged = true;
                break;
            }
        }

        if converged {
            log::info!("K-means converged after {} iterations", iterations);
        } else {
            log::warn!(
                "Convergence warning: k-means stopped at the {} iteration limit without reaching tolerance {}",
                self.config.max_iterations,
                self.config.tolerance
            );
        }

        // Final assignment against the settled centroids
        let nearest: Vec<(usize, f64)> = (0..n)
            .into_par_iter()
            .map(|row| self.nearest(data.row(row), &centroids))
            .collect();
        let inertia = nearest.iter().map(|&(_, d)| d).sum();
        let assignments = nearest.into_iter().map(|(cluster, _)| cluster).collect();

        KMeansResult {
            assignments,
            centroids,
            iterations,
            converged,
            inertia,
        }
    }
}
