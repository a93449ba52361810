//! K-means clustering and cluster-count selection on the PCA projection

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use std::collections::BTreeSet;

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};

/// Fitted K-means result over the projected data
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    /// Number of clusters requested
    pub n_clusters: usize,
    /// Cluster label per row, in `[0, n_clusters)`
    pub labels: Array1<usize>,
    /// Cluster centroids in PCA space (n_clusters, n_components)
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl ClusterAssignment {
    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Silhouette score of this assignment over `features`
    pub fn silhouette(&self, features: &Array2<f64>) -> f64 {
        silhouette_score(features, &self.labels, self.n_clusters)
    }
}

/// Fit K-means on the projected data.
///
/// Runs `config.n_init` k-means++ initialised restarts from an RNG seeded with
/// `config.seed` and keeps the lowest-inertia one, so a fixed configuration
/// always yields the same labels.
///
/// `n_clusters` may not exceed the number of distinct rows: duplicated points
/// can never be split across clusters.
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    config: &AnalysisConfig,
) -> Result<ClusterAssignment> {
    let n_samples = features.nrows();
    let n_distinct = count_distinct_rows(features);
    if n_clusters < 1 || n_clusters > n_distinct {
        return Err(AnalysisError::InvalidK {
            k: n_clusters,
            min: 1,
            max: n_distinct,
        });
    }

    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let rng = StdRng::seed_from_u64(config.seed);
    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(config.n_init)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .fit(&dataset)
        .map_err(|e| AnalysisError::Numeric(e.to_string()))?;

    let labels = model.predict(features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    let assignment = ClusterAssignment {
        n_clusters,
        labels,
        centroids,
        inertia,
    };
    let empty: Vec<usize> = assignment
        .cluster_sizes()
        .iter()
        .enumerate()
        .filter(|(_, &size)| size == 0)
        .map(|(cluster, _)| cluster)
        .collect();
    if !empty.is_empty() {
        warn!(clusters = ?empty, "K-means left clusters without members");
    }

    Ok(assignment)
}

/// Number of pairwise different rows; `-0.0` and `0.0` count as equal
fn count_distinct_rows(features: &Array2<f64>) -> usize {
    features
        .outer_iter()
        .map(|row| row.iter().map(|v| (v + 0.0).to_bits()).collect::<Vec<u64>>())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Per-k measurements gathered by the cluster-count search
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSearch {
    /// Evaluated cluster counts, ascending
    pub k_values: Vec<usize>,
    /// Inertia per evaluated k
    pub inertias: Vec<f64>,
    /// Silhouette score per evaluated k
    pub silhouette_scores: Vec<f64>,
}

impl ClusterSearch {
    /// The k with the highest silhouette score; the lowest such k on ties
    pub fn best_k(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (&k, &score) in self.k_values.iter().zip(&self.silhouette_scores) {
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((k, score)),
            }
        }
        best.map(|(k, _)| k)
    }
}

/// Evaluate K-means for every k in `[2, max_k]` and record inertia and
/// silhouette score. `max_k` is capped at `rows - 1`, the largest count a
/// silhouette score is defined for, and at the number of distinct rows.
pub fn search_cluster_counts(
    features: &Array2<f64>,
    max_k: usize,
    config: &AnalysisConfig,
) -> Result<ClusterSearch> {
    let limit = features
        .nrows()
        .saturating_sub(1)
        .min(count_distinct_rows(features));
    let upper = max_k.min(limit);
    if upper < 2 {
        return Err(AnalysisError::InvalidK {
            k: max_k,
            min: 2,
            max: limit,
        });
    }

    let mut search = ClusterSearch {
        k_values: Vec::new(),
        inertias: Vec::new(),
        silhouette_scores: Vec::new(),
    };

    for k in 2..=upper {
        let assignment = fit_kmeans(features, k, config)?;
        let silhouette = assignment.silhouette(features);
        debug!(k, inertia = assignment.inertia, silhouette, "evaluated cluster count");

        search.k_values.push(k);
        search.inertias.push(assignment.inertia);
        search.silhouette_scores.push(silhouette);
    }

    Ok(search)
}

/// Pick the cluster count with the best silhouette score
pub fn select_k(
    features: &Array2<f64>,
    max_k: usize,
    config: &AnalysisConfig,
) -> Result<(usize, ClusterSearch)> {
    let search = search_cluster_counts(features, max_k, config)?;
    let k = search
        .best_k()
        .ok_or_else(|| AnalysisError::Numeric("cluster search evaluated nothing".to_string()))?;
    info!(k, "selected cluster count by silhouette score");
    Ok((k, search))
}

/// Mean silhouette coefficient over all points.
///
/// Points in a singleton cluster score 0. Returns 0 when fewer than two
/// clusters are populated.
pub fn silhouette_score(features: &Array2<f64>, labels: &Array1<usize>, n_clusters: usize) -> f64 {
    let n_samples = features.nrows();
    if n_samples < 2 {
        return 0.0;
    }

    let mut sizes = vec![0usize; n_clusters];
    for &label in labels.iter() {
        if label < n_clusters {
            sizes[label] += 1;
        }
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];

        let mut distance_sums = vec![0.0; n_clusters];
        for j in 0..n_samples {
            if i == j {
                continue;
            }
            let other_label = labels[j];
            if other_label < n_clusters {
                distance_sums[other_label] += euclidean_distance(&point, &features.row(j));
            }
        }

        if sizes[cluster_label] <= 1 {
            continue;
        }

        // a(i): mean distance to the rest of its own cluster
        let a_i = distance_sums[cluster_label] / (sizes[cluster_label] - 1) as f64;

        // b(i): lowest mean distance to another populated cluster
        let b_i = (0..n_clusters)
            .filter(|&c| c != cluster_label && sizes[c] > 0)
            .map(|c| distance_sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denominator = a_i.max(b_i);
        if denominator > 0.0 && b_i.is_finite() {
            silhouette_sum += (b_i - a_i) / denominator;
        }
    }

    silhouette_sum / n_samples as f64
}

/// Compute within-cluster sum of squares (inertia)
pub fn compute_inertia(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            let distance_sq = point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
            inertia += distance_sq;
        }
    }

    inertia
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}
