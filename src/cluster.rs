//! K-Means segmentation model over the aggregated metrics
//!
//! A descriptive companion to the rule-based segments: the always-defined
//! numeric features of each customer row are standardized and clustered.
//! The fit is seeded, so the same snapshot and seed reproduce the same
//! model. The result never feeds back into segment assignment.

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::metrics::CustomerMetrics;

/// Features fed to the model, in column order. `avg_review_score` is
/// deliberately absent: it is undefined for unreviewed customers and is
/// never imputed with a numeric default.
pub const FEATURE_NAMES: [&str; 4] = [
    "total_orders",
    "total_spent",
    "avg_order_value",
    "lifespan_days",
];

/// Per-column standardization fitted on the raw feature matrix
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Array1<f64>,
    stds: Array1<f64>,
}

impl StandardScaler {
    /// Fit column means and standard deviations. A constant column keeps a
    /// std of 1 so its transform is a plain shift.
    pub fn fit(data: &Array2<f64>) -> Self {
        let means = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(data.ncols()));
        let stds = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s == 0.0 { 1.0 } else { s });
        Self { means, stds }
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut out = data.clone();
        for mut row in out.rows_mut() {
            row -= &self.means;
            row /= &self.stds;
        }
        out
    }

    /// Scale one raw feature row into the fitted space
    pub fn transform_row(&self, row: &[f64]) -> Array1<f64> {
        (&Array1::from_vec(row.to_vec()) - &self.means) / &self.stds
    }
}

/// Standardized feature matrix for clustering, with everything needed to
/// score new rows
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Standardized features, shape `(n_customers, FEATURE_NAMES.len())`
    pub features: Array2<f64>,
    /// Customer ids corresponding to each row
    pub customer_ids: Vec<String>,
    /// Fitted scaler for normalizing new data
    pub scaler: StandardScaler,
    /// Raw feature values before standardization
    pub raw: Array2<f64>,
}

/// Build the feature matrix from the aggregated metrics table
pub fn feature_matrix(metrics: &[CustomerMetrics]) -> crate::Result<FeatureMatrix> {
    if metrics.is_empty() {
        return Err(crate::Error::InvalidInput(
            "cannot build a feature matrix from an empty metrics table".to_string(),
        ));
    }

    let n = metrics.len();
    let mut raw_data = Vec::with_capacity(n * FEATURE_NAMES.len());
    let mut customer_ids = Vec::with_capacity(n);
    for m in metrics {
        raw_data.extend_from_slice(&[
            m.total_orders as f64,
            m.total_spent.to_f64().unwrap_or(0.0),
            m.avg_order_value.to_f64().unwrap_or(0.0),
            m.lifespan_days as f64,
        ]);
        customer_ids.push(m.customer_id.clone());
    }

    let raw = Array2::from_shape_vec((n, FEATURE_NAMES.len()), raw_data)
        .map_err(|e| crate::Error::Clustering(e.to_string()))?;
    let scaler = StandardScaler::fit(&raw);
    let features = scaler.transform(&raw);

    Ok(FeatureMatrix {
        features,
        customer_ids,
        scaler,
        raw,
    })
}

/// Fitted K-Means model with its training assignments
#[derive(Debug)]
pub struct SegmentationModel {
    /// Fitted K-Means model from linfa
    pub model: KMeans<f64, L2Dist>,
    pub n_clusters: usize,
    /// Cluster assignments for the training rows
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
}

impl SegmentationModel {
    /// Assign a standardized feature row to its nearest centroid
    pub fn predict(&self, features: &Array1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(crate::Error::InvalidInput(format!(
                "feature vector must have exactly {} dimensions",
                self.centroids.ncols()
            )));
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;
        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(&features.view(), &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }
        Ok(closest_cluster)
    }

    /// Training rows per cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Silhouette coefficient over a subset of points (for efficiency)
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size);
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = features.row(i);
            let cluster_label = self.labels[i];

            let mut same_cluster_distances = Vec::new();
            let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }
                let distance = euclidean_distance(&point, &features.row(j));
                let other_label = self.labels[j];
                if other_label == cluster_label {
                    same_cluster_distances.push(distance);
                } else if other_label < self.n_clusters {
                    other_cluster_distances[other_label].push(distance);
                }
            }

            let a_i = if same_cluster_distances.is_empty() {
                0.0
            } else {
                same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64
            };

            let b_i = other_cluster_distances
                .iter()
                .filter(|distances| !distances.is_empty())
                .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
                .fold(f64::INFINITY, f64::min);

            let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };

            silhouette_sum += silhouette_i;
        }

        silhouette_sum / n_samples as f64
    }
}

/// Fit a seeded K-Means model on the feature matrix.
///
/// The cluster count is held to 3..=5, the range that yields meaningful
/// customer segments on this data.
pub fn fit_kmeans(
    data: &FeatureMatrix,
    n_clusters: usize,
    max_iters: usize,
    tolerance: f64,
    seed: u64,
) -> crate::Result<SegmentationModel> {
    if !(3..=5).contains(&n_clusters) {
        return Err(crate::Error::InvalidInput(
            "number of clusters should be between 3 and 5 for meaningful customer segmentation"
                .to_string(),
        ));
    }
    if data.features.nrows() < n_clusters {
        return Err(crate::Error::InvalidInput(format!(
            "number of data points ({}) must be at least equal to number of clusters ({})",
            data.features.nrows(),
            n_clusters
        )));
    }

    let n_samples = data.features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(data.features.clone(), targets);

    let rng = StdRng::seed_from_u64(seed);
    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .max_n_iterations(max_iters as u64)
        .tolerance(tolerance)
        .fit(&dataset)
        .map_err(|e| crate::Error::Clustering(e.to_string()))?;

    let labels = model.predict(&dataset);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(&data.features, &labels, &centroids);
    debug!(n_clusters, inertia, "fitted k-means model");

    Ok(SegmentationModel {
        model,
        n_clusters,
        labels,
        centroids,
        inertia,
    })
}

/// Predict the cluster for a raw (unscaled) feature row, ordered as
/// `FEATURE_NAMES`
pub fn predict_cluster(
    model: &SegmentationModel,
    data: &FeatureMatrix,
    raw_features: &[f64; 4],
) -> crate::Result<usize> {
    let scaled = data.scaler.transform_row(raw_features);
    model.predict(&scaled)
}

/// Within-cluster sum of squares
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;
    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            let distance_sq: f64 = point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            inertia += distance_sq;
        }
    }
    inertia
}

fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}
