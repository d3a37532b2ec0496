// src/kmeans.rs

//! Centroid clustering with a pluggable distance metric.

use log::{debug, info, warn};
use ndarray::{Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ClusterKitError, Result};
use crate::metric::DistanceMetric;
use crate::pca::{NComponents, PCA};
use crate::validate::{ensure_columns, ensure_finite};

pub const DEFAULT_MAX_ITER: usize = 300;

/// Visualization dimensionalities accepted by [`KMeans`]; 0 turns the projection off.
pub const SUPPORTED_VIS_DIMS: [usize; 3] = [0, 2, 3];

/// Cooperative cancellation flag, checked once per clustering iteration.
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Every [`KMeans`] hyperparameter except the cluster count.
#[derive(Debug, Clone)]
pub struct KMeansParams {
    pub metric: DistanceMetric,
    /// Dimensionality of the visualization projection (0, 2 or 3).
    pub vis_dims: usize,
    /// Seeds the choice of initial centroids.
    pub seed: u64,
    /// Identifies the run in log lines and in the visualization PCA.
    pub name: String,
    pub max_iter: usize,
    pub cancel: Option<CancellationToken>,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            vis_dims: 0,
            seed: 0,
            name: "kmeans".to_string(),
            max_iter: DEFAULT_MAX_ITER,
            cancel: None,
        }
    }
}

impl KMeansParams {
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Sets the metric from its name.
    ///
    /// # Errors
    /// [`ClusterKitError::InvalidParameter`] for an unsupported name.
    pub fn with_metric_name(mut self, metric: &str) -> Result<Self> {
        self.metric = metric.parse()?;
        Ok(self)
    }

    pub fn with_vis_dims(mut self, vis_dims: usize) -> Self {
        self.vis_dims = vis_dims;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Clone)]
struct KMeansModel {
    /// Shape: (k, d_features)
    centroids: Array2<f64>,
    labels: Vec<usize>,
    /// Shape: (n_samples, vis_dims)
    visualization: Option<Array2<f64>>,
    inertia: f64,
    n_iter: usize,
    converged: bool,
}

/// K-means clustering.
///
/// Centroids start at `k` distinct training rows drawn with a seeded
/// [`ChaCha8Rng`], then assignment and mean update alternate until the
/// assignments stop changing or `max_iter` is reached.
///
/// # Examples
///
/// ```
/// use clusterkit::KMeans;
/// use ndarray::array;
///
/// let x = array![[0.0, 0.0], [0.1, 0.2], [10.0, 10.0], [10.2, 9.9]];
/// let mut kmeans = KMeans::with_params(2, "euclidean", 0, 42, "demo").unwrap();
/// let labels = kmeans.fit_predict(x.view()).unwrap();
/// assert_eq!(labels[0], labels[1]);
/// assert_ne!(labels[0], labels[2]);
/// ```
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    params: KMeansParams,
    model: Option<KMeansModel>,
}

impl KMeans {
    /// # Errors
    /// [`ClusterKitError::InvalidParameter`] if `k == 0`, `vis_dims` is not one of
    /// [`SUPPORTED_VIS_DIMS`], or `max_iter == 0`.
    pub fn new(k: usize, params: KMeansParams) -> Result<Self> {
        if k == 0 {
            return Err(ClusterKitError::InvalidParameter(
                "K must be a positive integer".into(),
            ));
        }
        if !SUPPORTED_VIS_DIMS.contains(&params.vis_dims) {
            return Err(ClusterKitError::InvalidParameter(format!(
                "vis_dims must be one of {:?}, got {}",
                SUPPORTED_VIS_DIMS, params.vis_dims
            )));
        }
        if params.max_iter == 0 {
            return Err(ClusterKitError::InvalidParameter(
                "max_iter must be at least 1".into(),
            ));
        }
        Ok(Self { k, params, model: None })
    }

    /// Builds a model from the plain hyperparameter list, parsing the metric name.
    pub fn with_params(
        k: usize,
        metric: &str,
        vis_dims: usize,
        seed: u64,
        name: impl Into<String>,
    ) -> Result<Self> {
        let params = KMeansParams::default()
            .with_metric_name(metric)?
            .with_vis_dims(vis_dims)
            .with_seed(seed)
            .with_name(name);
        Self::new(k, params)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn metric(&self) -> DistanceMetric {
        self.params.metric
    }

    pub fn seed(&self) -> u64 {
        self.params.seed
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn params(&self) -> &KMeansParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Shape: (k, d_features). Row `j` is the centroid of label `j`.
    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.model.as_ref().map(|m| &m.centroids)
    }

    /// Labels of the training rows from the last fit.
    pub fn labels(&self) -> Option<&[usize]> {
        self.model.as_ref().map(|m| m.labels.as_slice())
    }

    /// Projection of the training rows to `vis_dims` dimensions, when enabled.
    pub fn visualization(&self) -> Option<&Array2<f64>> {
        self.model.as_ref().and_then(|m| m.visualization.as_ref())
    }

    /// Sum over training rows of the distance to their centroid.
    pub fn inertia(&self) -> Option<f64> {
        self.model.as_ref().map(|m| m.inertia)
    }

    pub fn n_iter(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.n_iter)
    }

    pub fn converged(&self) -> Option<bool> {
        self.model.as_ref().map(|m| m.converged)
    }

    /// Clusters the rows of `x` and returns one label per row.
    ///
    /// Reaching `max_iter` without convergence is not an error; the labels of
    /// the last centroids are returned and [`KMeans::converged`] reports `false`.
    ///
    /// # Errors
    /// [`ClusterKitError::InvalidInput`] if `x` is empty, holds non-finite values,
    /// has fewer rows than `k`, or has fewer columns (or rows) than the
    /// visualization projection needs. [`ClusterKitError::Cancelled`] if the
    /// cancellation token fires. The previous model is kept on error.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(ClusterKitError::InvalidInput(format!(
                "cannot cluster a {}x{} matrix",
                n_samples, n_features
            )));
        }
        ensure_finite(&x, "KMeans fit")?;
        if n_samples < self.k {
            return Err(ClusterKitError::InvalidInput(format!(
                "K = {} exceeds the {} available samples",
                self.k, n_samples
            )));
        }
        let vis_dims = self.params.vis_dims;
        if vis_dims > 0 && (vis_dims > n_features || n_samples < 2) {
            return Err(ClusterKitError::InvalidInput(format!(
                "a {}-d visualization needs at least {} features and 2 samples, got {}x{}",
                vis_dims, vis_dims, n_samples, n_features
            )));
        }

        let metric = self.params.metric;
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let initial = rand::seq::index::sample(&mut rng, n_samples, self.k).into_vec();
        let mut centroids = x.select(Axis(0), &initial);

        let mut previous: Option<Vec<usize>> = None;
        let mut converged = false;
        let mut n_iter = 0;

        for iteration in 0..self.params.max_iter {
            if self.params.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                info!("[{}] fit cancelled at iteration {}", self.params.name, iteration);
                return Err(ClusterKitError::Cancelled);
            }
            n_iter = iteration + 1;

            let (labels, distances) = nearest_centroids(&x, &centroids.view(), metric);
            if previous.as_ref() == Some(&labels) {
                converged = true;
                break;
            }
            if let Some(prev) = &previous {
                let moved = prev.iter().zip(&labels).filter(|(a, b)| a != b).count();
                debug!("[{}] iteration {}: {} rows changed cluster", self.params.name, iteration, moved);
            }

            centroids = update_centroids(&x, &labels, &distances, self.k, &self.params.name);
            previous = Some(labels);
        }

        if !converged {
            warn!(
                "[{}] K-means did not converge within {} iterations",
                self.params.name, self.params.max_iter
            );
        }

        // Labels must be nearest-centroid labels of the committed centroids.
        let (labels, distances) = nearest_centroids(&x, &centroids.view(), metric);
        let inertia = distances.iter().sum::<f64>();

        let visualization = if vis_dims > 0 {
            let mut pca = PCA::new(NComponents::Count(vis_dims), self.params.name.clone(), None)?;
            Some(pca.fit_transform(x)?)
        } else {
            None
        };

        info!(
            "[{}] K-means (K = {}, metric = {}) finished after {} iterations, converged = {}, inertia = {:.6}",
            self.params.name, self.k, metric, n_iter, converged, inertia
        );

        self.model = Some(KMeansModel {
            centroids,
            labels: labels.clone(),
            visualization,
            inertia,
            n_iter,
            converged,
        });
        Ok(labels)
    }

    /// Same as [`KMeans::fit`].
    pub fn fit_predict(&mut self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        self.fit(x)
    }

    /// Assigns each row of `x` to its nearest fitted centroid. Exact ties go to
    /// the lowest centroid index, as during fitting.
    ///
    /// # Errors
    /// [`ClusterKitError::Unfit`] before `fit`; [`ClusterKitError::InvalidInput`]
    /// on a feature-count mismatch or non-finite values.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        let model = self
            .model
            .as_ref()
            .ok_or(ClusterKitError::Unfit("fit the model before predicting"))?;
        ensure_columns(&x, model.centroids.ncols(), "KMeans predict")?;
        ensure_finite(&x, "KMeans predict")?;
        Ok(nearest_centroids(&x, &model.centroids.view(), self.params.metric).0)
    }
}

/// Index of and distance to the nearest centroid for every row. The strict
/// comparison keeps the lowest index on exact ties.
pub(crate) fn nearest_centroids(
    x: &ArrayView2<'_, f64>,
    centroids: &ArrayView2<'_, f64>,
    metric: DistanceMetric,
) -> (Vec<usize>, Vec<f64>) {
    x.outer_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for (j, centroid) in centroids.outer_iter().enumerate() {
                let d = metric.distance(row, centroid);
                if d < best_distance {
                    best = j;
                    best_distance = d;
                }
            }
            (best, best_distance)
        })
        .unzip()
}

/// Recomputes every centroid as the mean of its rows. A cluster left without
/// rows is reseeded to the row farthest from its nearest centroid; a row is
/// used for at most one reseed per update.
fn update_centroids(
    x: &ArrayView2<'_, f64>,
    labels: &[usize],
    distances: &[f64],
    k: usize,
    name: &str,
) -> Array2<f64> {
    let mut centroids = Array2::<f64>::zeros((k, x.ncols()));
    let mut counts = vec![0usize; k];
    for (row, &label) in x.outer_iter().zip(labels) {
        let mut sum = centroids.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    let mut reseeded = vec![false; x.nrows()];
    for (j, &count) in counts.iter().enumerate() {
        if count > 0 {
            centroids.row_mut(j).mapv_inplace(|v| v / count as f64);
            continue;
        }
        let farthest = distances
            .iter()
            .enumerate()
            .filter(|(i, _)| !reseeded[*i])
            .fold(None, |best: Option<(usize, f64)>, (i, &d)| match best {
                Some((_, best_d)) if best_d >= d => best,
                _ => Some((i, d)),
            });
        if let Some((row, d)) = farthest {
            reseeded[row] = true;
            centroids.row_mut(j).assign(&x.row(row));
            warn!(
                "[{}] cluster {} is empty, reseeded to row {} (distance {:.6})",
                name, j, row, d
            );
        }
    }
    centroids
}
