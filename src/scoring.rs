// src/scoring.rs

//! Clustering quality metrics that plug into [`crate::optimize`].

use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::{ClusterKitError, Result};
use crate::metric::DistanceMetric;
use crate::optimize::{Goal, ScoringFunction};

/// Maps arbitrary label values onto `0..n_labels`, keeping their sort order.
fn compact_labels(labels: &[usize]) -> (Vec<usize>, usize) {
    let order: BTreeMap<usize, usize> = labels
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, l)| (l, i))
        .collect();
    (labels.iter().map(|l| order[l]).collect(), order.len())
}

fn check_labelling(x: &ArrayView2<'_, f64>, labels: &[usize], score: &str) -> Result<(Vec<usize>, usize)> {
    if labels.len() != x.nrows() {
        return Err(ClusterKitError::InvalidInput(format!(
            "{}: {} labels for {} samples",
            score,
            labels.len(),
            x.nrows()
        )));
    }
    let (compact, n_labels) = compact_labels(labels);
    if n_labels < 2 || n_labels > x.nrows().saturating_sub(1) {
        return Err(ClusterKitError::InvalidInput(format!(
            "{}: number of labels is {}, valid values are 2 to n_samples - 1 ({})",
            score,
            n_labels,
            x.nrows().saturating_sub(1)
        )));
    }
    Ok((compact, n_labels))
}

/// Per-cluster means and sizes. Shape of the means: (n_labels, d_features)
fn cluster_means(x: &ArrayView2<'_, f64>, labels: &[usize], n_labels: usize) -> (Array2<f64>, Vec<usize>) {
    let mut means = Array2::<f64>::zeros((n_labels, x.ncols()));
    let mut sizes = vec![0usize; n_labels];
    for (row, &l) in x.outer_iter().zip(labels) {
        let mut m = means.row_mut(l);
        m += &row;
        sizes[l] += 1;
    }
    for (mut m, &size) in means.outer_iter_mut().zip(&sizes) {
        m.mapv_inplace(|v| v / size as f64);
    }
    (means, sizes)
}

/// Variance ratio criterion: between-cluster over within-cluster dispersion,
/// each normalized by its degrees of freedom. Higher is better.
///
/// # Errors
/// [`ClusterKitError::InvalidInput`] unless there are between 2 and
/// `n_samples - 1` distinct labels, one per row.
pub fn calinski_harabasz_score(x: ArrayView2<'_, f64>, labels: &[usize]) -> Result<f64> {
    let (labels, n_labels) = check_labelling(&x, labels, "calinski_harabasz_score")?;
    let n_samples = x.nrows();
    let overall: Array1<f64> = x
        .mean_axis(Axis(0))
        .ok_or_else(|| ClusterKitError::InvalidInput("empty input".into()))?;
    let (means, sizes) = cluster_means(&x, &labels, n_labels);

    let extra: f64 = means
        .outer_iter()
        .zip(&sizes)
        .map(|(m, &size)| size as f64 * (&m - &overall).mapv(|v| v * v).sum())
        .sum();
    let intra: f64 = x
        .outer_iter()
        .zip(&labels)
        .map(|(row, &l)| (&row - &means.row(l)).mapv(|v| v * v).sum())
        .sum();

    if intra == 0.0 {
        return Ok(1.0);
    }
    Ok(extra * (n_samples - n_labels) as f64 / (intra * (n_labels - 1) as f64))
}

/// Mean over clusters of the worst ratio of summed intra-cluster spread to
/// centroid separation. Lower is better, 0 is the minimum.
///
/// # Errors
/// Same conditions as [`calinski_harabasz_score`].
pub fn davies_bouldin_score(x: ArrayView2<'_, f64>, labels: &[usize]) -> Result<f64> {
    let (labels, n_labels) = check_labelling(&x, labels, "davies_bouldin_score")?;
    let euclidean = DistanceMetric::Euclidean;
    let (means, sizes) = cluster_means(&x, &labels, n_labels);

    let mut spread = vec![0.0; n_labels];
    for (row, &l) in x.outer_iter().zip(&labels) {
        spread[l] += euclidean.distance(row, means.row(l));
    }
    for (s, &size) in spread.iter_mut().zip(&sizes) {
        *s /= size as f64;
    }

    let total: f64 = (0..n_labels)
        .map(|i| {
            (0..n_labels)
                .filter(|&j| j != i)
                .map(|j| {
                    let separation = euclidean.distance(means.row(i), means.row(j));
                    if separation == 0.0 {
                        0.0
                    } else {
                        (spread[i] + spread[j]) / separation
                    }
                })
                .fold(0.0, f64::max)
        })
        .sum();
    Ok(total / n_labels as f64)
}

/// Mean silhouette coefficient under `metric`. Rows alone in their cluster
/// contribute 0. Ranges from -1 to 1, higher is better.
///
/// # Errors
/// Same conditions as [`calinski_harabasz_score`].
pub fn silhouette_score(x: ArrayView2<'_, f64>, labels: &[usize], metric: DistanceMetric) -> Result<f64> {
    let (labels, n_labels) = check_labelling(&x, labels, "silhouette_score")?;
    let n_samples = x.nrows();
    let mut sizes = vec![0usize; n_labels];
    for &l in &labels {
        sizes[l] += 1;
    }

    let mut total = 0.0;
    for i in 0..n_samples {
        let own = labels[i];
        if sizes[own] == 1 {
            continue;
        }
        let mut sums = vec![0.0; n_labels];
        for j in 0..n_samples {
            if i != j {
                sums[labels[j]] += metric.distance(x.row(i), x.row(j));
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..n_labels)
            .filter(|&c| c != own)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    Ok(total / n_samples as f64)
}

fn pairs(n: usize) -> f64 {
    (n as f64) * (n as f64 - 1.0) / 2.0
}

/// Rand index adjusted for chance between a reference labelling and a
/// predicted one. 1 for identical partitions (up to renaming), around 0 for
/// random ones.
///
/// # Errors
/// [`ClusterKitError::InvalidInput`] if the two labellings differ in length.
pub fn adjusted_rand_score(labels_true: &[usize], labels_pred: &[usize]) -> Result<f64> {
    if labels_true.len() != labels_pred.len() {
        return Err(ClusterKitError::InvalidInput(format!(
            "adjusted_rand_score: {} reference labels vs {} predicted",
            labels_true.len(),
            labels_pred.len()
        )));
    }
    let n = labels_true.len();
    if n < 2 {
        return Ok(1.0);
    }
    let (t, n_true) = compact_labels(labels_true);
    let (p, n_pred) = compact_labels(labels_pred);
    let mut contingency = Array2::<usize>::zeros((n_true, n_pred));
    for (&a, &b) in t.iter().zip(&p) {
        contingency[[a, b]] += 1;
    }

    let index: f64 = contingency.iter().map(|&c| pairs(c)).sum();
    let sum_rows: f64 = contingency.sum_axis(Axis(1)).iter().map(|&c| pairs(c)).sum();
    let sum_cols: f64 = contingency.sum_axis(Axis(0)).iter().map(|&c| pairs(c)).sum();
    let expected = sum_rows * sum_cols / pairs(n);
    let max_index = (sum_rows + sum_cols) / 2.0;
    if max_index == expected {
        return Ok(1.0);
    }
    Ok((index - expected) / (max_index - expected))
}

/// Internal (label-only) clustering criteria selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    CalinskiHarabasz,
    DaviesBouldin,
    Silhouette(DistanceMetric),
}

impl ScoreKind {
    /// The ranking direction under which this score's best value comes first.
    pub fn natural_goal(&self) -> Goal {
        match self {
            ScoreKind::DaviesBouldin => Goal::Minimize,
            ScoreKind::CalinskiHarabasz | ScoreKind::Silhouette(_) => Goal::Maximize,
        }
    }
}

impl FromStr for ScoreKind {
    type Err = ClusterKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "calinski_harabasz_score" => Ok(ScoreKind::CalinskiHarabasz),
            "davies_bouldin_score" => Ok(ScoreKind::DaviesBouldin),
            "silhouette_score" => Ok(ScoreKind::Silhouette(DistanceMetric::Euclidean)),
            other => Err(ClusterKitError::InvalidParameter(format!("unknown score '{}'", other))),
        }
    }
}

/// Scores labellings of a fixed feature matrix with one of the internal criteria.
#[derive(Debug, Clone)]
pub struct UnsupervisedScore<'a> {
    pub x: ArrayView2<'a, f64>,
    pub kind: ScoreKind,
}

impl<'a> UnsupervisedScore<'a> {
    pub fn new(x: ArrayView2<'a, f64>, kind: ScoreKind) -> Self {
        Self { x, kind }
    }
}

impl ScoringFunction for UnsupervisedScore<'_> {
    fn score(&self, labels: &[usize]) -> Result<f64> {
        match self.kind {
            ScoreKind::CalinskiHarabasz => calinski_harabasz_score(self.x, labels),
            ScoreKind::DaviesBouldin => davies_bouldin_score(self.x, labels),
            ScoreKind::Silhouette(metric) => silhouette_score(self.x, labels, metric),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [10.0, 10.0], [10.0, 11.0], [11.0, 10.0]]
    }

    #[test]
    fn calinski_harabasz_by_hand() {
        let x = array![[0.0], [2.0], [10.0], [12.0]];
        // extra = 2 * 25 + 2 * 25 = 100, intra = 4, (100 * 2) / (4 * 1) = 50
        let score = calinski_harabasz_score(x.view(), &[0, 0, 1, 1]).unwrap();
        assert_abs_diff_eq!(score, 50.0, epsilon = 1e-12);
    }

    #[test]
    fn calinski_harabasz_rejects_single_cluster() {
        let x = two_blobs();
        assert!(matches!(
            calinski_harabasz_score(x.view(), &[0; 6]),
            Err(ClusterKitError::InvalidInput(_))
        ));
        assert!(matches!(
            calinski_harabasz_score(x.view(), &[0, 1, 2, 3, 4, 5]),
            Err(ClusterKitError::InvalidInput(_))
        ));
    }

    #[test]
    fn davies_bouldin_by_hand() {
        let x = array![[0.0], [2.0], [10.0], [12.0]];
        // spread 1 in both clusters, separation 10 -> (1 + 1) / 10
        let score = davies_bouldin_score(x.view(), &[0, 0, 1, 1]).unwrap();
        assert_abs_diff_eq!(score, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn silhouette_prefers_true_partition() {
        let x = two_blobs();
        let good = silhouette_score(x.view(), &[0, 0, 0, 1, 1, 1], DistanceMetric::Euclidean).unwrap();
        let bad = silhouette_score(x.view(), &[0, 1, 0, 1, 0, 1], DistanceMetric::Euclidean).unwrap();
        assert!(good > 0.8, "{}", good);
        assert!(bad < 0.0, "{}", bad);
    }

    #[test]
    fn label_values_need_not_be_contiguous() {
        let x = two_blobs();
        let a = calinski_harabasz_score(x.view(), &[0, 0, 0, 1, 1, 1]).unwrap();
        let b = calinski_harabasz_score(x.view(), &[7, 7, 7, 3, 3, 3]).unwrap();
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn adjusted_rand_is_invariant_to_renaming() {
        assert_abs_diff_eq!(adjusted_rand_score(&[0, 0, 1, 1], &[1, 1, 0, 0]).unwrap(), 1.0);
        assert_abs_diff_eq!(adjusted_rand_score(&[0, 0, 0, 0], &[0, 0, 0, 0]).unwrap(), 1.0);
        // Known value: sklearn gives -0.5 for this pair.
        assert_abs_diff_eq!(
            adjusted_rand_score(&[0, 0, 1, 1], &[0, 1, 0, 1]).unwrap(),
            -0.5,
            epsilon = 1e-12
        );
        assert!(adjusted_rand_score(&[0, 1], &[0]).is_err());
    }

    #[test]
    fn score_kind_names_and_goals() {
        assert_eq!("calinski_harabasz_score".parse::<ScoreKind>().unwrap(), ScoreKind::CalinskiHarabasz);
        assert_eq!("davies_bouldin_score".parse::<ScoreKind>().unwrap().natural_goal(), Goal::Minimize);
        assert!("v_measure".parse::<ScoreKind>().is_err());
    }
}
