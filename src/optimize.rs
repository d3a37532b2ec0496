// src/optimize.rs

//! Cluster-count search: fit a fresh model for every candidate `k`, score
//! each labelling, and rank the candidates best-first.

use log::{debug, info};
use ndarray::ArrayView2;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ClusterKitError, Result};
use crate::kmeans::{KMeans, KMeansParams};

/// A clustering algorithm the search driver can instantiate per candidate `k`.
pub trait ClusteringAlgorithm: Sized + Send {
    /// Every hyperparameter except the cluster count.
    type Params: Clone + Send + Sync;

    fn build(k: usize, params: &Self::Params) -> Result<Self>;

    fn fit_predict(&mut self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>>;
}

impl ClusteringAlgorithm for KMeans {
    type Params = KMeansParams;

    fn build(k: usize, params: &KMeansParams) -> Result<Self> {
        KMeans::new(k, params.clone())
    }

    fn fit_predict(&mut self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        KMeans::fit_predict(self, x)
    }
}

/// Quality metric for a labelling. Whatever else the metric needs (the
/// feature matrix, ground-truth labels) is captured by the implementor.
pub trait ScoringFunction: Sync {
    fn score(&self, labels: &[usize]) -> Result<f64>;
}

impl<F> ScoringFunction for F
where
    F: Fn(&[usize]) -> Result<f64> + Sync,
{
    fn score(&self, labels: &[usize]) -> Result<f64> {
        self(labels)
    }
}

/// Direction in which scores are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Minimize,
    Maximize,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Minimize => f.write_str("minimize"),
            Goal::Maximize => f.write_str("maximize"),
        }
    }
}

impl FromStr for Goal {
    type Err = ClusterKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "minimize" => Ok(Goal::Minimize),
            "maximize" => Ok(Goal::Maximize),
            other => Err(ClusterKitError::InvalidParameter(format!(
                "goal must be 'minimize' or 'maximize', got '{}'",
                other
            ))),
        }
    }
}

/// Outcome of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRecord {
    pub k: usize,
    pub prediction: Vec<usize>,
    pub score: f64,
}

fn evaluate_candidate<A, S>(
    x: ArrayView2<'_, f64>,
    k: usize,
    algorithm_params: &A::Params,
    metric: &S,
) -> Result<SearchRecord>
where
    A: ClusteringAlgorithm,
    S: ScoringFunction + ?Sized,
{
    let mut model = A::build(k, algorithm_params)?;
    let prediction = model.fit_predict(x)?;
    let score = metric
        .score(&prediction)
        .map_err(|e| ClusterKitError::Scoring { k, source: Box::new(e) })?;
    if score.is_nan() {
        return Err(ClusterKitError::Scoring {
            k,
            source: Box::new(ClusterKitError::InvalidInput("score is NaN".into())),
        });
    }
    debug!("k = {}: score = {}", k, score);
    Ok(SearchRecord { k, prediction, score })
}

/// Stable sort, best first. Equal scores keep candidate order.
fn rank(mut records: Vec<SearchRecord>, goal: Goal) -> Vec<SearchRecord> {
    records.sort_by(|a, b| match goal {
        Goal::Minimize => a.score.total_cmp(&b.score),
        Goal::Maximize => b.score.total_cmp(&a.score),
    });
    records
}

/// Fits algorithm `A` once per entry of `k_values`, scores each labelling with
/// `metric`, and returns every record ranked best-first under `goal`.
///
/// Candidates are evaluated in parallel on the rayon pool, each with its own
/// model; records are matched to their `k` by position, so the ranking does
/// not depend on completion order. An empty `k_values` gives an empty result.
///
/// # Errors
/// The failure of the earliest failing candidate in `k_values` order
/// (construction, fit, or [`ClusterKitError::Scoring`]), the same error
/// [`optimize_sequential`] returns. Candidates after a known failure are not
/// started; every candidate before it still runs, so the returned error does
/// not depend on scheduling.
pub fn optimize<A, S>(
    x: ArrayView2<'_, f64>,
    algorithm_params: &A::Params,
    metric: &S,
    k_values: &[usize],
    goal: Goal,
) -> Result<Vec<SearchRecord>>
where
    A: ClusteringAlgorithm,
    S: ScoringFunction + ?Sized,
{
    // Position of the earliest failed candidate seen so far.
    let first_failure = AtomicUsize::new(usize::MAX);
    let outcomes: Vec<Option<Result<SearchRecord>>> = k_values
        .par_iter()
        .enumerate()
        .map(|(position, &k)| {
            if position > first_failure.load(Ordering::Relaxed) {
                return None;
            }
            let outcome = evaluate_candidate::<A, S>(x, k, algorithm_params, metric);
            if outcome.is_err() {
                first_failure.fetch_min(position, Ordering::Relaxed);
            }
            Some(outcome)
        })
        .collect();

    let mut records = Vec::with_capacity(k_values.len());
    for outcome in outcomes.into_iter().flatten() {
        records.push(outcome?);
    }

    let ranked = rank(records, goal);
    if let Some(best) = ranked.first() {
        info!(
            "Searched {} candidates ({}), best k = {} with score {}",
            ranked.len(),
            goal,
            best.k,
            best.score
        );
    }
    Ok(ranked)
}

/// [`optimize`] on the calling thread, stopping at the first failing candidate.
pub fn optimize_sequential<A, S>(
    x: ArrayView2<'_, f64>,
    algorithm_params: &A::Params,
    metric: &S,
    k_values: &[usize],
    goal: Goal,
) -> Result<Vec<SearchRecord>>
where
    A: ClusteringAlgorithm,
    S: ScoringFunction + ?Sized,
{
    let mut records = Vec::with_capacity(k_values.len());
    for &k in k_values {
        records.push(evaluate_candidate::<A, S>(x, k, algorithm_params, metric)?);
    }
    Ok(rank(records, goal))
}

/// The record for cluster count `k`, e.g. to compare against a known class count.
pub fn best_for_k(records: &[SearchRecord], k: usize) -> Option<&SearchRecord> {
    records.iter().find(|r| r.k == k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Scores a labelling by its number of distinct labels.
    fn distinct_labels(labels: &[usize]) -> Result<f64> {
        let mut seen = labels.to_vec();
        seen.sort_unstable();
        seen.dedup();
        Ok(seen.len() as f64)
    }

    fn data() -> ndarray::Array2<f64> {
        array![[0.0], [0.1], [5.0], [5.1], [10.0], [10.1], [15.0], [15.1]]
    }

    #[test]
    fn goal_parses_both_directions() {
        assert_eq!("minimize".parse::<Goal>().unwrap(), Goal::Minimize);
        assert_eq!("Maximize".parse::<Goal>().unwrap(), Goal::Maximize);
        assert!(matches!("best".parse::<Goal>(), Err(ClusterKitError::InvalidParameter(_))));
    }

    #[test]
    fn rank_is_stable_for_equal_scores() {
        let records: Vec<SearchRecord> = [(2, 1.0), (3, 0.5), (4, 1.0), (5, 0.5)]
            .iter()
            .map(|&(k, score)| SearchRecord { k, prediction: vec![], score })
            .collect();
        let ks = |v: Vec<SearchRecord>| v.into_iter().map(|r| r.k).collect::<Vec<_>>();
        assert_eq!(ks(rank(records.clone(), Goal::Minimize)), vec![3, 5, 2, 4]);
        assert_eq!(ks(rank(records, Goal::Maximize)), vec![2, 4, 3, 5]);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let x = data();
        let params = KMeansParams::default().with_seed(9);
        let k_values = [2, 3, 4];
        let par = optimize::<KMeans, _>(x.view(), &params, &distinct_labels, &k_values, Goal::Maximize).unwrap();
        let seq =
            optimize_sequential::<KMeans, _>(x.view(), &params, &distinct_labels, &k_values, Goal::Maximize).unwrap();
        assert_eq!(par, seq);
        assert_eq!(par[0].k, 4);
    }

    #[test]
    fn nan_score_is_a_scoring_failure() {
        let x = data();
        let nan = |_: &[usize]| -> Result<f64> { Ok(f64::NAN) };
        let err = optimize::<KMeans, _>(x.view(), &KMeansParams::default(), &nan, &[2], Goal::Minimize)
            .unwrap_err();
        assert!(matches!(err, ClusterKitError::Scoring { k: 2, .. }));
    }

    #[test]
    fn best_for_k_finds_matching_record() {
        let records = vec![
            SearchRecord { k: 3, prediction: vec![0], score: 1.0 },
            SearchRecord { k: 2, prediction: vec![1], score: 2.0 },
        ];
        assert_eq!(best_for_k(&records, 2).map(|r| r.score), Some(2.0));
        assert!(best_for_k(&records, 7).is_none());
    }
}
