// Principal component analysis, centroid clustering and cluster-count search

#![doc = include_str!("../README.md")]

pub mod datasets;
pub mod diagnostics;
pub mod error;
pub mod kmeans;
pub mod linalg_backends;
pub mod metric;
pub mod optimize;
pub mod pca;
pub mod scoring;
mod validate;


pub use error::{ClusterKitError, Result};
pub use kmeans::{CancellationToken, KMeans, KMeansParams};
pub use metric::DistanceMetric;
pub use optimize::{best_for_k, optimize, optimize_sequential, ClusteringAlgorithm, Goal, ScoringFunction, SearchRecord};
pub use pca::{NComponents, PCA};
pub use scoring::{
    adjusted_rand_score, calinski_harabasz_score, davies_bouldin_score, silhouette_score, ScoreKind,
    UnsupervisedScore,
};
