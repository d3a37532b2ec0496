// src/metric.rs

use ndarray::ArrayView1;
use std::fmt;
use std::str::FromStr;

use crate::error::ClusterKitError;

/// Distance used by [`crate::KMeans`] to assign rows to centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    /// `1 - cos(a, b)`. A zero vector is at distance 1 from any non-zero
    /// vector and at distance 0 from another zero vector.
    Cosine,
}

impl DistanceMetric {
    pub const SUPPORTED: [&'static str; 3] = ["euclidean", "manhattan", "cosine"];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::Cosine => "cosine",
        }
    }

    pub fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Cosine => {
                let norm_a = a.dot(&a).sqrt();
                let norm_b = b.dot(&b).sqrt();
                match (norm_a > 0.0, norm_b > 0.0) {
                    (false, false) => 0.0,
                    (true, true) => {
                        let cos = (a.dot(&b) / (norm_a * norm_b)).clamp(-1.0, 1.0);
                        1.0 - cos
                    }
                    _ => 1.0,
                }
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = ClusterKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "manhattan" => Ok(DistanceMetric::Manhattan),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(ClusterKitError::InvalidParameter(format!(
                "unsupported metric '{}', expected one of {:?}",
                other,
                DistanceMetric::SUPPORTED
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn distances_on_simple_vectors() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert_abs_diff_eq!(DistanceMetric::Euclidean.distance(a.view(), b.view()), 5.0);
        assert_abs_diff_eq!(DistanceMetric::Manhattan.distance(a.view(), b.view()), 7.0);
    }

    #[test]
    fn cosine_handles_direction_and_zero_vectors() {
        let x = array![1.0, 0.0];
        let y = array![0.0, 2.0];
        let z = array![0.0, 0.0];
        assert_abs_diff_eq!(DistanceMetric::Cosine.distance(x.view(), (&x * 5.0).view()), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(DistanceMetric::Cosine.distance(x.view(), y.view()), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(DistanceMetric::Cosine.distance(x.view(), (-&x).view()), 2.0, epsilon = 1e-12);
        assert_eq!(DistanceMetric::Cosine.distance(x.view(), z.view()), 1.0);
        assert_eq!(DistanceMetric::Cosine.distance(z.view(), z.view()), 0.0);
    }

    #[test]
    fn parses_supported_names_only() {
        assert_eq!("Euclidean".parse::<DistanceMetric>().unwrap(), DistanceMetric::Euclidean);
        assert_eq!("manhattan".parse::<DistanceMetric>().unwrap(), DistanceMetric::Manhattan);
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert!(matches!(
            "mahalanobis".parse::<DistanceMetric>(),
            Err(ClusterKitError::InvalidParameter(_))
        ));
    }
}
