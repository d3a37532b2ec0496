// src/error.rs

use thiserror::Error;

/// Boxed error used inside the linear-algebra backend seam, so backend
/// failures can cross thread boundaries.
pub type ThreadSafeStdError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the decomposition engine, the clustering engine and
/// the search driver.
#[derive(Debug, Error)]
pub enum ClusterKitError {
    /// A constructor argument was rejected. Raised at construction, never at fit time.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A model was used before `fit`.
    #[error("model is not fitted: {0}")]
    Unfit(&'static str),

    /// The data handed to an operation cannot be used (non-finite values,
    /// too few samples, shape mismatch). Fitted state is left untouched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The scoring function failed for candidate `k` during a search sweep.
    #[error("scoring failed for k = {k}: {source}")]
    Scoring {
        k: usize,
        #[source]
        source: Box<ClusterKitError>,
    },

    #[error("linear algebra backend failure: {0}")]
    Linalg(String),

    #[error("diagnostic artifact could not be written: {0}")]
    Diagnostics(String),

    #[error("operation was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ClusterKitError>;

impl From<ThreadSafeStdError> for ClusterKitError {
    fn from(e: ThreadSafeStdError) -> Self {
        ClusterKitError::Linalg(e.to_string())
    }
}
