// Principal component analysis (PCA)

use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use std::path::PathBuf;

use crate::diagnostics::emit_covariance_matrix;
use crate::error::{ClusterKitError, Result};
use crate::linalg_backends::{BackendEigh, BackendSingularValues, NdarrayLinAlgBackend};
use crate::validate::{ensure_columns, ensure_finite};

/// Absolute slack when comparing a cumulative explained-variance ratio with a
/// requested fraction, so a boundary hit up to rounding counts as reached.
const FRACTION_SLACK: f64 = 1e-12;

/// How many principal components a [`PCA`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NComponents {
    /// Exactly this many components (at least 1, at most the feature count).
    Count(usize),
    /// The fewest components whose cumulative explained-variance ratio
    /// reaches this fraction, which must lie strictly between 0 and 1.
    Fraction(f64),
    /// As many components as there are features.
    #[default]
    All,
}

impl NComponents {
    fn validate(&self) -> Result<()> {
        match *self {
            NComponents::Count(0) => Err(ClusterKitError::InvalidParameter(
                "n_components must be at least 1".into(),
            )),
            NComponents::Fraction(f) if !(f.is_finite() && f > 0.0 && f < 1.0) => {
                Err(ClusterKitError::InvalidParameter(format!(
                    "fractional n_components must lie in (0, 1), got {}",
                    f
                )))
            }
            _ => Ok(()),
        }
    }
}

/// State produced by a successful fit. Replaced as a whole on re-fit.
#[derive(Debug, Clone)]
struct PcaModel {
    /// Shape: (d_features)
    mean: Array1<f64>,
    /// Orthonormal rows sorted by explained variance.
    /// Shape: (n_components, d_features)
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    explained_variance_ratio: Array1<f64>,
    singular_values: Array1<f64>,
    n_components: usize,
}

/// Principal component analysis (PCA) structure.
///
/// Fits an orthogonal basis to a data matrix via the eigendecomposition of
/// its scatter matrix `Xcᵀ·Xc` (d × d, where `Xc` is the mean-centered data)
/// and projects data onto it.
///
/// # Examples
///
/// ```
/// use clusterkit::{NComponents, PCA};
/// use ndarray::array;
///
/// let x = array![[1.0, 2.0], [3.0, 4.1], [5.0, 5.9]];
/// let mut pca = PCA::new(NComponents::Count(1), "demo", None).unwrap();
/// let projected = pca.fit_transform(x.view()).unwrap();
/// assert_eq!(projected.dim(), (3, 1));
/// ```
#[derive(Debug, Clone)]
pub struct PCA {
    n_components: NComponents,
    name: String,
    fig_save_path: Option<PathBuf>,
    model: Option<PcaModel>,
}

impl PCA {
    /// Creates an unfitted PCA.
    ///
    /// * `n_components` - number of components to keep, see [`NComponents`].
    /// * `name` - identifies the dataset in diagnostic artifacts and log lines.
    /// * `fig_save_path` - directory receiving the covariance heat map. If `None`,
    ///   the covariance matrix is logged at `debug` level instead of saved.
    ///
    /// # Errors
    /// [`ClusterKitError::InvalidParameter`] for `Count(0)` or a fraction outside (0, 1).
    pub fn new(
        n_components: NComponents,
        name: impl Into<String>,
        fig_save_path: Option<PathBuf>,
    ) -> Result<Self> {
        n_components.validate()?;
        Ok(Self {
            n_components,
            name: name.into(),
            fig_save_path,
            model: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Mean vector of the training data. Shape: (d_features)
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.model.as_ref().map(|m| &m.mean)
    }

    /// Principal axes as rows. Shape: (n_components, d_features)
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.model.as_ref().map(|m| &m.components)
    }

    /// Variance captured by each kept component.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.model.as_ref().map(|m| &m.explained_variance)
    }

    /// Fraction of the total variance captured by each kept component.
    /// Sums to 1 when every component is kept.
    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.model.as_ref().map(|m| &m.explained_variance_ratio)
    }

    /// Singular values of the covariance matrix (equal to its eigenvalues) for
    /// each kept component. `explained_variance` is their square over `n - 1`.
    pub fn singular_values(&self) -> Option<&Array1<f64>> {
        self.model.as_ref().map(|m| &m.singular_values)
    }

    /// The resolved number of components.
    pub fn n_components(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.n_components)
    }

    /// Fits the model with `x` (n_samples × d_features) and returns `self` for chaining.
    ///
    /// The covariance matrix is emitted to the diagnostic channel on the way;
    /// a failure there is logged and otherwise ignored.
    ///
    /// # Errors
    /// [`ClusterKitError::InvalidInput`] if `x` has fewer than 2 rows, no columns,
    /// non-finite values, or fewer features than an exact `n_components` asks
    /// for. [`ClusterKitError::Linalg`] if the eigendecomposition fails.
    /// On error any previously fitted state is kept.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>) -> Result<&mut Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples < 2 {
            return Err(ClusterKitError::InvalidInput(format!(
                "PCA needs at least 2 samples, got {}",
                n_samples
            )));
        }
        if n_features == 0 {
            return Err(ClusterKitError::InvalidInput("PCA input has no features".into()));
        }
        ensure_finite(&x, "PCA fit")?;

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| ClusterKitError::InvalidInput("failed to compute feature means".into()))?;
        let centered = &x - &mean;
        let cov_matrix = centered.t().dot(&centered);

        if let Err(e) = emit_covariance_matrix(
            &cov_matrix.view(),
            &self.name,
            self.fig_save_path.as_deref(),
        ) {
            warn!("[{}] {}", self.name, e);
        }

        let eig = NdarrayLinAlgBackend.eigh_upper(&cov_matrix)?;

        // Descending by eigenvalue; sort_by is stable so ties keep solver order.
        let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

        let eigenvalues: Array1<f64> = order.iter().map(|&i| eig.eigenvalues[i].max(0.0)).collect();
        let mut components = Array2::<f64>::zeros((order.len(), n_features));
        for (row, &col) in order.iter().enumerate() {
            let mut axis = components.row_mut(row);
            axis.assign(&eig.eigenvectors.column(col));
            // Largest-magnitude entry positive, so output does not depend on solver sign choices.
            let pivot = axis
                .iter()
                .copied()
                .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
            if pivot < 0.0 {
                axis.mapv_inplace(|v| -v);
            }
        }

        match NdarrayLinAlgBackend.singular_values(&cov_matrix) {
            Ok(s) => {
                let deviation = s
                    .iter()
                    .zip(eigenvalues.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0_f64, f64::max);
                debug!(
                    "[{}] SVD of covariance agrees with eigenvalues within {:.3e}",
                    self.name, deviation
                );
            }
            Err(e) => warn!("[{}] SVD cross-check of covariance failed: {}", self.name, e),
        }

        // The covariance is symmetric PSD, so its singular values are its eigenvalues.
        let singular_values = eigenvalues;
        let explained_variance = singular_values.mapv(|s| s * s / (n_samples - 1) as f64);
        let total_variance = explained_variance.sum();
        let explained_variance_ratio = if total_variance > 0.0 {
            &explained_variance / total_variance
        } else {
            warn!("[{}] input has zero total variance", self.name);
            Array1::zeros(explained_variance.len())
        };

        let k = match self.n_components {
            NComponents::Count(k) if k > n_features => {
                return Err(ClusterKitError::InvalidInput(format!(
                    "n_components = {} exceeds the {} input features",
                    k, n_features
                )));
            }
            NComponents::Count(k) => k,
            NComponents::Fraction(threshold) => {
                resolve_fraction(explained_variance_ratio.view(), threshold)
            }
            NComponents::All => n_features,
        };

        info!(
            "[{}] PCA fit on {}x{} matrix, keeping {} of {} components",
            self.name, n_samples, n_features, k, n_features
        );

        self.model = Some(PcaModel {
            mean,
            components: components.slice(s![..k, ..]).to_owned(),
            explained_variance: explained_variance.slice(s![..k]).to_owned(),
            explained_variance_ratio: explained_variance_ratio.slice(s![..k]).to_owned(),
            singular_values: singular_values.slice(s![..k]).to_owned(),
            n_components: k,
        });
        Ok(self)
    }

    /// Projects `x` onto the principal axes. Shape: (n_samples, n_components)
    ///
    /// # Errors
    /// [`ClusterKitError::Unfit`] before `fit`; [`ClusterKitError::InvalidInput`]
    /// on a feature-count mismatch or non-finite values.
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let model = self
            .model
            .as_ref()
            .ok_or(ClusterKitError::Unfit("fit the PCA before running a transformation"))?;
        ensure_columns(&x, model.mean.len(), "PCA transform")?;
        ensure_finite(&x, "PCA transform")?;
        Ok((&x - &model.mean).dot(&model.components.t()))
    }

    /// Fits with `x`, then projects the same `x`.
    pub fn fit_transform(&mut self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Maps projected data back to feature space as `x · components + mean`.
    ///
    /// Exact when every component was kept, lossy otherwise.
    ///
    /// # Errors
    /// [`ClusterKitError::Unfit`] before `fit`; [`ClusterKitError::InvalidInput`]
    /// if `x` does not have `n_components` columns or holds non-finite values.
    pub fn inverse_transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let model = self
            .model
            .as_ref()
            .ok_or(ClusterKitError::Unfit("fit the PCA before running a transformation"))?;
        ensure_columns(&x, model.n_components, "PCA inverse_transform")?;
        ensure_finite(&x, "PCA inverse_transform")?;
        Ok(x.dot(&model.components) + &model.mean)
    }
}

/// Smallest component count whose cumulative ratio reaches `threshold`,
/// i.e. a left `searchsorted` on the cumulative sum plus one. Falls back to
/// keeping every component when the threshold is never reached.
pub(crate) fn resolve_fraction(ratio: ndarray::ArrayView1<'_, f64>, threshold: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, r) in ratio.iter().enumerate() {
        cumulative += r;
        if cumulative + FRACTION_SLACK >= threshold {
            return i + 1;
        }
    }
    ratio.len()
}
