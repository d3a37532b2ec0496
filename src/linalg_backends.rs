// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh as NdLinalgEigh, SVD as NdLinalgSVD, UPLO};

use crate::error::ThreadSafeStdError;

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput {
    /// Eigenvalues in the order the solver produced them (ascending for LAPACK).
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors as columns: `eigenvectors.column(i)` belongs to `eigenvalues[i]`.
    pub eigenvectors: Array2<f64>,
}

/// Symmetric eigendecomposition (LAPACK DSYEVD-style). Only the upper
/// triangle of `matrix` is read.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError>;
}

/// Singular values only; the vectors are never needed by callers here.
pub trait BackendSingularValues {
    fn singular_values(&self, matrix: &Array2<f64>) -> Result<Array1<f64>, ThreadSafeStdError>;
}

/// Backend built on `ndarray-linalg`. The LAPACK provider behind it
/// (OpenBLAS or MKL, static or system) is chosen with cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

fn ensure_square(matrix: &Array2<f64>) -> Result<(), ThreadSafeStdError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(format!(
            "Matrix must be square, got {}x{}.",
            matrix.nrows(),
            matrix.ncols()
        )
        .into());
    }
    Ok(())
}

impl BackendEigh for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput, ThreadSafeStdError> {
        ensure_square(matrix)?;
        if matrix.is_empty() {
            return Ok(EighOutput {
                eigenvalues: Array1::zeros(0),
                eigenvectors: Array2::zeros((0, 0)),
            });
        }
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendSingularValues for NdarrayLinAlgBackend {
    fn singular_values(&self, matrix: &Array2<f64>) -> Result<Array1<f64>, ThreadSafeStdError> {
        if matrix.is_empty() {
            return Ok(Array1::zeros(0));
        }
        let (_, s, _) = matrix.svd(false, false).map_err(to_dyn_error)?;
        Ok(s)
    }
}
