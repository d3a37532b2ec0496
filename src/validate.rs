// src/validate.rs

use ndarray::ArrayView2;

use crate::error::{ClusterKitError, Result};

/// Rejects matrices holding NaN or infinite entries.
pub(crate) fn ensure_finite(x: &ArrayView2<f64>, context: &str) -> Result<()> {
    if let Some(((row, col), v)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(ClusterKitError::InvalidInput(format!(
            "{}: non-finite value {} at row {}, column {}",
            context, v, row, col
        )));
    }
    Ok(())
}

/// Rejects matrices whose column count differs from the fitted feature count.
pub(crate) fn ensure_columns(x: &ArrayView2<f64>, expected: usize, context: &str) -> Result<()> {
    if x.ncols() != expected {
        return Err(ClusterKitError::InvalidInput(format!(
            "{}: expected {} columns, got {}",
            context,
            expected,
            x.ncols()
        )));
    }
    Ok(())
}
