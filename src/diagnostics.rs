// src/diagnostics.rs

//! Covariance-matrix artifacts emitted while fitting a [`crate::PCA`].
//!
//! With an output directory the matrix is rendered as a coolwarm heat map and
//! written to `cov_mat_{name}.png`. Without one it is shown through the log
//! channel instead, at `debug` level.

use image::{Rgb, RgbImage};
use log::{debug, info};
use ndarray::ArrayView2;
use std::path::{Path, PathBuf};

use crate::error::{ClusterKitError, Result};

/// Smallest edge length, in pixels, of a rendered heat map.
const MIN_IMAGE_EDGE: u32 = 256;

// Endpoints and midpoint of matplotlib's coolwarm map.
const COOL: [f64; 3] = [59.0, 76.0, 192.0];
const MID: [f64; 3] = [221.0, 221.0, 221.0];
const WARM: [f64; 3] = [180.0, 4.0, 38.0];

/// File an artifact for the engine called `name` is written to.
pub fn artifact_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("cov_mat_{}.png", name))
}

fn lerp(a: [f64; 3], b: [f64; 3], t: f64) -> Rgb<u8> {
    let ch = |i: usize| (a[i] + (b[i] - a[i]) * t).round().clamp(0.0, 255.0) as u8;
    Rgb([ch(0), ch(1), ch(2)])
}

/// Maps `t` in [0, 1] onto the coolwarm scale.
fn coolwarm(t: f64) -> Rgb<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    if t < 0.5 {
        lerp(COOL, MID, t * 2.0)
    } else {
        lerp(MID, WARM, (t - 0.5) * 2.0)
    }
}

/// Renders `matrix` as a heat map, one square block of pixels per cell,
/// normalized linearly between the matrix minimum and maximum.
pub fn covariance_heatmap(matrix: &ArrayView2<f64>) -> RgbImage {
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return RgbImage::new(0, 0);
    }
    let longest = rows.max(cols) as u32;
    let cell = (MIN_IMAGE_EDGE / longest).max(1);

    let (lo, hi) = matrix
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;

    RgbImage::from_fn(cols as u32 * cell, rows as u32 * cell, |x, y| {
        let v = matrix[[(y / cell) as usize, (x / cell) as usize]];
        let t = if span > 0.0 { (v - lo) / span } else { 0.5 };
        coolwarm(t)
    })
}

/// Emits the covariance matrix of the engine called `name`.
///
/// Returns the written path when `save_dir` is set, `None` when the matrix was
/// only logged.
///
/// # Errors
/// Returns [`ClusterKitError::Diagnostics`] if the directory cannot be created
/// or the image cannot be encoded.
pub fn emit_covariance_matrix(
    matrix: &ArrayView2<f64>,
    name: &str,
    save_dir: Option<&Path>,
) -> Result<Option<PathBuf>> {
    match save_dir {
        None => {
            debug!(
                "Covariance matrix for {} dataset ({}x{}):\n{:.4}",
                name,
                matrix.nrows(),
                matrix.ncols(),
                matrix
            );
            Ok(None)
        }
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| ClusterKitError::Diagnostics(format!("{}: {}", dir.display(), e)))?;
            let path = artifact_path(dir, name);
            covariance_heatmap(matrix)
                .save(&path)
                .map_err(|e| ClusterKitError::Diagnostics(format!("{}: {}", path.display(), e)))?;
            info!("Saved covariance matrix for {} dataset to {}", name, path.display());
            Ok(Some(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use ndarray::array;
    use std::sync::Mutex;

    #[test]
    fn heatmap_blocks_cover_each_cell() {
        let m = array![[1.0, -1.0], [-1.0, 1.0]];
        let img = covariance_heatmap(&m.view());
        assert_eq!(img.width(), 256);
        assert_eq!(img.height(), 256);
        // Maximum renders warm, minimum renders cool.
        assert_eq!(*img.get_pixel(0, 0), Rgb([180, 4, 38]));
        assert_eq!(*img.get_pixel(255, 0), Rgb([59, 76, 192]));
    }

    #[test]
    fn constant_matrix_renders_midpoint() {
        let m = array![[2.0, 2.0], [2.0, 2.0]];
        let img = covariance_heatmap(&m.view());
        assert_eq!(*img.get_pixel(10, 200), Rgb([221, 221, 221]));
    }

    #[test]
    fn writes_png_named_after_engine() {
        let dir = tempfile::tempdir().unwrap();
        let m = array![[1.0, 0.5], [0.5, 2.0]];
        let written = emit_covariance_matrix(&m.view(), "iris", Some(dir.path()))
            .unwrap()
            .unwrap();
        assert_eq!(written, dir.path().join("cov_mat_iris.png"));
        assert!(written.exists());
    }

    #[test]
    fn without_directory_nothing_is_written() {
        let m = array![[1.0]];
        assert!(emit_covariance_matrix(&m.view(), "x", None).unwrap().is_none());
    }

    /// Records every log line so tests can check the level it was emitted at.
    struct RecordingLogger {
        records: Mutex<Vec<(Level, String)>>,
    }

    impl Log for RecordingLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if let Ok(mut records) = self.records.lock() {
                records.push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: RecordingLogger = RecordingLogger { records: Mutex::new(Vec::new()) };

    #[test]
    fn logged_matrix_body_stays_below_info() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);

        let m = array![[4.0, 1.0], [1.0, 3.0]];
        emit_covariance_matrix(&m.view(), "quiet_channel_check", None).unwrap();

        let records = LOGGER.records.lock().unwrap();
        let ours: Vec<&(Level, String)> = records
            .iter()
            .filter(|(_, msg)| msg.contains("quiet_channel_check"))
            .collect();
        assert!(!ours.is_empty());
        assert!(ours.iter().all(|(level, _)| *level == Level::Debug), "{:?}", ours);
    }
}
