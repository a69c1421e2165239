//! Per-dimension z-score standardization.
//!
//! Fit once on a training corpus and frozen thereafter. The same statistics
//! are applied at inference, during offline training and in the online
//! adapter.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Mean and standard deviation for each dimension of a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl Standardizer {
    /// Fit population statistics (ddof = 0) over the rows of `samples`.
    ///
    /// Sums are accumulated in `f64` and rounded once to `f32`.
    ///
    /// # Errors
    /// `NumericGuard` if any column is constant; `InsufficientData` if
    /// `samples` has no rows.
    pub fn fit(samples: &Array2<f32>) -> Result<Self> {
        let n = samples.nrows();
        if n == 0 {
            return Err(ForecastError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let mut mean = Array1::<f32>::zeros(samples.ncols());
        let mut std = Array1::<f32>::zeros(samples.ncols());

        for (dim, column) in samples.axis_iter(Axis(1)).enumerate() {
            let mu = column.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
            let var = column
                .iter()
                .map(|&x| {
                    let d = x as f64 - mu;
                    d * d
                })
                .sum::<f64>()
                / n as f64;
            let sigma = var.sqrt() as f32;
            if sigma <= 0.0 || !sigma.is_finite() {
                return Err(ForecastError::NumericGuard { dimension: dim });
            }
            mean[dim] = mu as f32;
            std[dim] = sigma;
        }

        Ok(Self { mean, std })
    }

    /// Rebuild a standardizer from exported statistics.
    pub fn from_parts(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        ForecastError::check_len("scaler std", mean.len(), std.len())?;
        if let Some(dimension) = std.iter().position(|s| *s <= 0.0 || !s.is_finite()) {
            return Err(ForecastError::NumericGuard { dimension });
        }
        Ok(Self {
            mean: Array1::from(mean),
            std: Array1::from(std),
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f32> {
        &self.mean
    }

    pub fn std(&self) -> &Array1<f32> {
        &self.std
    }

    /// Elementwise `(x - mean) / std`.
    pub fn transform(&self, values: ArrayView1<f32>) -> Array1<f32> {
        (&values - &self.mean) / &self.std
    }

    /// Elementwise `x * std + mean`.
    pub fn inverse_transform(&self, values: ArrayView1<f32>) -> Array1<f32> {
        &values * &self.std + &self.mean
    }

    /// Standardize every row of a batch.
    pub fn transform_rows(&self, samples: &Array2<f32>) -> Array2<f32> {
        (samples - &self.mean) / &self.std
    }

    /// Undo standardization on every row of a batch.
    pub fn inverse_transform_rows(&self, samples: &Array2<f32>) -> Array2<f32> {
        samples * &self.std + &self.mean
    }
}
