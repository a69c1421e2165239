//! Regression accuracy metrics.

use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::config::N_OUTPUTS;

/// Coefficient of determination of `predicted` against `actual`.
///
/// A constant `actual` scores 1.0 when matched exactly and 0.0 otherwise.
pub fn r2_score(actual: ArrayView1<f32>, predicted: ArrayView1<f32>) -> f32 {
    let n = actual.len();
    if n == 0 {
        return 0.0;
    }
    let mean = actual.iter().map(|&y| y as f64).sum::<f64>() / n as f64;
    let mut ss_res = 0.0f64;
    let mut ss_tot = 0.0f64;
    for (&y, &p) in actual.iter().zip(predicted.iter()) {
        ss_res += (y as f64 - p as f64).powi(2);
        ss_tot += (y as f64 - mean).powi(2);
    }
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - ss_res / ss_tot) as f32
}

pub fn mean_absolute_error(actual: ArrayView1<f32>, predicted: ArrayView1<f32>) -> f32 {
    let n = actual.len();
    if n == 0 {
        return 0.0;
    }
    let total: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(&y, &p)| (y as f64 - p as f64).abs())
        .sum();
    (total / n as f64) as f32
}

/// Per-target accuracy of a batch of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// R² for each target
    pub r2: [f32; N_OUTPUTS],

    /// Mean absolute error for each target, in target units
    pub mae: [f32; N_OUTPUTS],
}

impl RegressionMetrics {
    /// Score each column of `predicted` against the same column of `actual`.
    pub fn evaluate(actual: &Array2<f32>, predicted: &Array2<f32>) -> Self {
        let mut r2 = [0.0; N_OUTPUTS];
        let mut mae = [0.0; N_OUTPUTS];
        for k in 0..N_OUTPUTS {
            let y = actual.index_axis(Axis(1), k);
            let p = predicted.index_axis(Axis(1), k);
            r2[k] = r2_score(y, p);
            mae[k] = mean_absolute_error(y, p);
        }
        Self { r2, mae }
    }

    /// R² averaged uniformly over targets.
    pub fn mean_r2(&self) -> f32 {
        self.r2.iter().sum::<f32>() / N_OUTPUTS as f32
    }
}
