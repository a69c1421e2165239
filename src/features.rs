//! Feature construction shared by training and inference.
//!
//! The supervised pairs built here and the live window in
//! [`FeatureWindow`](crate::FeatureWindow) must flatten observations in the
//! same order, otherwise the trained scalers and weights no longer line up
//! with what the deployed predictor feeds them.

use chrono::Timelike;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::{N_FEATURES, N_OUTPUTS};
use crate::error::{ForecastError, Result};

const SECONDS_PER_DAY: f32 = 86_400.0;

/// One sampling instant: two metrics plus the time of day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// First metric (temperature)
    pub metric_a: f32,

    /// Second metric (humidity)
    pub metric_b: f32,

    /// Seconds since midnight divided by 86400, in `[0, 1)`
    pub time_of_day: f32,
}

impl Observation {
    pub fn new(metric_a: f32, metric_b: f32, time_of_day: f32) -> Self {
        Self {
            metric_a,
            metric_b,
            time_of_day,
        }
    }

    /// Build an observation stamped with a wall-clock time.
    ///
    /// # Example
    /// ```
    /// use chrono::NaiveTime;
    /// use envcast::Observation;
    /// let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    /// let obs = Observation::at(21.5, 48.0, &noon);
    /// assert_eq!(obs.time_of_day, 0.5);
    /// ```
    pub fn at<T: Timelike>(metric_a: f32, metric_b: f32, time: &T) -> Self {
        Self::new(metric_a, metric_b, time_of_day_fraction(time))
    }

    /// Feature order inside one window slot.
    pub fn to_features(&self) -> [f32; N_FEATURES] {
        [self.metric_a, self.metric_b, self.time_of_day]
    }

    /// The two predicted metrics.
    pub fn targets(&self) -> [f32; N_OUTPUTS] {
        [self.metric_a, self.metric_b]
    }
}

/// Fraction of the day elapsed at `time`, ignoring sub-second precision.
pub fn time_of_day_fraction<T: Timelike>(time: &T) -> f32 {
    let seconds = time.hour() * 3600 + time.minute() * 60 + time.second();
    seconds as f32 / SECONDS_PER_DAY
}

/// Flattened inputs and their next-step targets.
#[derive(Debug, Clone)]
pub struct SupervisedSet {
    /// One flattened window per row (`n x window_size * N_FEATURES`)
    pub inputs: Array2<f32>,

    /// Metrics observed right after each window (`n x N_OUTPUTS`)
    pub targets: Array2<f32>,
}

impl SupervisedSet {
    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }
}

/// Slide a window over a chronological history.
///
/// For each `i` in `window_size..history.len()`, the input is the flattened
/// `history[i - window_size..i]` and the target is `history[i]`'s metrics.
///
/// # Errors
/// Returns `InsufficientData` if fewer than `window_size + 1` rows are given.
pub fn build_supervised(history: &[Observation], window_size: usize) -> Result<SupervisedSet> {
    let required = window_size + 1;
    if window_size == 0 || history.len() < required {
        return Err(ForecastError::InsufficientData {
            required,
            actual: history.len(),
        });
    }

    let n = history.len() - window_size;
    let n_inputs = window_size * N_FEATURES;
    let mut inputs = Array2::<f32>::zeros((n, n_inputs));
    let mut targets = Array2::<f32>::zeros((n, N_OUTPUTS));

    for (row, i) in (window_size..history.len()).enumerate() {
        for (slot, observation) in history[i - window_size..i].iter().enumerate() {
            for (k, value) in observation.to_features().into_iter().enumerate() {
                inputs[[row, slot * N_FEATURES + k]] = value;
            }
        }
        for (k, value) in history[i].targets().into_iter().enumerate() {
            targets[[row, k]] = value;
        }
    }

    Ok(SupervisedSet { inputs, targets })
}
