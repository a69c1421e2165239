//! Model shape constants and training configuration.
//!
//! The deployed model is a `12-64-32-2` network over a 4-step window of
//! `(temperature, humidity, time_of_day)` triples. These values are fixed at
//! build time for the embedded target; [`Topology`] carries them at runtime so
//! both deployments agree on every array length.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Number of past observations fed to the model.
pub const WINDOW_SIZE: usize = 4;

/// Scalars per observation: metric a, metric b, time-of-day fraction.
pub const N_FEATURES: usize = 3;

/// Width of the flattened input vector.
pub const N_INPUTS: usize = WINDOW_SIZE * N_FEATURES;

/// Width of the first hidden layer.
pub const HIDDEN1: usize = 64;

/// Width of the second hidden layer.
pub const HIDDEN2: usize = 32;

/// Predicted metrics per forward pass.
pub const N_OUTPUTS: usize = 2;

/// Layer widths of the predictor network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Observations per window
    pub window_size: usize,

    /// First hidden layer width
    pub hidden1: usize,

    /// Second hidden layer width
    pub hidden2: usize,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            hidden1: HIDDEN1,
            hidden2: HIDDEN2,
        }
    }
}

impl Topology {
    pub fn new(window_size: usize, hidden1: usize, hidden2: usize) -> Self {
        Self {
            window_size,
            hidden1,
            hidden2,
        }
    }

    /// Reject zero-width layers.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.hidden1 == 0 || self.hidden2 == 0 {
            return Err(ForecastError::configuration(format!(
                "topology {}x{}-{}-{} has an empty layer",
                self.window_size, N_FEATURES, self.hidden1, self.hidden2
            )));
        }
        Ok(())
    }

    /// Flattened input width (`window_size * N_FEATURES`).
    pub fn n_inputs(&self) -> usize {
        self.window_size * N_FEATURES
    }

    /// Number of weights and biases across all three layers.
    pub fn parameter_count(&self) -> usize {
        let n_in = self.n_inputs();
        n_in * self.hidden1
            + self.hidden1
            + self.hidden1 * self.hidden2
            + self.hidden2
            + self.hidden2 * N_OUTPUTS
            + N_OUTPUTS
    }

    /// Length of the flat exported artifact: scaler statistics plus parameters.
    pub fn artifact_len(&self) -> usize {
        2 * self.n_inputs() + 2 * N_OUTPUTS + self.parameter_count()
    }
}

/// Configuration for the offline trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Network shape to fit
    pub topology: Topology,

    /// Adam step size
    pub learning_rate: f32,

    /// Maximum number of epochs
    pub max_iter: usize,

    /// Share of supervised pairs held out for early stopping
    pub validation_fraction: f32,

    /// Consecutive non-improving epochs before stopping
    pub n_iter_no_change: usize,

    /// Minimum validation score gain that counts as improvement
    pub tol: f32,

    /// L2 penalty on weights
    pub alpha: f32,

    /// Upper bound on mini-batch size
    pub batch_size: usize,

    /// Seed for initialisation, split and shuffling
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            learning_rate: 0.001,
            max_iter: 10_000,
            validation_fraction: 0.1,
            n_iter_no_change: 50,
            tol: 1e-4,
            alpha: 1e-4,
            batch_size: 200,
            seed: 42,
        }
    }
}
