//! Forecasting interface shared by the embedded and gateway deployments.
//!
//! A [`Predictor`] owns the rolling window, both scalers and the network.
//! The embedded target only calls [`Predictor::observe`] and
//! [`Predictor::predict`]; the gateway additionally calls
//! [`Predictor::apply_update`] once the predicted reading has been observed.
//!
//! `predict` and `apply_update` both take `&mut self` and share the network's
//! single-slot forward cache. A multi-threaded host must hold one lock across
//! each predict/update pair, e.g. `Mutex<Predictor>`.

use serde::{Deserialize, Serialize};

use crate::adapter::{self, UpdateSummary};
use crate::buffer::FeatureWindow;
use crate::config::{Topology, N_OUTPUTS};
use crate::error::{ForecastError, Result};
use crate::export::ModelArtifact;
use crate::features::Observation;
use crate::network::{Network, NetworkParams};
use crate::scaler::Standardizer;

/// Time-of-day used for the neutral window filler.
const NEUTRAL_TIME_OF_DAY: f32 = 0.5;

/// Denormalized output of one forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub metric_a: f32,
    pub metric_b: f32,
}

impl PredictionRecord {
    /// `actual - predicted` for each metric.
    pub fn error_against(&self, actual_a: f32, actual_b: f32) -> (f32, f32) {
        (actual_a - self.metric_a, actual_b - self.metric_b)
    }

    pub fn to_array(&self) -> [f32; N_OUTPUTS] {
        [self.metric_a, self.metric_b]
    }
}

/// Window, scalers and network for one running forecaster.
#[derive(Debug, Clone)]
pub struct Predictor {
    window: FeatureWindow,
    input_scaler: Standardizer,
    target_scaler: Standardizer,
    network: Network,
    last_prediction: Option<PredictionRecord>,
}

impl Predictor {
    /// Assemble a predictor and seed its window with `(y_mean[0], y_mean[1], 0.5)`.
    ///
    /// # Errors
    /// `Configuration` if the scalers do not match the network topology.
    pub fn new(
        topology: Topology,
        params: NetworkParams,
        input_scaler: Standardizer,
        target_scaler: Standardizer,
    ) -> Result<Self> {
        ForecastError::check_len("input scaler", topology.n_inputs(), input_scaler.dim())?;
        ForecastError::check_len("target scaler", N_OUTPUTS, target_scaler.dim())?;
        let network = Network::new(topology, params)?;

        let y_mean = target_scaler.mean();
        let filler = Observation::new(y_mean[0], y_mean[1], NEUTRAL_TIME_OF_DAY);

        Ok(Self {
            window: FeatureWindow::new(topology.window_size, filler),
            input_scaler,
            target_scaler,
            network,
            last_prediction: None,
        })
    }

    /// Rebuild a predictor from an exported artifact.
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        let topology = artifact.topology()?;
        let (params, input_scaler, target_scaler) = artifact.to_parts()?;
        Self::new(topology, params, input_scaler, target_scaler)
    }

    /// Load the frozen flat parameter list of an embedded build.
    pub fn from_flat(topology: Topology, values: &[f32]) -> Result<Self> {
        Self::from_artifact(&ModelArtifact::from_flat(topology, values)?)
    }

    /// Snapshot the current parameters and scaler statistics.
    pub fn to_artifact(&self) -> ModelArtifact {
        ModelArtifact::from_parts(self.network.params(), &self.input_scaler, &self.target_scaler)
    }

    /// Push a new observation into the window.
    pub fn observe(&mut self, observation: Observation) {
        self.window.push(observation);
    }

    /// Forecast the next reading from the current window.
    pub fn predict(&mut self) -> Result<PredictionRecord> {
        let flat = ndarray::Array1::from(self.window.flatten());
        let input = self.input_scaler.transform(flat.view());
        let output = self.network.forward(input.view())?;
        let denormalized = self.target_scaler.inverse_transform(output.view());

        let record = PredictionRecord {
            metric_a: denormalized[0],
            metric_b: denormalized[1],
        };
        self.last_prediction = Some(record);
        Ok(record)
    }

    /// Nudge the network towards the reading that followed the last prediction.
    ///
    /// # Errors
    /// `AdapterMisuse` if no prediction is awaiting its update.
    pub fn apply_update(
        &mut self,
        ground_truth_a: f32,
        ground_truth_b: f32,
        learning_rate: f32,
    ) -> Result<UpdateSummary> {
        adapter::apply_update(
            &mut self.network,
            &self.target_scaler,
            [ground_truth_a, ground_truth_b],
            learning_rate,
        )
    }

    pub fn last_prediction(&self) -> Option<PredictionRecord> {
        self.last_prediction
    }

    pub fn window(&self) -> &FeatureWindow {
        &self.window
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn input_scaler(&self) -> &Standardizer {
        &self.input_scaler
    }

    pub fn target_scaler(&self) -> &Standardizer {
        &self.target_scaler
    }

    pub fn topology(&self) -> Topology {
        self.network.topology()
    }

    /// Swap in freshly trained parameters, keeping the window.
    pub fn replace_params(&mut self, params: NetworkParams) -> Result<()> {
        self.network.replace_params(params)
    }
}
