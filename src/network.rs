//! Three-layer dense network: two ReLU hidden layers and a linear output.
//!
//! ```text
//! linear1 = x . W1 + B1        hidden1 = relu(linear1)
//! linear2 = hidden1 . W2 + B2  hidden2 = relu(linear2)
//! output  = hidden2 . W3 + B3
//! ```
//!
//! Every intermediate of the latest forward pass is kept in a single-slot
//! [`ForwardCache`] so the online adapter can backpropagate without
//! recomputing anything.

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{Topology, N_FEATURES, N_OUTPUTS};
use crate::error::{ForecastError, Result};

/// Weights and biases of all three layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub w1: Array2<f32>,
    pub b1: Array1<f32>,
    pub w2: Array2<f32>,
    pub b2: Array1<f32>,
    pub w3: Array2<f32>,
    pub b3: Array1<f32>,
}

impl NetworkParams {
    /// Assemble parameters, checking every shape against `topology`.
    ///
    /// # Errors
    /// `Configuration` naming the first mismatched array.
    pub fn new(
        topology: Topology,
        w1: Array2<f32>,
        b1: Array1<f32>,
        w2: Array2<f32>,
        b2: Array1<f32>,
        w3: Array2<f32>,
        b3: Array1<f32>,
    ) -> Result<Self> {
        let params = Self {
            w1,
            b1,
            w2,
            b2,
            w3,
            b3,
        };
        params.check_shapes(topology)?;
        Ok(params)
    }

    /// All-zero parameters.
    pub fn zeros(topology: Topology) -> Self {
        let (n_in, h1, h2) = (topology.n_inputs(), topology.hidden1, topology.hidden2);
        Self {
            w1: Array2::zeros((n_in, h1)),
            b1: Array1::zeros(h1),
            w2: Array2::zeros((h1, h2)),
            b2: Array1::zeros(h2),
            w3: Array2::zeros((h2, N_OUTPUTS)),
            b3: Array1::zeros(N_OUTPUTS),
        }
    }

    /// Glorot-uniform initialisation; biases use the same bound as their layer.
    pub fn glorot_uniform<R: Rng>(topology: Topology, rng: &mut R) -> Self {
        let (n_in, h1, h2) = (topology.n_inputs(), topology.hidden1, topology.hidden2);
        let (w1, b1) = glorot_layer(n_in, h1, rng);
        let (w2, b2) = glorot_layer(h1, h2, rng);
        let (w3, b3) = glorot_layer(h2, N_OUTPUTS, rng);
        Self {
            w1,
            b1,
            w2,
            b2,
            w3,
            b3,
        }
    }

    pub fn check_shapes(&self, topology: Topology) -> Result<()> {
        let (n_in, h1, h2) = (topology.n_inputs(), topology.hidden1, topology.hidden2);
        check_matrix("W1", &self.w1, (n_in, h1))?;
        ForecastError::check_len("B1", h1, self.b1.len())?;
        check_matrix("W2", &self.w2, (h1, h2))?;
        ForecastError::check_len("B2", h2, self.b2.len())?;
        check_matrix("W3", &self.w3, (h2, N_OUTPUTS))?;
        ForecastError::check_len("B3", N_OUTPUTS, self.b3.len())
    }

    /// Number of weights and biases.
    pub fn parameter_count(&self) -> usize {
        self.w1.len() + self.b1.len() + self.w2.len() + self.b2.len() + self.w3.len() + self.b3.len()
    }

    /// Topology implied by the array shapes.
    pub fn topology(&self) -> Topology {
        Topology::new(
            self.w1.nrows() / N_FEATURES,
            self.w1.ncols(),
            self.w2.ncols(),
        )
    }
}

fn glorot_layer<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> (Array2<f32>, Array1<f32>) {
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let weights = Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-bound..bound));
    let biases = Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound));
    (weights, biases)
}

fn check_matrix(name: &str, matrix: &Array2<f32>, expected: (usize, usize)) -> Result<()> {
    if matrix.dim() == expected {
        Ok(())
    } else {
        Err(ForecastError::configuration(format!(
            "{name}: expected {}x{}, got {}x{}",
            expected.0,
            expected.1,
            matrix.nrows(),
            matrix.ncols()
        )))
    }
}

pub(crate) fn relu(values: &Array1<f32>) -> Array1<f32> {
    values.mapv(|x| x.max(0.0))
}

/// Derivative of ReLU: 1 where the unit was active, 0 elsewhere.
pub(crate) fn relu_grad(linear: &Array1<f32>) -> Array1<f32> {
    linear.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 })
}

/// Intermediates of the most recent forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardCache {
    /// Standardized input vector
    pub input: Array1<f32>,
    pub linear1: Array1<f32>,
    pub hidden1: Array1<f32>,
    pub linear2: Array1<f32>,
    pub hidden2: Array1<f32>,
    /// Standardized output
    pub output: Array1<f32>,
}

/// Predictor network with its single-slot forward cache.
#[derive(Debug, Clone)]
pub struct Network {
    topology: Topology,
    params: NetworkParams,
    cache: Option<ForwardCache>,
    pending_update: bool,
}

impl Network {
    /// Wrap parameters after validating their shapes.
    pub fn new(topology: Topology, params: NetworkParams) -> Result<Self> {
        topology.validate()?;
        params.check_shapes(topology)?;
        Ok(Self {
            topology,
            params,
            cache: None,
            pending_update: false,
        })
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// Replace all parameters, e.g. after a full retrain.
    ///
    /// Discards the forward cache.
    pub fn replace_params(&mut self, params: NetworkParams) -> Result<()> {
        params.check_shapes(self.topology)?;
        self.params = params;
        self.cache = None;
        self.pending_update = false;
        Ok(())
    }

    pub fn parameter_count(&self) -> usize {
        self.params.parameter_count()
    }

    /// Cache of the latest forward pass, if any.
    pub fn cache(&self) -> Option<&ForwardCache> {
        self.cache.as_ref()
    }

    /// Whether a forward pass is waiting for its online update.
    pub fn has_pending_update(&self) -> bool {
        self.pending_update
    }

    /// Run the network on a standardized input and cache the intermediates.
    ///
    /// Overwrites the previous cache.
    ///
    /// # Errors
    /// `Configuration` if the input width does not match the topology.
    pub fn forward(&mut self, input: ArrayView1<f32>) -> Result<Array1<f32>> {
        ForecastError::check_len("network input", self.topology.n_inputs(), input.len())?;

        let p = &self.params;
        let linear1 = input.dot(&p.w1) + &p.b1;
        let hidden1 = relu(&linear1);
        let linear2 = hidden1.dot(&p.w2) + &p.b2;
        let hidden2 = relu(&linear2);
        let output = hidden2.dot(&p.w3) + &p.b3;

        self.cache = Some(ForwardCache {
            input: input.to_owned(),
            linear1,
            hidden1,
            linear2,
            hidden2,
            output: output.clone(),
        });
        self.pending_update = true;

        Ok(output)
    }

    /// Hand out the parameters together with the cache of the pending pass.
    ///
    /// Consumes the pending flag, so a second call before the next
    /// [`forward`](Self::forward) fails.
    ///
    /// # Errors
    /// `AdapterMisuse` if no forward pass is pending.
    pub(crate) fn claim_update(&mut self) -> Result<(&mut NetworkParams, &ForwardCache)> {
        if !self.pending_update {
            return Err(ForecastError::AdapterMisuse);
        }
        let cache = self.cache.as_ref().ok_or(ForecastError::AdapterMisuse)?;
        self.pending_update = false;
        Ok((&mut self.params, cache))
    }
}
