//! Offline training from a historical series.
//!
//! Builds supervised pairs with the same window layout the predictor uses,
//! fits both scalers, then fits the network with seeded mini-batch Adam on
//! the mean squared error in standardized space. Training stops early once
//! the held-out R² has failed to improve for `n_iter_no_change` consecutive
//! epochs; the best-scoring parameters are kept.

use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::{Topology, TrainerConfig, N_OUTPUTS};
use crate::error::{ForecastError, Result};
use crate::export::ModelArtifact;
use crate::features::{build_supervised, Observation};
use crate::metrics::{r2_score, RegressionMetrics};
use crate::network::NetworkParams;
use crate::optim::Adam;
use crate::predictor::Predictor;
use crate::scaler::Standardizer;

/// Convergence diagnostics and accuracy of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Epochs run
    pub iterations: usize,

    /// Whether training stopped early rather than at `max_iter`
    pub converged: bool,

    /// Best validation R² (standardized space, averaged over targets)
    pub best_validation_score: f32,

    /// Validation R² of the final epoch
    pub last_validation_score: f32,

    /// Training loss after each epoch
    pub loss_curve: Vec<f32>,

    /// Weights plus biases
    pub parameter_count: usize,

    /// Accuracy over every supervised pair, in original units
    pub metrics: RegressionMetrics,
}

impl TrainingReport {
    /// The non-convergence warning, if the iteration cap was hit.
    pub fn warning(&self) -> Option<ForecastError> {
        if self.converged {
            None
        } else {
            Some(ForecastError::TrainingNonConvergence {
                iterations: self.iterations,
                validation_score: self.last_validation_score,
            })
        }
    }
}

/// Fitted scalers and parameters with their training report.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub topology: Topology,
    pub params: NetworkParams,
    pub input_scaler: Standardizer,
    pub target_scaler: Standardizer,
    pub report: TrainingReport,
}

impl TrainedModel {
    pub fn to_artifact(&self) -> ModelArtifact {
        ModelArtifact::from_parts(&self.params, &self.input_scaler, &self.target_scaler)
    }

    /// Build a ready-to-run predictor with a neutral window.
    pub fn into_predictor(self) -> Result<Predictor> {
        Predictor::new(
            self.topology,
            self.params,
            self.input_scaler,
            self.target_scaler,
        )
    }
}

/// Activations of a batched forward pass.
struct BatchPass {
    linear1: Array2<f32>,
    hidden1: Array2<f32>,
    linear2: Array2<f32>,
    hidden2: Array2<f32>,
    output: Array2<f32>,
}

fn forward_batch(params: &NetworkParams, inputs: &Array2<f32>) -> BatchPass {
    let linear1 = inputs.dot(&params.w1) + &params.b1;
    let hidden1 = linear1.mapv(|x| x.max(0.0));
    let linear2 = hidden1.dot(&params.w2) + &params.b2;
    let hidden2 = linear2.mapv(|x| x.max(0.0));
    let output = hidden2.dot(&params.w3) + &params.b3;
    BatchPass {
        linear1,
        hidden1,
        linear2,
        hidden2,
        output,
    }
}

fn relu_mask(linear: &Array2<f32>) -> Array2<f32> {
    linear.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 })
}

/// Gradients of `0.5 * mean(||output - target||^2) + alpha / (2n) * ||W||^2`,
/// plus the loss itself.
fn batch_gradients(
    params: &NetworkParams,
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
    alpha: f32,
) -> (NetworkParams, f32) {
    let n = inputs.nrows() as f32;
    let pass = forward_batch(params, inputs);

    let delta3 = &pass.output - targets;
    let delta2 = delta3.dot(&params.w3.t()) * relu_mask(&pass.linear2);
    let delta1 = delta2.dot(&params.w2.t()) * relu_mask(&pass.linear1);

    let weight_grad = |activations: &Array2<f32>, delta: &Array2<f32>, w: &Array2<f32>| {
        (activations.t().dot(delta) + &(w * alpha)) / n
    };
    let bias_grad = |delta: &Array2<f32>| delta.sum_axis(Axis(0)) / n;

    let grads = NetworkParams {
        w1: weight_grad(inputs, &delta1, &params.w1),
        b1: bias_grad(&delta1),
        w2: weight_grad(&pass.hidden1, &delta2, &params.w2),
        b2: bias_grad(&delta2),
        w3: weight_grad(&pass.hidden2, &delta3, &params.w3),
        b3: bias_grad(&delta3),
    };

    let squared: f32 = delta3.iter().map(|d| d * d).sum();
    let penalty: f32 = [&params.w1, &params.w2, &params.w3]
        .iter()
        .map(|w| w.iter().map(|x| x * x).sum::<f32>())
        .sum();
    let loss = (squared + alpha * penalty) / (2.0 * n);
    (grads, loss)
}

/// Mean R² over targets of the network on a standardized set.
fn validation_score(params: &NetworkParams, inputs: &Array2<f32>, targets: &Array2<f32>) -> f32 {
    let output = forward_batch(params, inputs).output;
    let total: f32 = (0..N_OUTPUTS)
        .map(|k| r2_score(targets.index_axis(Axis(1), k), output.index_axis(Axis(1), k)))
        .sum();
    total / N_OUTPUTS as f32
}

fn check_config(config: &TrainerConfig) -> Result<()> {
    config.topology.validate()?;
    if !(config.validation_fraction > 0.0 && config.validation_fraction < 1.0) {
        return Err(ForecastError::configuration(format!(
            "validation_fraction must be in (0, 1), got {}",
            config.validation_fraction
        )));
    }
    if config.max_iter == 0 || config.batch_size == 0 || config.n_iter_no_change == 0 {
        return Err(ForecastError::configuration(
            "max_iter, batch_size and n_iter_no_change must be positive",
        ));
    }
    Ok(())
}

/// Fit scalers and network parameters on a chronological history.
///
/// # Errors
/// `InsufficientData` if the history cannot yield a training and a
/// validation pair, `NumericGuard` if a feature is constant, `Configuration`
/// for invalid settings.
pub fn train(history: &[Observation], config: &TrainerConfig) -> Result<TrainedModel> {
    check_config(config)?;
    let topology = config.topology;

    let set = build_supervised(history, topology.window_size)?;
    let n = set.len();
    if n < 2 {
        return Err(ForecastError::InsufficientData {
            required: topology.window_size + 2,
            actual: history.len(),
        });
    }

    let input_scaler = Standardizer::fit(&set.inputs)?;
    let target_scaler = Standardizer::fit(&set.targets)?;
    let inputs = input_scaler.transform_rows(&set.inputs);
    let targets = target_scaler.transform_rows(&set.targets);

    let mut rng = StdRng::seed_from_u64(config.seed);

    let n_val = ((n as f32 * config.validation_fraction).ceil() as usize).clamp(1, n - 1);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    let (val_idx, train_idx) = order.split_at(n_val);
    let val_inputs = inputs.select(Axis(0), val_idx);
    let val_targets = targets.select(Axis(0), val_idx);
    let mut train_idx = train_idx.to_vec();

    let mut params = NetworkParams::glorot_uniform(topology, &mut rng);
    let mut adam = Adam::new(&params, config.learning_rate);
    let batch_size = config.batch_size.min(train_idx.len());

    info!(
        "training {}-{}-{}-{} network on {} pairs ({} held out)",
        topology.n_inputs(),
        topology.hidden1,
        topology.hidden2,
        N_OUTPUTS,
        n,
        n_val
    );

    let mut best_params = params.clone();
    let mut best_score = f32::NEG_INFINITY;
    let mut last_score = f32::NEG_INFINITY;
    let mut no_improvement = 0usize;
    let mut loss_curve = Vec::new();
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iter {
        iterations += 1;
        train_idx.shuffle(&mut rng);

        let mut epoch_loss = 0.0f32;
        for batch in train_idx.chunks(batch_size) {
            let batch_inputs = inputs.select(Axis(0), batch);
            let batch_targets = targets.select(Axis(0), batch);
            let (grads, loss) = batch_gradients(&params, &batch_inputs, &batch_targets, config.alpha);
            adam.step(&mut params, &grads);
            epoch_loss += loss * batch.len() as f32;
        }
        loss_curve.push(epoch_loss / train_idx.len() as f32);

        last_score = validation_score(&params, &val_inputs, &val_targets);
        if last_score < best_score + config.tol {
            no_improvement += 1;
        } else {
            no_improvement = 0;
        }
        if last_score > best_score {
            best_score = last_score;
            best_params = params.clone();
        }

        if no_improvement >= config.n_iter_no_change {
            debug!(
                "validation score has not improved for {} epochs, stopping at epoch {}",
                no_improvement, iterations
            );
            converged = true;
            break;
        }
    }

    let params = best_params;
    let predicted = target_scaler.inverse_transform_rows(&forward_batch(&params, &inputs).output);
    let metrics = RegressionMetrics::evaluate(&set.targets, &predicted);

    let report = TrainingReport {
        iterations,
        converged,
        best_validation_score: best_score,
        last_validation_score: last_score,
        loss_curve,
        parameter_count: params.parameter_count(),
        metrics,
    };

    if let Some(warning) = report.warning() {
        warn!("{warning}");
    }
    info!(
        "finished after {} epochs: {} parameters, R2 {:.5}, MAE ({:.4}, {:.4})",
        report.iterations,
        report.parameter_count,
        metrics.mean_r2(),
        metrics.mae[0],
        metrics.mae[1]
    );

    Ok(TrainedModel {
        topology,
        params,
        input_scaler,
        target_scaler,
        report,
    })
}
