//! Online adaptation: one stochastic-gradient step per realized observation.
//!
//! The step reuses the [`ForwardCache`] of the forward pass that produced the
//! prediction being corrected, so it must run exactly once between two
//! forward passes. Updates are applied layer by layer from the output back,
//! and each hidden error is propagated through the weights that were just
//! updated.

use log::debug;
use ndarray::{Array1, ArrayView1, Axis};

use crate::config::N_OUTPUTS;
use crate::error::{ForecastError, Result};
use crate::network::{relu_grad, ForwardCache, Network, NetworkParams};
use crate::scaler::Standardizer;

/// Outcome of one online update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSummary {
    /// `ground_truth - prediction` in original units
    pub residual: [f32; N_OUTPUTS],

    /// Step size used
    pub learning_rate: f32,
}

/// Apply one in-place gradient step towards `ground_truth`.
///
/// No clipping and no decay: the step is `learning_rate` times the raw
/// single-sample gradient of the squared error in standardized output space.
///
/// # Errors
/// `AdapterMisuse` if there is no forward pass awaiting an update.
pub fn apply_update(
    network: &mut Network,
    target_scaler: &Standardizer,
    ground_truth: [f32; N_OUTPUTS],
    learning_rate: f32,
) -> Result<UpdateSummary> {
    ForecastError::check_len("target scaler", N_OUTPUTS, target_scaler.dim())?;
    let (params, cache) = network.claim_update()?;

    // (truth - mean)/std - output, evaluated as (truth - prediction)/std so an
    // exact prediction yields an exactly zero error.
    let predicted = target_scaler.inverse_transform(cache.output.view());
    let residual = Array1::from(ground_truth.to_vec()) - &predicted;
    let output_error = &residual / target_scaler.std();

    backpropagate(params, cache, output_error.view(), learning_rate);

    let summary = UpdateSummary {
        residual: [residual[0], residual[1]],
        learning_rate,
    };
    debug!(
        "online update lr={} residual=({:.4}, {:.4})",
        learning_rate, summary.residual[0], summary.residual[1]
    );
    Ok(summary)
}

/// Propagate `output_error` (target minus output, standardized) through the
/// cached activations and nudge every layer by `learning_rate` times its
/// gradient.
pub(crate) fn backpropagate(
    params: &mut NetworkParams,
    cache: &ForwardCache,
    output_error: ArrayView1<f32>,
    learning_rate: f32,
) {
    // Output layer.
    params
        .w3
        .scaled_add(learning_rate, &outer(cache.hidden2.view(), output_error));
    params.b3.scaled_add(learning_rate, &output_error);

    // Hidden layer 2.
    let hidden2_error = params.w3.dot(&output_error) * relu_grad(&cache.linear2);
    params
        .w2
        .scaled_add(learning_rate, &outer(cache.hidden1.view(), hidden2_error.view()));
    params.b2.scaled_add(learning_rate, &hidden2_error);

    // Hidden layer 1.
    let hidden1_error = params.w2.dot(&hidden2_error) * relu_grad(&cache.linear1);
    params
        .w1
        .scaled_add(learning_rate, &outer(cache.input.view(), hidden1_error.view()));
    params.b1.scaled_add(learning_rate, &hidden1_error);
}

fn outer(left: ArrayView1<f32>, right: ArrayView1<f32>) -> ndarray::Array2<f32> {
    let column = left.insert_axis(Axis(1));
    let row = right.insert_axis(Axis(0));
    &column * &row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_network() -> Network {
        let topology = Topology::new(1, 2, 2);
        let params = NetworkParams::new(
            topology,
            array![[1.0, -1.0], [0.5, 0.5], [0.0, 2.0]],
            array![0.0, 0.5],
            array![[1.0, 0.0], [-1.0, 1.0]],
            array![0.1, 0.3],
            array![[2.0, 0.0], [0.0, 3.0]],
            array![0.5, -0.5],
        )
        .unwrap();
        Network::new(topology, params).unwrap()
    }

    fn unit_scaler() -> Standardizer {
        Standardizer::from_parts(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap()
    }

    #[test]
    fn test_update_by_hand() {
        let mut network = tiny_network();
        let output = network.forward(array![1.0f32, 2.0, -1.0].view()).unwrap();
        // hidden1 = [2, 0], linear2 = [2.1, 0.3], hidden2 = [2.1, 0.3]
        // output = [4.7, 0.4]
        assert!((output[1] - 0.4).abs() < 1e-6);

        let summary = apply_update(&mut network, &unit_scaler(), [5.7, 0.4], 0.1).unwrap();
        assert!((summary.residual[0] - 1.0).abs() < 1e-5);

        let p = network.params();
        // W3 += 0.1 * outer([2.1, 0.3], [1, ~0])
        assert!((p.w3[[0, 0]] - 2.21).abs() < 1e-4);
        assert!((p.w3[[1, 0]] - 0.03).abs() < 1e-4);
        assert!((p.b3[0] - 0.6).abs() < 1e-4);
        // hidden2_error = W3_new . err = [2.21, 0.03]; both units active.
        // W2 += 0.1 * outer([2, 0], [2.21, 0.03])
        assert!((p.w2[[0, 0]] - (1.0 + 0.442)).abs() < 1e-4);
        assert!((p.w2[[0, 1]] - 0.006).abs() < 1e-4);
        assert_eq!(p.w2[[1, 0]], -1.0); // hidden1[1] was inactive
    }

    #[test]
    fn test_zero_learning_rate_is_noop() {
        let topology = Topology::default();
        let params = NetworkParams::glorot_uniform(topology, &mut StdRng::seed_from_u64(9));
        let mut network = Network::new(topology, params.clone()).unwrap();

        let input = Array1::from_shape_fn(topology.n_inputs(), |i| (i as f32).sin());
        network.forward(input.view()).unwrap();
        apply_update(&mut network, &unit_scaler(), [3.0, -2.0], 0.0).unwrap();

        let after = network.params();
        for (a, b) in params.w1.iter().zip(after.w1.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(&params, after);
    }

    #[test]
    fn test_exact_prediction_gives_zero_delta() {
        let topology = Topology::default();
        let params = NetworkParams::glorot_uniform(topology, &mut StdRng::seed_from_u64(11));
        let mut network = Network::new(topology, params.clone()).unwrap();
        let scaler = Standardizer::from_parts(vec![21.0, 48.0], vec![3.5, 12.0]).unwrap();

        let input = Array1::from_shape_fn(topology.n_inputs(), |i| (i as f32 * 0.7).cos());
        let output = network.forward(input.view()).unwrap();
        let predicted = scaler.inverse_transform(output.view());

        let summary =
            apply_update(&mut network, &scaler, [predicted[0], predicted[1]], 0.05).unwrap();
        assert_eq!(summary.residual, [0.0, 0.0]);
        assert_eq!(&params, network.params());
    }

    #[test]
    fn test_update_requires_forward() {
        let mut network = tiny_network();
        assert_eq!(
            apply_update(&mut network, &unit_scaler(), [0.0, 0.0], 0.1).unwrap_err(),
            ForecastError::AdapterMisuse
        );

        network.forward(array![0.5f32, 0.5, 0.5].view()).unwrap();
        apply_update(&mut network, &unit_scaler(), [0.0, 0.0], 0.1).unwrap();
        assert_eq!(
            apply_update(&mut network, &unit_scaler(), [0.0, 0.0], 0.1).unwrap_err(),
            ForecastError::AdapterMisuse
        );
    }

    #[test]
    fn test_repeated_updates_reduce_error() {
        let topology = Topology::new(2, 8, 4);
        let params = NetworkParams::glorot_uniform(topology, &mut StdRng::seed_from_u64(5));
        let mut network = Network::new(topology, params).unwrap();
        let input = Array1::from_shape_fn(topology.n_inputs(), |i| 0.2 * i as f32 - 0.4);
        let target = [1.5f32, -0.5];

        let first = network.forward(input.view()).unwrap();
        let initial = (target[0] - first[0]).abs() + (target[1] - first[1]).abs();
        apply_update(&mut network, &unit_scaler(), target, 0.01).unwrap();
        for _ in 0..200 {
            network.forward(input.view()).unwrap();
            apply_update(&mut network, &unit_scaler(), target, 0.01).unwrap();
        }
        let last = network.forward(input.view()).unwrap();
        let remaining = (target[0] - last[0]).abs() + (target[1] - last[1]).abs();
        assert!(remaining < initial);
    }
}
