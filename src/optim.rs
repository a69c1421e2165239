//! Adam optimizer over [`NetworkParams`].

use ndarray::{Array, Dimension};

use crate::network::NetworkParams;

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone)]
struct Moments<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Moments<D> {
    fn like(param: &Array<f32, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    fn step(&mut self, param: &mut Array<f32, D>, grad: &Array<f32, D>, hp: &StepParams) {
        // m = b1*m + (1-b1)*g
        self.m.zip_mut_with(grad, |m, &g| *m = hp.beta1 * *m + (1.0 - hp.beta1) * g);
        // v = b2*v + (1-b2)*g^2
        self.v
            .zip_mut_with(grad, |v, &g| *v = hp.beta2 * *v + (1.0 - hp.beta2) * g * g);

        ndarray::Zip::from(param)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, &m, &v| *p -= hp.lr_t * m / (v.sqrt() + hp.eps));
    }
}

struct StepParams {
    beta1: f32,
    beta2: f32,
    eps: f32,
    lr_t: f32,
}

/// Adam with bias correction folded into the step size.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    w1: Moments<ndarray::Ix2>,
    b1: Moments<ndarray::Ix1>,
    w2: Moments<ndarray::Ix2>,
    b2: Moments<ndarray::Ix1>,
    w3: Moments<ndarray::Ix2>,
    b3: Moments<ndarray::Ix1>,
}

impl Adam {
    /// Fresh optimizer state shaped like `params`.
    pub fn new(params: &NetworkParams, learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            w1: Moments::like(&params.w1),
            b1: Moments::like(&params.b1),
            w2: Moments::like(&params.w2),
            b2: Moments::like(&params.b2),
            w3: Moments::like(&params.w3),
            b3: Moments::like(&params.b3),
        }
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Move `params` against `grads`, which must share their shapes.
    pub fn step(&mut self, params: &mut NetworkParams, grads: &NetworkParams) {
        self.t = self.t.saturating_add(1);
        let lr_t = self.learning_rate * (1.0 - self.beta2.powi(self.t)).sqrt()
            / (1.0 - self.beta1.powi(self.t));
        let hp = StepParams {
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            lr_t,
        };

        self.w1.step(&mut params.w1, &grads.w1, &hp);
        self.b1.step(&mut params.b1, &grads.b1, &hp);
        self.w2.step(&mut params.w2, &grads.w2, &hp);
        self.b2.step(&mut params.b2, &grads.b2, &hp);
        self.w3.step(&mut params.w3, &grads.w3, &hp);
        self.b3.step(&mut params.b3, &grads.b3, &hp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let topology = Topology::new(1, 2, 2);
        let mut params = NetworkParams::zeros(topology);
        let mut grads = NetworkParams::zeros(topology);
        grads.b3[0] = 4.0;
        grads.b3[1] = -0.5;

        let mut adam = Adam::new(&params, 0.01);
        adam.step(&mut params, &grads);

        // With bias correction the first step is lr * sign(g).
        assert!((params.b3[0] + 0.01).abs() < 1e-6);
        assert!((params.b3[1] - 0.01).abs() < 1e-6);
        assert_eq!(params.w1[[0, 0]], 0.0);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_descends_quadratic() {
        // Minimise 0.5 * (b - 3)^2 on one bias.
        let topology = Topology::new(1, 1, 1);
        let mut params = NetworkParams::zeros(topology);
        let mut adam = Adam::new(&params, 0.1);
        for _ in 0..500 {
            let mut grads = NetworkParams::zeros(topology);
            grads.b3[0] = params.b3[0] - 3.0;
            adam.step(&mut params, &grads);
        }
        assert!((params.b3[0] - 3.0).abs() < 0.05);
    }
}
