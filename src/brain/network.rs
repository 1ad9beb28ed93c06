use ::rand::Rng;
use macroquad::prelude::*;
use rand_distr::{Distribution, Normal, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::config;

/// Every policy emits a 2-D direction.
pub const OUTPUT_DIM: usize = 2;

/// Layer widths of a steering network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub input: usize,
    pub hidden1: usize,
    pub hidden2: usize,
}

impl Shape {
    pub fn new(input: usize, hidden1: usize, hidden2: usize) -> Self {
        Self {
            input,
            hidden1,
            hidden2,
        }
    }

    pub fn param_count(&self) -> usize {
        (self.input + 1) * self.hidden1
            + (self.hidden1 + 1) * self.hidden2
            + (self.hidden2 + 1) * OUTPUT_DIM
    }
}

/// Dense layer. Weights are row-major: `weights[out * inputs + in]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

impl Layer {
    /// He/Kaiming normal init for ReLU layers, zero biases.
    fn kaiming(inputs: usize, outputs: usize, rng: &mut impl Rng) -> Self {
        let std = (2.0 / inputs.max(1) as f32).sqrt();
        let weights = match Normal::new(0.0, std) {
            Ok(normal) => (0..inputs * outputs).map(|_| normal.sample(rng)).collect(),
            Err(_) => vec![0.0; inputs * outputs],
        };
        Self {
            inputs,
            outputs,
            weights,
            biases: vec![0.0; outputs],
        }
    }

    fn small_uniform(inputs: usize, outputs: usize, range: f32, rng: &mut impl Rng) -> Self {
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-range..=range))
            .collect();
        Self {
            inputs,
            outputs,
            weights,
            biases: vec![0.0; outputs],
        }
    }

    fn is_consistent(&self) -> bool {
        self.weights.len() == self.inputs * self.outputs && self.biases.len() == self.outputs
    }

    /// Pre-activation `W x + b`.
    fn affine(&self, x: &[f32]) -> Vec<f32> {
        debug_assert_eq!(x.len(), self.inputs);
        self.weights
            .chunks_exact(self.inputs.max(1))
            .zip(&self.biases)
            .map(|(row, b)| b + row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>())
            .collect()
    }

    fn gradient(&self, delta: &[f32], input: &[f32]) -> LayerGrad {
        let mut weights = Vec::with_capacity(self.weights.len());
        for d in delta {
            weights.extend(input.iter().map(|x| d * x));
        }
        LayerGrad {
            weights,
            biases: delta.to_vec(),
        }
    }

    /// `W^T delta`: error signal for the previous layer.
    fn backprop(&self, delta: &[f32]) -> Vec<f32> {
        let mut prev = vec![0.0; self.inputs];
        for (row, d) in self.weights.chunks_exact(self.inputs.max(1)).zip(delta) {
            for (p, w) in prev.iter_mut().zip(row) {
                *p += w * d;
            }
        }
        prev
    }

    fn params_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.weights.iter_mut().chain(self.biases.iter_mut())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerGrad {
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

impl LayerGrad {
    fn values(&self) -> impl Iterator<Item = &f32> {
        self.weights.iter().chain(self.biases.iter())
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.weights.iter_mut().chain(self.biases.iter_mut())
    }
}

/// Gradients laid out exactly like [`Network::layers`].
#[derive(Clone, Debug, PartialEq)]
pub struct Gradients {
    pub layers: Vec<LayerGrad>,
}

impl Gradients {
    pub fn norm(&self) -> f32 {
        self.layers
            .iter()
            .flat_map(LayerGrad::values)
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt()
    }

    /// Rescale so the global L2 norm does not exceed `max_norm`.
    /// Returns the norm before clipping.
    pub fn clip_to(&mut self, max_norm: f32) -> f32 {
        let norm = self.norm();
        let coef = max_norm / (norm + config::NORM_EPSILON);
        if coef < 1.0 {
            for g in self.layers.iter_mut().flat_map(LayerGrad::values_mut) {
                *g *= coef;
            }
        }
        norm
    }

    fn values(&self) -> impl Iterator<Item = &f32> {
        self.layers.iter().flat_map(LayerGrad::values)
    }
}

/// Intermediate values of one forward pass, kept for backprop.
#[derive(Clone, Debug)]
pub struct Activations {
    pub hidden1: Vec<f32>,
    pub hidden2: Vec<f32>,
    pub output: Vec2,
}

/// Two ReLU hidden layers followed by a tanh output, so raw predictions stay
/// inside `[-1, 1]^2`.
#[derive(Clone, Debug, PartialEq)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    pub fn random(shape: Shape, rng: &mut impl Rng) -> Self {
        Self {
            layers: vec![
                Layer::kaiming(shape.input, shape.hidden1, rng),
                Layer::kaiming(shape.hidden1, shape.hidden2, rng),
                Layer::small_uniform(shape.hidden2, OUTPUT_DIM, config::OUTPUT_INIT_RANGE, rng),
            ],
        }
    }

    /// Rebuild from raw layers, checking that they chain into a steering net.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self, String> {
        if layers.len() != 3 {
            return Err(format!("expected 3 layers, found {}", layers.len()));
        }
        if let Some(bad) = layers.iter().position(|l| !l.is_consistent()) {
            return Err(format!("layer {bad} has mismatched tensor lengths"));
        }
        if layers[1].inputs != layers[0].outputs || layers[2].inputs != layers[1].outputs {
            return Err("layer widths do not chain".to_string());
        }
        if layers[2].outputs != OUTPUT_DIM {
            return Err(format!(
                "output layer has {} units, expected {OUTPUT_DIM}",
                layers[2].outputs
            ));
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn shape(&self) -> Shape {
        Shape::new(
            self.layers[0].inputs,
            self.layers[0].outputs,
            self.layers[1].outputs,
        )
    }

    pub fn forward(&self, input: &[f32]) -> Activations {
        let mut hidden1 = self.layers[0].affine(input);
        relu_in_place(&mut hidden1);
        let mut hidden2 = self.layers[1].affine(&hidden1);
        relu_in_place(&mut hidden2);
        let out = self.layers[2].affine(&hidden2);
        Activations {
            hidden1,
            hidden2,
            output: vec2(out[0].tanh(), out[1].tanh()),
        }
    }

    pub fn predict(&self, input: &[f32]) -> Vec2 {
        self.forward(input).output
    }

    /// Gradients of the direction loss `mean((p/|p| - t/|t|)^2)` for one
    /// sample. Both vectors are projected to unit length (with an epsilon
    /// floor) so only the angle between them is penalised.
    pub fn direction_gradients(
        &self,
        input: &[f32],
        act: &Activations,
        target: Vec2,
    ) -> (Gradients, f32) {
        let eps = config::NORM_EPSILON;
        let pred = act.output;
        let pred_len = pred.length();
        let scale = pred_len.max(eps);
        let unit = pred / scale;
        let goal = target / target.length().max(eps);

        let diff = unit - goal;
        let loss = diff.length_squared() / OUTPUT_DIM as f32;

        // dL/du = 2 (u - t) / 2; through u = p / max(|p|, eps).
        let d_pred = if pred_len > eps {
            (diff - unit * unit.dot(diff)) / scale
        } else {
            diff / eps
        };

        let d_out = [
            d_pred.x * (1.0 - pred.x * pred.x),
            d_pred.y * (1.0 - pred.y * pred.y),
        ];
        let out_grad = self.layers[2].gradient(&d_out, &act.hidden2);

        let mut d_h2 = self.layers[2].backprop(&d_out);
        relu_mask(&mut d_h2, &act.hidden2);
        let h2_grad = self.layers[1].gradient(&d_h2, &act.hidden1);

        let mut d_h1 = self.layers[1].backprop(&d_h2);
        relu_mask(&mut d_h1, &act.hidden1);
        let h1_grad = self.layers[0].gradient(&d_h1, input);

        (
            Gradients {
                layers: vec![h1_grad, h2_grad, out_grad],
            },
            loss,
        )
    }

    /// Subtract `update(index, grad)` from every parameter. Indices run over
    /// layers in order, weights before biases.
    pub fn apply(&mut self, grads: &Gradients, mut update: impl FnMut(usize, f32) -> f32) {
        let params = self.layers.iter_mut().flat_map(Layer::params_mut);
        for (i, (param, g)) in params.zip(grads.values()).enumerate() {
            *param -= update(i, *g);
        }
    }

    /// Add `rate * N(0, 1)` to every parameter.
    pub fn mutate(&mut self, rate: f32, rng: &mut impl Rng) {
        for param in self.layers.iter_mut().flat_map(Layer::params_mut) {
            let noise: f32 = StandardNormal.sample(rng);
            *param += rate * noise;
        }
    }

    pub fn param_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.biases.len())
            .sum()
    }
}

fn relu_in_place(values: &mut [f32]) {
    for v in values {
        *v = v.max(0.0);
    }
}

fn relu_mask(delta: &mut [f32], activation: &[f32]) {
    for (d, a) in delta.iter_mut().zip(activation) {
        if *a <= 0.0 {
            *d = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state(n: usize) -> Vec<f32> {
        (0..n).map(|i| ((i as f32) * 0.37).sin() * 0.5).collect()
    }

    #[test]
    fn fresh_network_predicts_near_zero() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let net = Network::random(Shape::new(12, 32, 8), &mut rng);
        let out = net.predict(&state(12));
        assert!(out.x.abs() < 0.2 && out.y.abs() < 0.2, "{out:?}");
        assert_eq!(net.param_count(), Shape::new(12, 32, 8).param_count());
    }

    #[test]
    fn analytic_gradients_match_finite_differences() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut net = Network::random(Shape::new(4, 6, 5), &mut rng);
        // Larger output weights keep the prediction far from the epsilon floor.
        net.mutate(0.5, &mut rng);
        let input = state(4);
        let target = vec2(0.6, -0.8);

        let act = net.forward(&input);
        let (grads, _) = net.direction_gradients(&input, &act, target);
        let flat: Vec<f32> = grads.values().copied().collect();

        let loss_at = |net: &Network| {
            let act = net.forward(&input);
            net.direction_gradients(&input, &act, target).1
        };

        let h = 1e-3;
        let mut checked = 0;
        for index in (0..flat.len()).step_by(7) {
            let mut plus = net.clone();
            plus.apply(&grads, |i, _| if i == index { -h } else { 0.0 });
            let mut minus = net.clone();
            minus.apply(&grads, |i, _| if i == index { h } else { 0.0 });
            let numeric = (loss_at(&plus) - loss_at(&minus)) / (2.0 * h);
            assert!(
                (numeric - flat[index]).abs() < 2e-2,
                "param {index}: numeric {numeric} vs analytic {}",
                flat[index]
            );
            checked += 1;
        }
        assert!(checked > 5);
    }

    #[test]
    fn clipping_bounds_global_norm() {
        let mut grads = Gradients {
            layers: vec![LayerGrad {
                weights: vec![3.0, 4.0],
                biases: vec![0.0],
            }],
        };
        let before = grads.clip_to(1.0);
        assert!((before - 5.0).abs() < 1e-5);
        assert!((grads.norm() - 1.0).abs() < 1e-4);

        let mut small = Gradients {
            layers: vec![LayerGrad {
                weights: vec![0.3],
                biases: vec![0.4],
            }],
        };
        small.clip_to(1.0);
        assert_eq!(small.layers[0].weights, vec![0.3]);
    }

    #[test]
    fn from_layers_rejects_broken_chains() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let net = Network::random(Shape::new(4, 3, 2), &mut rng);
        let mut layers = net.layers().to_vec();
        assert!(Network::from_layers(layers.clone()).is_ok());
        layers[1].biases.pop();
        assert!(Network::from_layers(layers).is_err());
    }

    #[test]
    fn mutation_perturbs_every_layer() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let net = Network::random(Shape::new(4, 3, 2), &mut rng);
        let mut child = net.clone();
        child.mutate(0.1, &mut rng);
        for (a, b) in net.layers().iter().zip(child.layers()) {
            assert_ne!(a.weights, b.weights);
            assert_ne!(a.biases, b.biases);
        }
    }
}
