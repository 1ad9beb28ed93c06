use super::network::{Gradients, Network};

/// Adam optimizer state, one moment pair per network parameter.
#[derive(Clone, Debug)]
pub struct Adam {
    pub lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    m: Vec<f32>,
    v: Vec<f32>,
    t: i32,
}

impl Adam {
    pub fn new(n_params: usize, lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            m: vec![0.0; n_params],
            v: vec![0.0; n_params],
            t: 0,
        }
    }

    /// Drop accumulated moments, e.g. after parameters were replaced wholesale.
    pub fn reset(&mut self, n_params: usize) {
        self.m = vec![0.0; n_params];
        self.v = vec![0.0; n_params];
        self.t = 0;
    }

    pub fn step(&mut self, network: &mut Network, grads: &Gradients) {
        self.t = self.t.saturating_add(1);
        let bias_correction1 = 1.0 - self.beta1.powi(self.t);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t);
        let Self {
            lr,
            beta1,
            beta2,
            eps,
            m,
            v,
            ..
        } = self;

        network.apply(grads, |i, g| {
            let (Some(mi), Some(vi)) = (m.get_mut(i), v.get_mut(i)) else {
                return 0.0;
            };
            *mi = *beta1 * *mi + (1.0 - *beta1) * g;
            *vi = *beta2 * *vi + (1.0 - *beta2) * g * g;
            let m_hat = *mi / bias_correction1;
            let v_hat = *vi / bias_correction2;
            *lr * m_hat / (v_hat.sqrt() + *eps)
        });
    }
}
