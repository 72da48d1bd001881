// =============================================
// adam.rs
// =============================================

#![forbid(unsafe_code)]

use ndarray::{Array2, Zip};

/// State of the Adam optimizer for one parameter matrix.
///
/// * `beta1`, `beta2` - decay rates of the first and second moment estimates
/// * `epsilon`        - keeps the update finite when `v` is zero
/// * `timestep`       - number of steps taken so far (starts at 0)
/// * `m`, `v`         - first and second moment estimates, same shape as the parameters
#[derive(Debug, Clone)]
pub struct Adam {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    timestep: usize,
    m: Array2<f32>,
    v: Array2<f32>,
}

impl Adam {
    /// Zeroed moments for a parameter matrix of the given `(rows, cols)`.
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            timestep: 0,
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    /// One in-place update `θ ← θ − lr · m̂ / (√v̂ + ε)`.
    ///
    /// `params` and `grads` must have the shape the optimizer was built for.
    pub fn step(&mut self, params: &mut Array2<f32>, grads: &Array2<f32>, lr: f32) {
        debug_assert_eq!(params.dim(), self.m.dim());
        debug_assert_eq!(grads.dim(), self.m.dim());

        self.timestep += 1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        Zip::from(&mut self.m)
            .and(grads)
            .for_each(|m, &g| *m = b1 * *m + (1.0 - b1) * g);
        Zip::from(&mut self.v)
            .and(grads)
            .for_each(|v, &g| *v = b2 * *v + (1.0 - b2) * g * g);

        // bias correction
        let bias_c1 = 1.0 - b1.powi(self.timestep as i32);
        let bias_c2 = 1.0 - b2.powi(self.timestep as i32);

        Zip::from(params)
            .and(&self.m)
            .and(&self.v)
            .for_each(|w, &m, &v| {
                let m_hat = m / bias_c1;
                let v_hat = v / bias_c2;
                *w -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }
}
