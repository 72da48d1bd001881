// ===========================================================================
//  File:         layer_norm.rs
//  Module:       Layer normalisation
// ---------------------------------------------------------------------------
//  Per-position normalisation over the feature axis followed by a learned
//  affine transform: y = γ ⊙ (x − μ) / √(σ² + ε) + β.
// ===========================================================================

use ndarray::{Array2, Axis};

use crate::adam::Adam;
use crate::error::{ensure_dim, Result};

#[derive(Debug, Clone)]
pub struct LayerNorm {
    epsilon: f32,
    gamma: Array2<f32>, // [1, embed]
    beta: Array2<f32>,  // [1, embed]
    optimizer_gamma: Adam,
    optimizer_beta: Adam,
}

/// Forward intermediates kept for [`LayerNorm::backward`].
#[derive(Debug, Clone)]
pub struct LayerNormCache {
    x_hat: Array2<f32>, // [seq, embed]
    denom: Array2<f32>, // [seq, 1]
}

impl LayerNorm {
    /// γ = 1, β = 0.
    pub fn new(embedding_dim: usize) -> Self {
        LayerNorm {
            epsilon: 1e-5,
            gamma: Array2::ones((1, embedding_dim)),
            beta: Array2::zeros((1, embedding_dim)),
            optimizer_gamma: Adam::new((1, embedding_dim)),
            optimizer_beta: Adam::new((1, embedding_dim)),
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.gamma.ncols()
    }

    pub fn parameter_count(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    pub fn normalize(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        self.forward_cached(input).map(|(out, _)| out)
    }

    pub fn forward_cached(&self, input: &Array2<f32>) -> Result<(Array2<f32>, LayerNormCache)> {
        ensure_dim("layer norm width", self.embedding_dim(), input.ncols())?;
        let n = input.ncols() as f32;

        // mean and (biased) variance per row
        let mean = (input.sum_axis(Axis(1)) / n).insert_axis(Axis(1)); // [seq, 1]
        let centered = input - &mean;
        let var = (centered.mapv(|v| v * v).sum_axis(Axis(1)) / n).insert_axis(Axis(1));

        let denom = var.mapv(|v| (v + self.epsilon).sqrt()); // [seq, 1]
        let x_hat = centered / &denom;
        let out = &self.gamma * &x_hat + &self.beta;

        Ok((out, LayerNormCache { x_hat, denom }))
    }

    /// dx = (1/denom) · (dyγ − mean(dyγ) − x̂ · mean(dyγ · x̂))
    pub fn backward(
        &mut self,
        cache: &LayerNormCache,
        grads: &Array2<f32>,
        lr: f32,
    ) -> Array2<f32> {
        let x_hat = &cache.x_hat;
        let n = x_hat.ncols() as f32;

        let grad_gamma = (x_hat * grads).sum_axis(Axis(0)).insert_axis(Axis(0)); // [1, embed]
        let grad_beta = grads.sum_axis(Axis(0)).insert_axis(Axis(0)); // [1, embed]

        let dy_gamma = grads * &self.gamma; // [seq, embed]
        let mean_dy_gamma = (dy_gamma.sum_axis(Axis(1)) / n).insert_axis(Axis(1));
        let mean_dy_gamma_xhat = ((&dy_gamma * x_hat).sum_axis(Axis(1)) / n).insert_axis(Axis(1));

        let dx = (dy_gamma - &mean_dy_gamma - &(x_hat * &mean_dy_gamma_xhat)) / &cache.denom;

        self.optimizer_gamma.step(&mut self.gamma, &grad_gamma, lr);
        self.optimizer_beta.step(&mut self.beta, &grad_beta, lr);

        dx
    }
}
