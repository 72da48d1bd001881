// ===========================================================================
//  File:         layer_output_projection.rs
//  Module:       Output projection D → vocab_size
// ===========================================================================
use ndarray::{Array2, Axis};
use rand::Rng;

use crate::adam::Adam;
use crate::error::{ensure_dim, Result};
use crate::math::{he_std, random_normal};

#[derive(Debug, Clone)]
pub struct OutputProjection {
    w_out: Array2<f32>, // [embed, vocab]
    b_out: Array2<f32>, // [1, vocab]
    optimizer_w: Adam,
    optimizer_b: Adam,
}

impl OutputProjection {
    pub fn new<R: Rng + ?Sized>(
        embedding_dim: usize,
        vocab_size: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let w_out = random_normal((embedding_dim, vocab_size), he_std(embedding_dim), rng)?;
        Self::from_weights(w_out, Array2::zeros((1, vocab_size)))
    }

    pub fn from_weights(w_out: Array2<f32>, b_out: Array2<f32>) -> Result<Self> {
        ensure_dim("output bias rows", 1, b_out.nrows())?;
        ensure_dim("output bias width", w_out.ncols(), b_out.ncols())?;
        Ok(OutputProjection {
            optimizer_w: Adam::new(w_out.dim()),
            optimizer_b: Adam::new(b_out.dim()),
            w_out,
            b_out,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.w_out.nrows()
    }

    pub fn vocab_size(&self) -> usize {
        self.w_out.ncols()
    }

    pub fn parameter_count(&self) -> usize {
        self.w_out.len() + self.b_out.len()
    }

    /// Logits `[seq, vocab]`.
    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        ensure_dim("output projection input width", self.embedding_dim(), input.ncols())?;
        Ok(input.dot(&self.w_out) + &self.b_out)
    }

    /// `input` is the activation that was fed to [`forward`](Self::forward).
    pub fn backward(&mut self, input: &Array2<f32>, grads: &Array2<f32>, lr: f32) -> Array2<f32> {
        let grad_w_out = input.t().dot(grads);
        let grad_b_out = grads.sum_axis(Axis(0)).insert_axis(Axis(0));
        let grad_input = grads.dot(&self.w_out.t());

        self.optimizer_w.step(&mut self.w_out, &grad_w_out, lr);
        self.optimizer_b.step(&mut self.b_out, &grad_b_out, lr);
        grad_input
    }
}
