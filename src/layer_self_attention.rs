// src/layer_self_attention.rs
// SelfAttention – single head, scaled dot product, no mask
//
// Every position attends to every other position, including later ones.
use ndarray::Array2;
use rand::Rng;

use crate::adam::Adam;
use crate::error::{ensure_dim, ModelError, Result};
use crate::math::{he_std, random_normal, softmax_backward_rows, softmax_rows};

#[derive(Debug, Clone)]
pub struct SelfAttention {
    embedding_dim: usize,
    w_q: Array2<f32>, // [embed, embed]
    w_k: Array2<f32>, // [embed, embed]
    w_v: Array2<f32>, // [embed, embed]
    optimizer_q: Adam,
    optimizer_k: Adam,
    optimizer_v: Adam,
}

/// Forward intermediates kept for [`SelfAttention::backward`].
#[derive(Debug, Clone)]
pub struct AttentionCache {
    input: Array2<f32>,
    q: Array2<f32>,
    k: Array2<f32>,
    v: Array2<f32>,
    weights: Array2<f32>, // [seq, seq]
}

impl AttentionCache {
    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }
}

impl SelfAttention {
    pub fn new<R: Rng + ?Sized>(embedding_dim: usize, rng: &mut R) -> Result<Self> {
        let std = he_std(embedding_dim);
        let shape = (embedding_dim, embedding_dim);
        Self::from_weights(
            random_normal(shape, std, rng)?,
            random_normal(shape, std, rng)?,
            random_normal(shape, std, rng)?,
        )
    }

    /// Builds the layer from explicit projections; all three must be square
    /// and of the same size.
    pub fn from_weights(w_q: Array2<f32>, w_k: Array2<f32>, w_v: Array2<f32>) -> Result<Self> {
        let embedding_dim = w_q.nrows();
        for (context, w) in [("w_q", &w_q), ("w_k", &w_k), ("w_v", &w_v)] {
            ensure_dim(context, embedding_dim, w.nrows())?;
            ensure_dim(context, embedding_dim, w.ncols())?;
        }
        Ok(Self {
            embedding_dim,
            optimizer_q: Adam::new(w_q.dim()),
            optimizer_k: Adam::new(w_k.dim()),
            optimizer_v: Adam::new(w_v.dim()),
            w_q,
            w_k,
            w_v,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn parameter_count(&self) -> usize {
        self.w_q.len() + self.w_k.len() + self.w_v.len()
    }

    fn check_input(&self, x: &Array2<f32>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptySequence);
        }
        ensure_dim("attention input width", self.embedding_dim, x.ncols())
    }

    /// softmax(Q·Kᵀ / √D) for already projected queries and keys.
    fn weights_from(&self, q: &Array2<f32>, k: &Array2<f32>) -> Array2<f32> {
        let scale = (self.embedding_dim as f32).sqrt();
        let mut scores = q.dot(&k.t()); // [seq, seq]
        scores.mapv_inplace(|s| s / scale);
        softmax_rows(&scores)
    }

    /// The [seq, seq] attention-weight matrix for `x`; rows sum to one.
    pub fn attention_weights(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_input(x)?;
        Ok(self.weights_from(&x.dot(&self.w_q), &x.dot(&self.w_k)))
    }

    pub fn attend(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.forward_cached(x).map(|(out, _)| out)
    }

    pub fn forward_cached(&self, x: &Array2<f32>) -> Result<(Array2<f32>, AttentionCache)> {
        self.check_input(x)?;
        let q = x.dot(&self.w_q);
        let k = x.dot(&self.w_k);
        let v = x.dot(&self.w_v);
        let weights = self.weights_from(&q, &k);
        let out = weights.dot(&v);
        Ok((
            out,
            AttentionCache {
                input: x.clone(),
                q,
                k,
                v,
                weights,
            },
        ))
    }

    /// Returns dL/dx and updates the three projections.
    pub fn backward(
        &mut self,
        cache: &AttentionCache,
        grads: &Array2<f32>,
        lr: f32,
    ) -> Array2<f32> {
        let scale = (self.embedding_dim as f32).sqrt();
        let x = &cache.input;

        // out = P·V
        let grad_v = cache.weights.t().dot(grads); // [seq, embed]
        let grad_p = grads.dot(&cache.v.t()); // [seq, seq]

        // P = softmax(S / √D)
        let mut grad_scores = softmax_backward_rows(&cache.weights, &grad_p);
        grad_scores.mapv_inplace(|g| g / scale);

        // S = Q·Kᵀ
        let grad_q = grad_scores.dot(&cache.k);
        let grad_k = grad_scores.t().dot(&cache.q);

        let grad_w_q = x.t().dot(&grad_q);
        let grad_w_k = x.t().dot(&grad_k);
        let grad_w_v = x.t().dot(&grad_v);

        let grad_x =
            grad_q.dot(&self.w_q.t()) + grad_k.dot(&self.w_k.t()) + grad_v.dot(&self.w_v.t());

        self.optimizer_q.step(&mut self.w_q, &grad_w_q, lr);
        self.optimizer_k.step(&mut self.w_k, &grad_w_k, lr);
        self.optimizer_v.step(&mut self.w_v, &grad_w_v, lr);

        grad_x
    }
}
