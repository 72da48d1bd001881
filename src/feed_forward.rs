// ===========================================================================
//  File:         feed_forward.rs
//  Module:       FeedForward layer
// ---------------------------------------------------------------------------
//  Description:
//      Position-wise two-layer network
//
//          1) Linear     :  input · w1 + b1      (D → hidden)
//          2) Activation :  ReLU
//          3) Linear     :  hidden · w2 + b2     (hidden → D)
//
//      The residual connection around it belongs to `TransformerBlock`.
//      Weights use He initialisation; biases start at zero.
// ===========================================================================

use ndarray::{Array2, Axis};
use rand::Rng;

use crate::adam::Adam;
use crate::error::{ensure_dim, Result};
use crate::math::{he_std, random_normal};

#[derive(Debug, Clone)]
pub struct FeedForward {
    w1: Array2<f32>, // [embedding_dim, hidden_dim]
    b1: Array2<f32>, // [1, hidden_dim]
    w2: Array2<f32>, // [hidden_dim, embedding_dim]
    b2: Array2<f32>, // [1, embedding_dim]

    optimizer_w1: Adam,
    optimizer_b1: Adam,
    optimizer_w2: Adam,
    optimizer_b2: Adam,
}

/// Forward intermediates kept for [`FeedForward::backward`].
#[derive(Debug, Clone)]
pub struct FeedForwardCache {
    input: Array2<f32>,
    hidden_pre_activation: Array2<f32>,
    hidden_post_activation: Array2<f32>,
}

impl FeedForward {
    pub fn new<R: Rng + ?Sized>(
        embedding_dim: usize,
        hidden_dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let w1 = random_normal((embedding_dim, hidden_dim), he_std(embedding_dim), rng)?;
        let w2 = random_normal((hidden_dim, embedding_dim), he_std(hidden_dim), rng)?;
        Self::from_weights(
            w1,
            Array2::zeros((1, hidden_dim)),
            w2,
            Array2::zeros((1, embedding_dim)),
        )
    }

    pub fn from_weights(
        w1: Array2<f32>,
        b1: Array2<f32>,
        w2: Array2<f32>,
        b2: Array2<f32>,
    ) -> Result<Self> {
        let (embedding_dim, hidden_dim) = w1.dim();
        ensure_dim("feed-forward b1 rows", 1, b1.nrows())?;
        ensure_dim("feed-forward b1 width", hidden_dim, b1.ncols())?;
        ensure_dim("feed-forward w2 rows", hidden_dim, w2.nrows())?;
        ensure_dim("feed-forward w2 width", embedding_dim, w2.ncols())?;
        ensure_dim("feed-forward b2 rows", 1, b2.nrows())?;
        ensure_dim("feed-forward b2 width", embedding_dim, b2.ncols())?;

        Ok(FeedForward {
            optimizer_w1: Adam::new(w1.dim()),
            optimizer_b1: Adam::new(b1.dim()),
            optimizer_w2: Adam::new(w2.dim()),
            optimizer_b2: Adam::new(b2.dim()),
            w1,
            b1,
            w2,
            b2,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.w1.nrows()
    }

    pub fn hidden_dim(&self) -> usize {
        self.w1.ncols()
    }

    pub fn parameter_count(&self) -> usize {
        self.w1.len() + self.b1.len() + self.w2.len() + self.b2.len()
    }

    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        self.forward_cached(input).map(|(out, _)| out)
    }

    pub fn forward_cached(&self, input: &Array2<f32>) -> Result<(Array2<f32>, FeedForwardCache)> {
        ensure_dim("feed-forward input width", self.embedding_dim(), input.ncols())?;

        let hidden_pre = input.dot(&self.w1) + &self.b1;
        let hidden_post = hidden_pre.mapv(|x| x.max(0.0));
        let output = hidden_post.dot(&self.w2) + &self.b2;

        Ok((
            output,
            FeedForwardCache {
                input: input.clone(),
                hidden_pre_activation: hidden_pre,
                hidden_post_activation: hidden_post,
            },
        ))
    }

    /// Returns the gradient with respect to the layer input (without the
    /// residual path) and applies an Adam step to all four parameters.
    pub fn backward(
        &mut self,
        cache: &FeedForwardCache,
        grads: &Array2<f32>,
        lr: f32,
    ) -> Array2<f32> {
        // 1) dL/dW2 and dL/db2
        let grad_w2 = cache.hidden_post_activation.t().dot(grads);
        let grad_b2 = grads.sum_axis(Axis(0)).insert_axis(Axis(0));

        // 2) back through ReLU
        let relu_grad = cache
            .hidden_pre_activation
            .mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
        let grad_hidden_pre = grads.dot(&self.w2.t()) * relu_grad;

        // 3) dL/dW1 and dL/db1
        let grad_w1 = cache.input.t().dot(&grad_hidden_pre);
        let grad_b1 = grad_hidden_pre.sum_axis(Axis(0)).insert_axis(Axis(0));

        let grad_input = grad_hidden_pre.dot(&self.w1.t());

        self.optimizer_w2.step(&mut self.w2, &grad_w2, lr);
        self.optimizer_b2.step(&mut self.b2, &grad_b2, lr);
        self.optimizer_w1.step(&mut self.w1, &grad_w1, lr);
        self.optimizer_b1.step(&mut self.b1, &grad_b1, lr);

        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn relu_clips_negative_hidden_units() {
        // hidden = [x0 - x1, x1 - x0]; output = sum of ReLU(hidden) in both columns
        let ff = FeedForward::from_weights(
            array![[1.0f32, -1.0], [-1.0, 1.0]],
            Array2::zeros((1, 2)),
            array![[1.0f32, 1.0], [1.0, 1.0]],
            array![[0.5f32, 0.0]],
        )
        .unwrap();
        let y = ff.forward(&array![[3.0f32, 1.0], [0.0, 0.0]]).unwrap();
        assert_eq!(y, array![[2.5f32, 2.0], [0.5, 0.0]]);
    }

    #[test]
    fn shape_is_preserved() {
        let mut rng = StdRng::seed_from_u64(2);
        let ff = FeedForward::new(16, 32, &mut rng).unwrap();
        assert_eq!(ff.hidden_dim(), 32);
        assert_eq!(ff.forward(&Array2::zeros((5, 16))).unwrap().dim(), (5, 16));
        assert_eq!(ff.parameter_count(), 16 * 32 + 32 + 32 * 16 + 16);
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let err = FeedForward::from_weights(
            Array2::zeros((4, 8)),
            Array2::zeros((1, 8)),
            Array2::zeros((8, 3)),
            Array2::zeros((1, 4)),
        );
        assert!(err.is_err());
    }

    #[test]
    fn training_step_reduces_squared_error() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut ff = FeedForward::new(3, 6, &mut rng).unwrap();
        let x = array![[1.0f32, 0.5, -0.5], [0.0, 1.0, 1.0]];
        let target = array![[0.2f32, -0.1, 0.4], [0.0, 0.3, -0.2]];
        let loss = |ff: &FeedForward| {
            let d = ff.forward(&x).unwrap() - &target;
            d.mapv(|v| v * v).sum()
        };

        let before = loss(&ff);
        for _ in 0..50 {
            let (y, cache) = ff.forward_cached(&x).unwrap();
            let grads = (y - &target) * 2.0;
            ff.backward(&cache, &grads, 0.01);
        }
        assert!(loss(&ff) < before);
    }
}
