// =============================================
// transformer.rs
// =============================================
use ndarray::Array2;
use rand::Rng;

use crate::error::{ensure_dim, Result};
use crate::feed_forward::{FeedForward, FeedForwardCache};
use crate::layer_norm::{LayerNorm, LayerNormCache};
use crate::layer_self_attention::{AttentionCache, SelfAttention};

/// Post-norm block: `x1 = norm1(x + attn(x))`, `out = norm2(x1 + ffn(x1))`.
#[derive(Debug, Clone)]
pub struct TransformerBlock {
    attention: SelfAttention,
    feed_forward: FeedForward,
    norm1: LayerNorm,
    norm2: LayerNorm,
}

#[derive(Debug, Clone)]
pub struct BlockCache {
    attention: AttentionCache,
    norm1: LayerNormCache,
    feed_forward: FeedForwardCache,
    norm2: LayerNormCache,
}

impl TransformerBlock {
    pub fn new<R: Rng + ?Sized>(
        embedding_dim: usize,
        hidden_dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(TransformerBlock {
            attention: SelfAttention::new(embedding_dim, rng)?,
            feed_forward: FeedForward::new(embedding_dim, hidden_dim, rng)?,
            norm1: LayerNorm::new(embedding_dim),
            norm2: LayerNorm::new(embedding_dim),
        })
    }

    pub fn from_parts(
        attention: SelfAttention,
        feed_forward: FeedForward,
        norm1: LayerNorm,
        norm2: LayerNorm,
    ) -> Result<Self> {
        let d = attention.embedding_dim();
        ensure_dim("block feed-forward width", d, feed_forward.embedding_dim())?;
        ensure_dim("block norm1 width", d, norm1.embedding_dim())?;
        ensure_dim("block norm2 width", d, norm2.embedding_dim())?;
        Ok(TransformerBlock {
            attention,
            feed_forward,
            norm1,
            norm2,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.attention.embedding_dim()
    }

    pub fn hidden_dim(&self) -> usize {
        self.feed_forward.hidden_dim()
    }

    pub fn attention(&self) -> &SelfAttention {
        &self.attention
    }

    pub fn parameter_count(&self) -> usize {
        self.attention.parameter_count()
            + self.feed_forward.parameter_count()
            + self.norm1.parameter_count()
            + self.norm2.parameter_count()
    }

    pub fn process(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        self.forward_cached(input).map(|(out, _)| out)
    }

    pub fn forward_cached(&self, input: &Array2<f32>) -> Result<(Array2<f32>, BlockCache)> {
        let (attended, attention) = self.attention.forward_cached(input)?;
        let (x1, norm1) = self.norm1.forward_cached(&(input + &attended))?;

        let (forwarded, feed_forward) = self.feed_forward.forward_cached(&x1)?;
        let (out, norm2) = self.norm2.forward_cached(&(&x1 + &forwarded))?;

        Ok((
            out,
            BlockCache {
                attention,
                norm1,
                feed_forward,
                norm2,
            },
        ))
    }

    pub fn backward(&mut self, cache: &BlockCache, grads: &Array2<f32>, lr: f32) -> Array2<f32> {
        // out = norm2(x1 + ffn(x1))
        let grad_sum2 = self.norm2.backward(&cache.norm2, grads, lr);
        let grad_x1 = self.feed_forward.backward(&cache.feed_forward, &grad_sum2, lr) + &grad_sum2;

        // x1 = norm1(x + attn(x))
        let grad_sum1 = self.norm1.backward(&cache.norm1, &grad_x1, lr);
        self.attention.backward(&cache.attention, &grad_sum1, lr) + &grad_sum1
    }
}
