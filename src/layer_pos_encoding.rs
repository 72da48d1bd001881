/***********************************************************************
*  layer_pos_encoding.rs  –  fixed sinusoidal position signal
***********************************************************************/
use ndarray::{Array2, ArrayView1};

use crate::error::{ensure_dim, ModelError, Result};

/// Precomputed table `[max_seq_len, embedding_dim]`; never trained.
///
/// For column `2k` and `2k + 1` of row `pos` the angle is
/// `pos / 10000^(2k / D)`; even columns hold its sine, odd columns its cosine.
#[derive(Debug, Clone)]
pub struct PositionalEncoding {
    table: Array2<f32>,
}

impl PositionalEncoding {
    pub fn new(max_seq_len: usize, embedding_dim: usize) -> Self {
        let d = embedding_dim as f64;
        let table = Array2::from_shape_fn((max_seq_len, embedding_dim), |(pos, i)| {
            let pair = (i - i % 2) as f64; // 2k for both members of the pair
            let angle = pos as f64 / 10000f64.powf(pair / d);
            let value = if i % 2 == 0 { angle.sin() } else { angle.cos() };
            value as f32
        });
        Self { table }
    }

    pub fn max_seq_len(&self) -> usize {
        self.table.nrows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.table.ncols()
    }

    /// Signal for a single position.
    pub fn encode(&self, position: usize) -> Result<ArrayView1<'_, f32>> {
        if position >= self.max_seq_len() {
            return Err(ModelError::SequenceTooLong {
                len: position + 1,
                max: self.max_seq_len(),
            });
        }
        Ok(self.table.row(position))
    }

    /// Adds `encode(p)` to row `p` of `input`.
    ///
    /// Longer inputs than the table are rejected rather than truncated.
    pub fn apply(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        let (seq_len, dim) = input.dim();
        ensure_dim("positional encoding width", self.embedding_dim(), dim)?;
        if seq_len > self.max_seq_len() {
            return Err(ModelError::SequenceTooLong {
                len: seq_len,
                max: self.max_seq_len(),
            });
        }
        let signal = self.table.slice(ndarray::s![0..seq_len, ..]);
        Ok(input + &signal)
    }
}
