// ===========================================================================
//  File:         embeddings.rs
//  Module:       Embedding
// ---------------------------------------------------------------------------
//  Description:
//      Token lookup table [vocab_size, embedding_dim]. The forward direction
//      gathers one row per token id; the backward direction scatters the
//      incoming gradient rows back onto the rows that were read and applies
//      an Adam step. Positional information is added separately by
//      `PositionalEncoding`.
// ===========================================================================

use ndarray::{Array2, ArrayView1};
use rand::Rng;

use crate::{
    adam::Adam,
    error::{ModelError, Result},
    math::random_normal,
};

#[derive(Debug, Clone)]
pub struct Embedding {
    /// Token embedding matrix, shape [vocab_size, embedding_dim]
    table: Array2<f32>,
    optimizer: Adam,
}

impl Embedding {
    /// Unit-variance normal initialization.
    pub fn new<R: Rng + ?Sized>(
        vocab_size: usize,
        embedding_dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let table = random_normal((vocab_size, embedding_dim), 1.0, rng)?;
        Ok(Self::from_table(table))
    }

    pub fn from_table(table: Array2<f32>) -> Self {
        let optimizer = Adam::new(table.dim());
        Self { table, optimizer }
    }

    pub fn vocab_size(&self) -> usize {
        self.table.nrows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.table.ncols()
    }

    pub fn table(&self) -> &Array2<f32> {
        &self.table
    }

    fn check_id(&self, token_id: usize) -> Result<()> {
        if token_id >= self.table.nrows() {
            return Err(ModelError::TokenOutOfRange {
                token_id,
                vocab_size: self.table.nrows(),
            });
        }
        Ok(())
    }

    /// Row of `token_id`.
    pub fn embed(&self, token_id: usize) -> Result<ArrayView1<'_, f32>> {
        self.check_id(token_id)?;
        Ok(self.table.row(token_id))
    }

    /// Gathers one row per id into a [len, embedding_dim] matrix.
    pub fn embed_sequence(&self, token_ids: &[usize]) -> Result<Array2<f32>> {
        let mut out = Array2::<f32>::zeros((token_ids.len(), self.embedding_dim()));
        for (i, &token_id) in token_ids.iter().enumerate() {
            out.row_mut(i).assign(&self.embed(token_id)?);
        }
        Ok(out)
    }

    /// Accumulates `grads` (one row per position of `token_ids`) into the
    /// table gradient and applies an Adam step.
    pub fn backward(&mut self, token_ids: &[usize], grads: &Array2<f32>, lr: f32) -> Result<()> {
        let mut table_grads = Array2::<f32>::zeros(self.table.dim());
        for (i, &token_id) in token_ids.iter().enumerate() {
            self.check_id(token_id)?;
            let mut row = table_grads.row_mut(token_id);
            row += &grads.row(i);
        }
        self.optimizer.step(&mut self.table, &table_grads, lr);
        Ok(())
    }

    pub fn parameter_count(&self) -> usize {
        self.table.len()
    }
}
