// ===========================================================================
//  File:         llm.rs
//  Module:       Language model core
// ---------------------------------------------------------------------------
//  Purpose
//  -------
//  Owns every weight of the model and runs the pipeline
//
//      ┌──────────────────────────────────────────────────────────────┐
//      │ Embedding          token ids → [seq, D]                      │
//      ├──────────────────────────────────────────────────────────────┤
//      │ PositionalEncoding + fixed sinusoidal signal                 │
//      ├──────────────────────────────────────────────────────────────┤
//      │ TransformerBlock×N attention + FFN, residual + LayerNorm     │
//      ├──────────────────────────────────────────────────────────────┤
//      │ OutputProjection   [seq, D] → [seq, vocab] logits            │
//      └──────────────────────────────────────────────────────────────┘
//
//  Inference borrows the model immutably; `train_step` is the only
//  mutating entry point.
// ===========================================================================
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::config::{check_step_params, ModelConfig, HIDDEN_DIM};
use crate::embeddings::Embedding;
use crate::error::{ensure_dim, ModelError, Result};
use crate::layer_output_projection::OutputProjection;
use crate::layer_pos_encoding::PositionalEncoding;
use crate::math::{argmax, clip_gradients, cross_entropy_grad, cross_entropy_loss, softmax_rows};
use crate::transformer::TransformerBlock;

#[derive(Debug, Clone)]
pub struct LanguageModel {
    config: ModelConfig,
    embedding: Embedding,
    positional: PositionalEncoding,
    blocks: Vec<TransformerBlock>,
    output: OutputProjection,
}

impl LanguageModel {
    /// Builds a randomly initialized model. Initialization is reproducible
    /// when `config.seed` is set.
    pub fn new(config: ModelConfig) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, &mut rng)
    }

    pub fn with_rng<R: Rng + ?Sized>(config: ModelConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let embedding = Embedding::new(config.vocab_size, config.embedding_dim, rng)?;
        let positional = PositionalEncoding::new(config.max_seq_len, config.embedding_dim);
        let blocks = (0..config.num_layers)
            .map(|_| TransformerBlock::new(config.embedding_dim, config.hidden_dim, rng))
            .collect::<Result<Vec<_>>>()?;
        let output = OutputProjection::new(config.embedding_dim, config.vocab_size, rng)?;

        let model = Self {
            config,
            embedding,
            positional,
            blocks,
            output,
        };
        model.log_construction();
        Ok(model)
    }

    /// Assembles a model from explicit components; all widths and the
    /// vocabulary size must agree.
    pub fn from_parts(
        embedding: Embedding,
        positional: PositionalEncoding,
        blocks: Vec<TransformerBlock>,
        output: OutputProjection,
    ) -> Result<Self> {
        let d = embedding.embedding_dim();
        ensure_dim("positional encoding width", d, positional.embedding_dim())?;
        for block in &blocks {
            ensure_dim("transformer block width", d, block.embedding_dim())?;
        }
        ensure_dim("output projection width", d, output.embedding_dim())?;
        ensure_dim("output vocabulary size", embedding.vocab_size(), output.vocab_size())?;

        let config = ModelConfig {
            vocab_size: embedding.vocab_size(),
            embedding_dim: d,
            hidden_dim: blocks.first().map_or(HIDDEN_DIM, TransformerBlock::hidden_dim),
            num_layers: blocks.len(),
            max_seq_len: positional.max_seq_len(),
            seed: None,
        };
        config.validate()?;

        let model = Self {
            config,
            embedding,
            positional,
            blocks,
            output,
        };
        model.log_construction();
        Ok(model)
    }

    fn log_construction(&self) {
        debug!(
            layers = %self.network_description(),
            parameters = self.parameter_count(),
            "language model constructed"
        );
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    pub fn max_seq_len(&self) -> usize {
        self.config.max_seq_len
    }

    pub fn blocks(&self) -> &[TransformerBlock] {
        &self.blocks
    }

    pub fn network_description(&self) -> String {
        let mut parts = vec!["Embedding".to_string(), "PositionalEncoding".to_string()];
        parts.extend((0..self.blocks.len()).map(|i| format!("TransformerBlock[{i}]")));
        parts.push("OutputProjection".to_string());
        parts.join(", ")
    }

    /// Number of trainable scalars; the positional table is not counted.
    pub fn parameter_count(&self) -> usize {
        self.embedding.parameter_count()
            + self
                .blocks
                .iter()
                .map(TransformerBlock::parameter_count)
                .sum::<usize>()
            + self.output.parameter_count()
    }

    fn check_sequence(&self, token_ids: &[usize]) -> Result<()> {
        if token_ids.is_empty() {
            return Err(ModelError::EmptySequence);
        }
        if token_ids.len() > self.config.max_seq_len {
            return Err(ModelError::SequenceTooLong {
                len: token_ids.len(),
                max: self.config.max_seq_len,
            });
        }
        Ok(())
    }

    fn embed_with_positions(&self, token_ids: &[usize]) -> Result<Array2<f32>> {
        self.check_sequence(token_ids)?;
        let embedded = self.embedding.embed_sequence(token_ids)?;
        self.positional.apply(&embedded)
    }

    // ------------------------------------------------------------------------
    // Inference
    // ------------------------------------------------------------------------

    /// Logits `[seq, vocab]`, one row per input position.
    pub fn forward(&self, token_ids: &[usize]) -> Result<Array2<f32>> {
        let mut hidden = self.embed_with_positions(token_ids)?;
        for block in &self.blocks {
            hidden = block.process(&hidden)?;
        }
        self.output.forward(&hidden)
    }

    /// Greedy choice for the position after the last input token; ties go
    /// to the lowest id.
    pub fn predict_next(&self, token_ids: &[usize]) -> Result<usize> {
        let logits = self.forward(token_ids)?;
        let last = logits.row(logits.nrows() - 1);
        argmax(last).ok_or(ModelError::DimensionMismatch {
            context: "logit row",
            expected: self.config.vocab_size,
            actual: 0,
        })
    }

    /// Greedy continuation of `prompt`. Returns only the generated ids and
    /// stops early once the context fills `max_seq_len`.
    pub fn generate(&self, prompt: &[usize], max_new_tokens: usize) -> Result<Vec<usize>> {
        self.check_sequence(prompt)?;
        let mut context = prompt.to_vec();
        let mut generated = Vec::with_capacity(max_new_tokens);
        while generated.len() < max_new_tokens && context.len() < self.config.max_seq_len {
            let next = self.predict_next(&context)?;
            context.push(next);
            generated.push(next);
        }
        Ok(generated)
    }

    /// Evaluates independent sequences in parallel over the shared weights.
    pub fn forward_batch(&self, batch: &[Vec<usize>]) -> Vec<Result<Array2<f32>>> {
        batch.par_iter().map(|ids| self.forward(ids)).collect()
    }

    // ------------------------------------------------------------------------
    // Training
    // ------------------------------------------------------------------------

    /// One gradient step on next-token cross-entropy.
    ///
    /// `target_ids[i]` is the expected token after `input_ids[..=i]`. Returns
    /// the mean loss before the update.
    pub fn train_step(
        &mut self,
        input_ids: &[usize],
        target_ids: &[usize],
        lr: f32,
        clip_norm: f32,
    ) -> Result<f32> {
        check_step_params(lr, clip_norm)?;
        ensure_dim("target length", input_ids.len(), target_ids.len())?;
        if let Some(&bad) = target_ids.iter().find(|&&t| t >= self.config.vocab_size) {
            return Err(ModelError::TokenOutOfRange {
                token_id: bad,
                vocab_size: self.config.vocab_size,
            });
        }

        // forward with caches
        let mut hidden = self.embed_with_positions(input_ids)?;
        let mut caches = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let (out, cache) = block.forward_cached(&hidden)?;
            caches.push(cache);
            hidden = out;
        }
        let logits = self.output.forward(&hidden)?;

        let probs = softmax_rows(&logits);
        let loss = cross_entropy_loss(&probs, target_ids);
        let mut grads = cross_entropy_grad(&probs, target_ids);
        clip_gradients(&mut grads, clip_norm);

        // backward in reverse order
        let mut grads = self.output.backward(&hidden, &grads, lr);
        for (block, cache) in self.blocks.iter_mut().zip(caches.iter()).rev() {
            grads = block.backward(cache, &grads, lr);
        }
        // the positional signal is constant, its gradient passes through unchanged
        self.embedding.backward(input_ids, &grads, lr)?;

        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ndarray::array;
    use rand::rngs::StdRng;

    fn small_config() -> ModelConfig {
        ModelConfig::new(7, 8, 16, 2, 6).with_seed(42)
    }

    #[test]
    fn forward_yields_one_logit_row_per_position() {
        let model = LanguageModel::new(small_config()).unwrap();
        let logits = model.forward(&[0, 1, 2]).unwrap();
        assert_eq!(logits.dim(), (3, 7));
    }

    #[test]
    fn same_seed_gives_same_model() {
        let a = LanguageModel::new(small_config()).unwrap();
        let b = LanguageModel::new(small_config()).unwrap();
        assert_eq!(a.forward(&[3, 4]).unwrap(), b.forward(&[3, 4]).unwrap());
    }

    #[test]
    fn forward_is_deterministic() {
        let model = LanguageModel::new(small_config()).unwrap();
        let first = model.forward(&[5, 0, 6]).unwrap();
        assert_eq!(model.forward(&[5, 0, 6]).unwrap(), first);
        let next = model.predict_next(&[5, 0, 6]).unwrap();
        assert_eq!(model.predict_next(&[5, 0, 6]).unwrap(), next);
    }

    #[test]
    fn error_kinds_for_bad_inputs() {
        let model = LanguageModel::new(small_config()).unwrap();
        assert_eq!(model.forward(&[]).unwrap_err().kind(), ErrorKind::Precondition);
        assert_eq!(model.forward(&[7]).unwrap_err().kind(), ErrorKind::Index);
        assert_eq!(
            model.forward(&[0; 7]).unwrap_err(),
            ModelError::SequenceTooLong { len: 7, max: 6 }
        );
    }

    fn model_with_output_bias(bias: Array2<f32>) -> LanguageModel {
        let mut rng = StdRng::seed_from_u64(0);
        let vocab = bias.ncols();
        LanguageModel::from_parts(
            Embedding::new(vocab, 4, &mut rng).unwrap(),
            PositionalEncoding::new(8, 4),
            vec![TransformerBlock::new(4, 8, &mut rng).unwrap()],
            OutputProjection::from_weights(Array2::zeros((4, vocab)), bias).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn predict_next_breaks_ties_to_lowest_index() {
        let model = model_with_output_bias(array![[0.0f32, 3.0, 3.0, 1.0]]);
        assert_eq!(model.predict_next(&[0, 2]).unwrap(), 1);

        let flat = model_with_output_bias(Array2::zeros((1, 5)));
        assert_eq!(flat.predict_next(&[4]).unwrap(), 0);
    }

    #[test]
    fn from_parts_validates_dimensions() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = LanguageModel::from_parts(
            Embedding::new(5, 4, &mut rng).unwrap(),
            PositionalEncoding::new(8, 4),
            vec![],
            OutputProjection::new(4, 6, &mut rng).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::DimensionMismatch { .. }));

        let err = LanguageModel::from_parts(
            Embedding::new(5, 4, &mut rng).unwrap(),
            PositionalEncoding::new(8, 3),
            vec![],
            OutputProjection::new(4, 5, &mut rng).unwrap(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn generate_stops_at_context_limit() {
        let model = LanguageModel::new(small_config()).unwrap();
        let out = model.generate(&[0, 1], 10).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|&t| t < 7));
        assert!(model.generate(&[0], 0).unwrap().is_empty());
    }

    #[test]
    fn batch_matches_individual_forward() {
        let model = LanguageModel::new(small_config()).unwrap();
        let batch = vec![vec![0, 1, 2], vec![3], vec![], vec![6, 5, 4, 3]];
        let results = model.forward_batch(&batch);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap(), &model.forward(&[0, 1, 2]).unwrap());
        assert_eq!(results[1].as_ref().unwrap(), &model.forward(&[3]).unwrap());
        assert_eq!(results[2].as_ref().unwrap_err(), &ModelError::EmptySequence);
        assert_eq!(results[3].as_ref().unwrap().dim(), (4, 7));
    }

    #[test]
    fn description_and_parameter_count() {
        let model = LanguageModel::new(ModelConfig::new(7, 16, 32, 2, 8).with_seed(1)).unwrap();
        assert_eq!(
            model.network_description(),
            "Embedding, PositionalEncoding, TransformerBlock[0], TransformerBlock[1], OutputProjection"
        );
        let per_block = 3 * 16 * 16 + (16 * 32 + 32 + 32 * 16 + 16) + 2 * (2 * 16);
        let expected = 7 * 16 + 2 * per_block + (16 * 7 + 7);
        assert_eq!(model.parameter_count(), expected);
    }

    #[test]
    fn train_step_validates_targets() {
        let mut model = LanguageModel::new(small_config()).unwrap();
        assert!(matches!(
            model.train_step(&[0, 1], &[1], 0.01, 5.0),
            Err(ModelError::DimensionMismatch { .. })
        ));
        assert_eq!(
            model.train_step(&[0, 1], &[1, 9], 0.01, 5.0).unwrap_err().kind(),
            ErrorKind::Index
        );
    }

    #[test]
    fn train_step_rejects_bad_step_params() {
        let mut model = LanguageModel::new(small_config()).unwrap();
        let before = model.forward(&[0, 1, 2]).unwrap();
        for (lr, clip) in [(0.01, -5.0), (0.01, f32::NAN), (0.0, 5.0), (f32::INFINITY, 5.0)] {
            let err = model.train_step(&[0, 1, 2], &[1, 2, 3], lr, clip).unwrap_err();
            assert!(matches!(err, ModelError::InvalidConfig(_)), "lr {lr} clip {clip}");
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
        // rejected steps leave the weights untouched
        assert_eq!(model.forward(&[0, 1, 2]).unwrap(), before);
    }

    #[test]
    fn blocks_follow_config() {
        let model = LanguageModel::new(small_config()).unwrap();
        assert_eq!(model.config(), &small_config());
        assert_eq!(model.blocks().len(), model.config().num_layers);
        for block in model.blocks() {
            assert_eq!(block.attention().embedding_dim(), 8);
            assert_eq!(block.hidden_dim(), 16);
        }
    }

    #[test]
    fn repeated_steps_reduce_loss() {
        let mut model = LanguageModel::new(small_config()).unwrap();
        let first = model.train_step(&[0, 1, 2], &[1, 2, 3], 0.01, 5.0).unwrap();
        let mut last = first;
        for _ in 0..30 {
            last = model.train_step(&[0, 1, 2], &[1, 2, 3], 0.01, 5.0).unwrap();
        }
        assert!(last < first, "loss went from {first} to {last}");
    }
}
