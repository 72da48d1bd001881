// train.rs
// ============================================================================
// Epoch loop over next-token pairs: input = seq[..n-1], target = seq[1..].
// ============================================================================

use std::time::Instant;

use tracing::{info, warn};

use crate::config::TrainConfig;
use crate::error::Result;
use crate::llm::LanguageModel;

/// Splits `tokens` into windows of at most `window` ids, consecutive windows
/// sharing `overlap` ids so no next-token pair is lost at a boundary.
pub fn chunk_sequence(tokens: &[usize], window: usize, overlap: usize) -> Vec<Vec<usize>> {
    if window == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(window - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < tokens.len() {
        let end = usize::min(start + window, tokens.len());
        chunks.push(tokens[start..end].to_vec());
        if end == tokens.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    /// Mean loss of every step in the epoch, one entry per epoch.
    pub epoch_losses: Vec<f32>,
    /// Gradient steps taken per epoch.
    pub steps_per_epoch: usize,
    pub skipped_sequences: usize,
}

impl TrainReport {
    pub fn first_loss(&self) -> Option<f32> {
        self.epoch_losses.first().copied()
    }

    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }
}

#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn train(
        &self,
        model: &mut LanguageModel,
        sequences: &[Vec<usize>],
    ) -> Result<TrainReport> {
        // a window of max_seq_len + 1 ids yields max_seq_len training pairs
        let window = model.max_seq_len() + 1;
        let overlap = (window / 5).max(1);

        let mut report = TrainReport::default();
        let mut windows: Vec<Vec<usize>> = Vec::new();
        for (index, sequence) in sequences.iter().enumerate() {
            if sequence.len() < 2 {
                warn!(index, len = sequence.len(), "skipping sequence shorter than two tokens");
                report.skipped_sequences += 1;
                continue;
            }
            windows.extend(
                chunk_sequence(sequence, window, overlap)
                    .into_iter()
                    .filter(|chunk| chunk.len() >= 2),
            );
        }
        report.steps_per_epoch = windows.len();

        if windows.is_empty() {
            warn!("no trainable sequences, nothing to do");
            return Ok(report);
        }

        for epoch in 0..self.config.epochs {
            let started = Instant::now();
            let mut total_loss = 0.0f32;
            let mut tokens = 0usize;

            for chunk in &windows {
                let (input_ids, target_ids) = (&chunk[..chunk.len() - 1], &chunk[1..]);
                total_loss += model.train_step(
                    input_ids,
                    target_ids,
                    self.config.learning_rate,
                    self.config.clip_norm,
                )?;
                tokens += target_ids.len();
            }

            let mean_loss = total_loss / windows.len() as f32;
            let secs = started.elapsed().as_secs_f32().max(1e-6);
            info!(
                epoch,
                loss = mean_loss,
                tokens_per_sec = tokens as f32 / secs,
                "epoch finished"
            );
            report.epoch_losses.push(mean_loss);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::error::ModelError;

    #[test]
    fn short_sequences_fit_in_one_chunk() {
        assert_eq!(chunk_sequence(&[1, 2, 3], 5, 1), vec![vec![1, 2, 3]]);
        assert!(chunk_sequence(&[], 5, 1).is_empty());
    }

    #[test]
    fn long_sequences_overlap() {
        let tokens: Vec<usize> = (0..10).collect();
        let chunks = chunk_sequence(&tokens, 4, 1);
        assert_eq!(
            chunks,
            vec![vec![0, 1, 2, 3], vec![3, 4, 5, 6], vec![6, 7, 8, 9]]
        );
    }

    #[test]
    fn overlap_is_capped_below_window() {
        let chunks = chunk_sequence(&[0, 1, 2, 3], 2, 5);
        assert_eq!(chunks, vec![vec![0, 1], vec![1, 2], vec![2, 3]]);
    }

    #[test]
    fn invalid_learning_rate_is_rejected() {
        let cfg = TrainConfig {
            learning_rate: 0.0,
            ..TrainConfig::default()
        };
        assert!(matches!(Trainer::new(cfg), Err(ModelError::InvalidConfig(_))));

        let trainer = Trainer::new(TrainConfig::default()).unwrap();
        assert_eq!(trainer.config(), &TrainConfig::default());
    }

    #[test]
    fn skipped_sequences_are_counted() {
        let mut model = LanguageModel::new(ModelConfig::new(4, 4, 8, 1, 8).with_seed(3)).unwrap();
        let trainer = Trainer::new(TrainConfig {
            epochs: 2,
            ..TrainConfig::default()
        })
        .unwrap();
        let report = trainer.train(&mut model, &[vec![1], vec![], vec![0, 1, 2]]).unwrap();
        assert_eq!(report.skipped_sequences, 2);
        assert_eq!(report.steps_per_epoch, 1);
        assert_eq!(report.epoch_losses.len(), 2);

        let empty = trainer.train(&mut model, &[vec![3]]).unwrap();
        assert!(empty.epoch_losses.is_empty());
    }

    #[test]
    fn sequences_longer_than_context_are_windowed() {
        let mut model = LanguageModel::new(ModelConfig::new(5, 4, 8, 1, 4).with_seed(3)).unwrap();
        let trainer = Trainer::new(TrainConfig {
            epochs: 1,
            ..TrainConfig::default()
        })
        .unwrap();
        let long: Vec<usize> = (0..12).map(|i| i % 5).collect();
        let report = trainer.train(&mut model, &[long]).unwrap();
        assert!(report.steps_per_epoch > 1);
        assert!(report.final_loss().unwrap().is_finite());
    }

    #[test]
    fn loss_decreases_over_epochs() {
        let mut model = LanguageModel::new(ModelConfig::new(6, 8, 16, 1, 8).with_seed(11)).unwrap();
        let trainer = Trainer::new(TrainConfig {
            epochs: 40,
            ..TrainConfig::default()
        })
        .unwrap();
        let report = trainer
            .train(&mut model, &[vec![0, 1, 2, 3, 4], vec![2, 3, 4, 0, 1]])
            .unwrap();
        assert!(report.final_loss().unwrap() < report.first_loss().unwrap());
    }

    #[test]
    fn out_of_range_tokens_abort_training() {
        let mut model = LanguageModel::new(ModelConfig::new(3, 4, 8, 1, 8).with_seed(1)).unwrap();
        let trainer = Trainer::new(TrainConfig::default()).unwrap();
        let err = trainer.train(&mut model, &[vec![0, 1, 7]]).unwrap_err();
        assert!(matches!(err, ModelError::TokenOutOfRange { token_id: 7, .. }));
    }
}
