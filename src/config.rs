// src/config.rs
// Central hyperparameters (one place for all defaults) plus the serde run
// configuration read by the binary.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub const MAX_SEQ_LEN: usize = 32; // upper bound for the positional table
pub const EMBEDDING_DIM: usize = 16; // width of token vectors
pub const HIDDEN_DIM: usize = 32; // feed-forward hidden width
pub const NUM_LAYERS: usize = 2;

pub const EPOCHS: usize = 100;
pub const LEARN_RATE: f32 = 1e-2;
pub const CLIP_NORM: f32 = 5.0;

pub const DEFAULT_CORPUS: [&str; 2] = [
    "hello world what are you doing",
    "what are you doing hello world",
];
pub const DEFAULT_PROMPT: &str = "hello world what are you";

/// Shape of a [`LanguageModel`](crate::llm::LanguageModel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub max_seq_len: usize,
    /// Seed for weight initialization; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 7,
            embedding_dim: EMBEDDING_DIM,
            hidden_dim: HIDDEN_DIM,
            num_layers: NUM_LAYERS,
            max_seq_len: MAX_SEQ_LEN,
            seed: None,
        }
    }
}

impl ModelConfig {
    pub fn new(
        vocab_size: usize,
        embedding_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        max_seq_len: usize,
    ) -> Self {
        Self {
            vocab_size,
            embedding_dim,
            hidden_dim,
            num_layers,
            max_seq_len,
            seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Every dimension must be positive. Zero layers is allowed and reduces
    /// the model to embedding + projection.
    pub fn validate(&self) -> Result<(), ModelError> {
        let checks = [
            (self.vocab_size, "vocab_size"),
            (self.embedding_dim, "embedding_dim"),
            (self.hidden_dim, "hidden_dim"),
            (self.max_seq_len, "max_seq_len"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ModelError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

/// Optimizer settings of the [`Trainer`](crate::train::Trainer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub learning_rate: f32,
    /// Global L2 norm the output gradient is clipped to.
    pub clip_norm: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: EPOCHS,
            learning_rate: LEARN_RATE,
            clip_norm: CLIP_NORM,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        check_step_params(self.learning_rate, self.clip_norm)
    }
}

/// Both values must be finite and strictly positive.
pub(crate) fn check_step_params(learning_rate: f32, clip_norm: f32) -> Result<(), ModelError> {
    for (value, name) in [(learning_rate, "learning_rate"), (clip_norm, "clip_norm")] {
        if !(value.is_finite() && value > 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "{name} must be positive, got {value}"
            )));
        }
    }
    Ok(())
}

/// Everything the binary needs for one train-then-predict run.
///
/// `model.vocab_size` is overwritten with the size of the vocabulary built
/// from `corpus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub training: TrainConfig,
    pub corpus: Vec<String>,
    pub prompt: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            training: TrainConfig::default(),
            corpus: DEFAULT_CORPUS.iter().map(|s| s.to_string()).collect(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("cannot parse config file {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(raw).context("invalid run configuration")?;
        config.training.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_toy_example() {
        let cfg = ModelConfig::default();
        assert_eq!(cfg.embedding_dim, 16);
        assert_eq!(cfg.hidden_dim, 32);
        assert_eq!(cfg.num_layers, 2);
        assert!(cfg.validate().is_ok());
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let cfg = ModelConfig::new(7, 0, 32, 2, 8);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig(ref m) if m.contains("embedding_dim")));
    }

    #[test]
    fn step_params_must_be_finite_and_positive() {
        assert!(check_step_params(0.01, 5.0).is_ok());
        assert!(check_step_params(0.01, -5.0).is_err());
        assert!(check_step_params(0.01, f32::NAN).is_err());
        assert!(check_step_params(-0.01, 5.0).is_err());
    }

    #[test]
    fn bad_learning_rate_is_rejected() {
        let cfg = TrainConfig {
            learning_rate: -1.0,
            ..TrainConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = RunConfig::from_json_str(
            r#"{ "model": { "embedding_dim": 8, "seed": 7 }, "training": { "epochs": 3 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.model.embedding_dim, 8);
        assert_eq!(cfg.model.hidden_dim, HIDDEN_DIM);
        assert_eq!(cfg.model.seed, Some(7));
        assert_eq!(cfg.training.epochs, 3);
        assert_eq!(cfg.corpus.len(), 2);
        assert_eq!(cfg.prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn json_file_round_trip() {
        let mut path = std::env::temp_dir();
        path.push(format!("tiny_transformer_cfg_{}.json", std::process::id()));
        let cfg = RunConfig::default();
        std::fs::write(&path, serde_json::to_string(&cfg).unwrap()).unwrap();
        let loaded = RunConfig::from_json_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = RunConfig::from_json_file("/nonexistent/tiny.json").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/tiny.json"));
    }
}
