// =============================================
// lib.rs
// =============================================
pub mod adam;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod math;
pub mod tokenize;

pub mod feed_forward;
pub mod layer_norm;

pub mod layer_output_projection;
pub mod layer_pos_encoding;
pub mod layer_self_attention;

pub mod llm;
pub mod train;
pub mod transformer;

// Re-export key structs for easier access
pub use config::{ModelConfig, RunConfig, TrainConfig};
pub use embeddings::Embedding;
pub use error::{ErrorKind, ModelError, Result};
pub use layer_pos_encoding::PositionalEncoding;
pub use layer_self_attention::SelfAttention;
pub use llm::LanguageModel;
pub use tokenize::{tokenize, Vocabulary, S_UNK};
pub use train::{TrainReport, Trainer};
pub use transformer::TransformerBlock;
