// error.rs
// ============================================================================
// Note:     Error taxonomy of the model core. Every fallible operation of the
//           numeric pipeline returns `ModelError`; callers separate the three
//           failure classes through `ModelError::kind()`.
// ============================================================================

use thiserror::Error;

/// Failure class of a [`ModelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inconsistent vocabulary, dimensions, lengths or hyperparameters.
    Configuration,
    /// Token id outside `[0, vocab_size)`.
    Index,
    /// Input violates a precondition of the computation (empty sequence).
    Precondition,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("vocabulary has no entry for the unknown token {0:?}")]
    MissingUnknownToken(String),

    #[error("sequence length {len} exceeds maximum {max}")]
    SequenceTooLong { len: usize, max: usize },

    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("token id {token_id} out of range for vocabulary size {vocab_size}")]
    TokenOutOfRange { token_id: usize, vocab_size: usize },

    #[error("empty input sequence")]
    EmptySequence,
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::MissingUnknownToken(_)
            | ModelError::SequenceTooLong { .. }
            | ModelError::DimensionMismatch { .. }
            | ModelError::InvalidConfig(_) => ErrorKind::Configuration,
            ModelError::TokenOutOfRange { .. } => ErrorKind::Index,
            ModelError::EmptySequence => ErrorKind::Precondition,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Fails with `DimensionMismatch` unless `actual == expected`.
pub(crate) fn ensure_dim(context: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ModelError::DimensionMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}
