// tokenize.rs
// ============================================================================
// Note:     Word-level vocabulary with an unknown-token fallback. Text is split
//           on whitespace; every word maps to a dense id in [0, vocab_size).
// ============================================================================

#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::error::{ModelError, Result};

pub const S_UNK: &str = "<UNK>";

/// Splits `text` on whitespace and maps each word through `vocab`, using the
/// id of [`S_UNK`] for words not in the mapping.
///
/// Fails only when `vocab` itself has no `<UNK>` entry.
pub fn tokenize(text: &str, vocab: &HashMap<String, usize>) -> Result<Vec<usize>> {
    let unk = vocab
        .get(S_UNK)
        .copied()
        .ok_or_else(|| ModelError::MissingUnknownToken(S_UNK.to_string()))?;
    Ok(text
        .split_whitespace()
        .map(|word| vocab.get(word).copied().unwrap_or(unk))
        .collect())
}

/// Immutable word ↔ id table. Ids are dense and `<UNK>` is always present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    encode: HashMap<String, usize>,
    words: Vec<String>,
    unk_id: usize,
}

impl Vocabulary {
    /// Adopts an existing word → id mapping.
    ///
    /// The ids must cover `0..mapping.len()` exactly once and the mapping
    /// must contain `<UNK>`.
    pub fn from_mapping(mapping: HashMap<String, usize>) -> Result<Self> {
        let unk_id = mapping
            .get(S_UNK)
            .copied()
            .ok_or_else(|| ModelError::MissingUnknownToken(S_UNK.to_string()))?;

        let mut slots: Vec<Option<String>> = vec![None; mapping.len()];
        for (word, &id) in &mapping {
            let slot = slots.get_mut(id).ok_or_else(|| {
                ModelError::InvalidConfig(format!(
                    "id {id} of {word:?} is not below vocabulary size {}",
                    mapping.len()
                ))
            })?;
            if let Some(other) = slot {
                return Err(ModelError::InvalidConfig(format!(
                    "id {id} assigned to both {other:?} and {word:?}"
                )));
            }
            *slot = Some(word.clone());
        }
        // len(slots) == len(mapping) and no collisions, so every slot is filled
        let words = slots.into_iter().flatten().collect();

        Ok(Self {
            encode: mapping,
            words,
            unk_id,
        })
    }

    /// Builds a vocabulary from the words of `sentences` in first-seen order,
    /// followed by `<UNK>`.
    pub fn from_corpus<I, S>(sentences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut encode: HashMap<String, usize> = HashMap::new();
        let mut words: Vec<String> = Vec::new();
        for sentence in sentences {
            for word in sentence.as_ref().split_whitespace() {
                if word == S_UNK || encode.contains_key(word) {
                    continue;
                }
                encode.insert(word.to_string(), words.len());
                words.push(word.to_string());
            }
        }
        let unk_id = words.len();
        encode.insert(S_UNK.to_string(), unk_id);
        words.push(S_UNK.to_string());

        Self {
            encode,
            words,
            unk_id,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always `false`: a vocabulary holds at least `<UNK>`.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn unk_id(&self) -> usize {
        self.unk_id
    }

    pub fn id_of(&self, word: &str) -> Option<usize> {
        self.encode.get(word).copied()
    }

    pub fn word_of(&self, id: usize) -> Option<&str> {
        self.words.get(id).map(String::as_str)
    }

    pub fn mapping(&self) -> &HashMap<String, usize> {
        &self.encode
    }

    pub fn tokenize(&self, text: &str) -> Vec<usize> {
        text.split_whitespace()
            .map(|word| self.id_of(word).unwrap_or(self.unk_id))
            .collect()
    }

    /// Joins the words of `ids` with single spaces.
    pub fn decode(&self, ids: &[usize]) -> Result<String> {
        let words = ids
            .iter()
            .map(|&id| {
                self.word_of(id).ok_or(ModelError::TokenOutOfRange {
                    token_id: id,
                    vocab_size: self.len(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(words.join(" "))
    }
}
