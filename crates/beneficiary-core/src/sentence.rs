use serde::{Deserialize, Serialize};

use crate::error::{NerError, Result};

/// A tokenized sentence with one tag per token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSentence {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
}

impl LabeledSentence {
    /// Pair tokens with tags, rejecting sequences of different lengths.
    pub fn new(tokens: Vec<String>, tags: Vec<String>) -> Result<Self> {
        let sentence = Self { tokens, tags };
        sentence.validate(0)?;
        Ok(sentence)
    }

    /// Check the token/tag length invariant. `index` locates the sentence
    /// in its corpus for the error report.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.tokens.len() != self.tags.len() {
            return Err(NerError::LengthMismatch {
                index,
                tokens: self.tokens.len(),
                tags: self.tags.len(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate over `(token, tag)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tokens
            .iter()
            .map(String::as_str)
            .zip(self.tags.iter().map(String::as_str))
    }
}

/// Build a sentence from string slices. Test fixtures use this heavily.
impl<'a, 'b> TryFrom<(&'b [&'a str], &'b [&'a str])> for LabeledSentence {
    type Error = NerError;

    fn try_from((tokens, tags): (&'b [&'a str], &'b [&'a str])) -> Result<Self> {
        Self::new(
            tokens.iter().map(|t| t.to_string()).collect(),
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }
}
