//! # Whitespace Tokenizer
//!
//! Splits contract sentences into tokens for sequence labeling. Punctuation
//! stays attached to its word (`Dupont.`), which the generator's tagger and
//! the vocabulary both rely on.

/// A token extracted from a sentence with positional information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text content
    pub text: String,
    /// Start byte offset in the original string
    pub start: usize,
    /// End byte offset in the original string
    pub end: usize,
}

/// Tokenizer splitting on Unicode whitespace.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer;

impl Tokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Self {
        Self
    }

    /// Tokenize a sentence into a sequence of tokens.
    ///
    /// # Examples
    /// ```
    /// use beneficiary_core::tokenizer::Tokenizer;
    ///
    /// let tokens = Tokenizer::new().tokenize("En cas de décès, Jean Dupont recevra la somme.");
    /// assert_eq!(tokens.len(), 9);
    /// assert_eq!(tokens[3].text, "décès,");
    /// ```
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut current_start: Option<usize> = None;

        for (idx, c) in input.char_indices() {
            if c.is_whitespace() {
                if let Some(start) = current_start.take() {
                    tokens.push(Token {
                        text: input[start..idx].to_string(),
                        start,
                        end: idx,
                    });
                }
            } else if current_start.is_none() {
                current_start = Some(idx);
            }
        }

        if let Some(start) = current_start {
            tokens.push(Token {
                text: input[start..].to_string(),
                start,
                end: input.len(),
            });
        }

        tokens
    }

    /// Tokenize and keep only the token texts.
    pub fn words(&self, input: &str) -> Vec<String> {
        self.tokenize(input).into_iter().map(|t| t.text).collect()
    }
}
