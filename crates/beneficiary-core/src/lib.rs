//! # Beneficiary Core
//!
//! The data side of the beneficiary recognizer. Generates labeled contract
//! sentences, builds word and tag vocabularies and encodes sentences into
//! padded id arrays for the model crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use beneficiary_core::{build_vocab, encode_data, generate_synthetic_data};
//!
//! let data = generate_synthetic_data(30, 42);
//! let vocab = build_vocab(&data);
//! let batch = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 20).unwrap();
//!
//! assert_eq!(batch.x.shape(), (30, 20));
//! assert_eq!(batch.y.shape(), (30, 20));
//! ```
pub mod encoder;
pub mod error;
pub mod generator;
pub mod sentence;
pub mod tags;
pub mod tokenizer;
pub mod vocab;

// Re-export primary API
pub use encoder::{DEFAULT_MAX_LEN, EncodedBatch, PaddedArray, Side, encode_data, pad_sequences};
pub use error::{NerError, Result};
pub use generator::{
    DEFAULT_NUM_SAMPLES, SentenceGenerator, TaggerState, generate_synthetic_data, tag_tokens,
};
pub use sentence::LabeledSentence;
pub use tags::{BioTag, Entity, extract_entities};
pub use tokenizer::{Token, Tokenizer};
pub use vocab::{PAD, PAD_ID, UNK, UNK_ID, Vocabularies, Vocabulary, build_vocab};
