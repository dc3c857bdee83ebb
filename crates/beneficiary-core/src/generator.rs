//! # Synthetic Sentence Generator
//!
//! Produces labeled contract sentences by inserting a beneficiary name into
//! a sentence template, splitting on whitespace and tagging the tokens with a
//! substring-matching heuristic.
//!
//! The heuristic is kept exactly as the training data expects it, including
//! its blind spots: the given name and the family name must sit in distinct,
//! consecutive tokens. A single-token name never gets an `I-ENTITY` tag, and
//! a family name appearing before the given name is left as `O`.

use oorandom::Rand32;
use tracing::debug;

use crate::error::{NerError, Result};
use crate::sentence::LabeledSentence;
use crate::tags::BioTag;
use crate::tokenizer::Tokenizer;

/// Sample count used when the caller has no preference.
pub const DEFAULT_NUM_SAMPLES: usize = 10;

/// Fictitious beneficiaries.
pub const BENEFICIARIES: &[&str] = &["Jean Dupont", "Marie Durant", "Paul Martin"];

/// Sentence templates with a single `{}` insertion point.
pub const TEMPLATES: &[&str] = &[
    "Le bénéficiaire du contrat est {}.",
    "Ce contrat d'assurance vie a pour bénéficiaire {}.",
    "En cas de décès, {} recevra la somme.",
];

const SLOT: &str = "{}";

/// Progress of the tagger through one sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggerState {
    /// No given name seen yet.
    SeekingStart,
    /// Given name tagged, waiting for the family name.
    InsideEntity,
    /// Family name tagged. A later given name starts a new entity.
    Done,
}

/// Tag `tokens` for the beneficiary `name`.
///
/// The first token containing the given name is `B-ENTITY`; while inside the
/// entity, the next token containing (or equal to) the family name is
/// `I-ENTITY`; everything else is `O`.
pub fn tag_tokens<S: AsRef<str>>(tokens: &[S], name: &str) -> Vec<BioTag> {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or("");
    let last = parts.next_back().unwrap_or(first);

    let mut state = TaggerState::SeekingStart;
    let mut tags = Vec::with_capacity(tokens.len());

    for token in tokens {
        let token = token.as_ref();
        let tag = match state {
            TaggerState::SeekingStart | TaggerState::Done if token.contains(first) => {
                state = TaggerState::InsideEntity;
                BioTag::Begin
            }
            TaggerState::InsideEntity if token.contains(last) || token == last => {
                state = TaggerState::Done;
                BioTag::Inside
            }
            _ => BioTag::Outside,
        };
        tags.push(tag);
    }

    tags
}

/// Template-based sentence generator driven by an explicit random source.
pub struct SentenceGenerator {
    rng: Rand32,
    names: Vec<String>,
    templates: Vec<String>,
    tokenizer: Tokenizer,
}

impl SentenceGenerator {
    /// Generator over the built-in beneficiaries and templates.
    pub fn new(rng: Rand32) -> Self {
        Self {
            rng,
            names: BENEFICIARIES.iter().map(|s| s.to_string()).collect(),
            templates: TEMPLATES.iter().map(|s| s.to_string()).collect(),
            tokenizer: Tokenizer::new(),
        }
    }

    /// Generator over the built-in catalog, seeded for reproducibility.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(Rand32::new(seed))
    }

    /// Generator over a custom catalog.
    pub fn with_catalog(rng: Rand32, names: Vec<String>, templates: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(NerError::EmptyCatalog("beneficiary names"));
        }
        if templates.is_empty() {
            return Err(NerError::EmptyCatalog("templates"));
        }
        if let Some(bad) = templates.iter().find(|t| !t.contains(SLOT)) {
            return Err(NerError::InvalidTemplate(bad.clone()));
        }

        Ok(Self {
            rng,
            names,
            templates,
            tokenizer: Tokenizer::new(),
        })
    }

    fn pick<'a>(rng: &mut Rand32, items: &'a [String]) -> &'a str {
        let idx = rng.rand_range(0..items.len() as u32) as usize;
        &items[idx]
    }

    /// Draw one labeled sentence.
    pub fn sample(&mut self) -> LabeledSentence {
        let name = Self::pick(&mut self.rng, &self.names);
        let template = Self::pick(&mut self.rng, &self.templates);

        let sentence = template.replacen(SLOT, name, 1);
        let tokens = self.tokenizer.words(&sentence);
        let tags = tag_tokens(&tokens, name)
            .into_iter()
            .map(|t| t.to_string())
            .collect();

        LabeledSentence { tokens, tags }
    }

    /// Draw exactly `num_samples` labeled sentences.
    pub fn generate(&mut self, num_samples: usize) -> Vec<LabeledSentence> {
        let data: Vec<_> = (0..num_samples).map(|_| self.sample()).collect();
        debug!(samples = data.len(), "generated synthetic sentences");
        data
    }
}

/// Generate `num_samples` labeled sentences from the built-in catalog.
pub fn generate_synthetic_data(num_samples: usize, seed: u64) -> Vec<LabeledSentence> {
    SentenceGenerator::with_seed(seed).generate(num_samples)
}
