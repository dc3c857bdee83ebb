//! # BIO Tags for Beneficiary Recognition
//!
//! Defines the tag set for sequence labeling of contract sentences.
//! Uses the BIO (Begin-Inside-Outside) tagging scheme collapsed to a single
//! entity type. Vocabularies and encoded batches carry tags as plain strings,
//! so helpers here also classify per-type variants such as `B-PER`.

use std::fmt;

/// Label for tokens outside any entity.
pub const OUTSIDE: &str = "O";

/// Label for the first token of a beneficiary.
pub const BEGIN_ENTITY: &str = "B-ENTITY";

/// Label for a continuation token of a beneficiary.
pub const INSIDE_ENTITY: &str = "I-ENTITY";

/// BIO tags emitted by the synthetic generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BioTag {
    Begin,
    Inside,
    Outside,
}

impl BioTag {
    /// The string label used in vocabularies.
    pub fn as_str(&self) -> &'static str {
        match self {
            BioTag::Begin => BEGIN_ENTITY,
            BioTag::Inside => INSIDE_ENTITY,
            BioTag::Outside => OUTSIDE,
        }
    }
}

impl fmt::Display for BioTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True for any begin label, whatever its entity type (`B-ENTITY`, `B-PER`).
pub fn is_begin_label(tag: &str) -> bool {
    tag.starts_with("B-")
}

/// True for any inside label, whatever its entity type.
pub fn is_inside_label(tag: &str) -> bool {
    tag.starts_with("I-")
}

/// An entity span recovered from a tag sequence, `end_token` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub start_token: usize,
    pub end_token: usize,
    pub text: String,
}

/// Collect entity spans: a begin label followed by any run of inside labels.
///
/// Inside labels with no preceding begin label are ignored.
pub fn extract_entities<T: AsRef<str>, U: AsRef<str>>(tokens: &[T], tags: &[U]) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut current: Option<usize> = None;

    let close = |start: usize, end: usize, entities: &mut Vec<Entity>| {
        let text = tokens[start..end]
            .iter()
            .map(|t| t.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        entities.push(Entity {
            start_token: start,
            end_token: end,
            text,
        });
    };

    let len = tokens.len().min(tags.len());
    for (i, tag) in tags.iter().take(len).enumerate() {
        let tag = tag.as_ref();
        if is_begin_label(tag) {
            if let Some(start) = current.take() {
                close(start, i, &mut entities);
            }
            current = Some(i);
        } else if !is_inside_label(tag) {
            if let Some(start) = current.take() {
                close(start, i, &mut entities);
            }
        }
    }
    if let Some(start) = current {
        close(start, len, &mut entities);
    }

    entities
}
