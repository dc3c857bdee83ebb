//! # Word and Tag Vocabularies
//!
//! Ids are assigned over the sorted set of distinct strings so identical
//! corpora always yield identical vocabularies. The token vocabulary reserves
//! [`PAD_ID`] and [`UNK_ID`]; the tag vocabulary reserves nothing.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sentence::LabeledSentence;

/// Padding placeholder token.
pub const PAD: &str = "PAD";
/// Out-of-vocabulary placeholder token.
pub const UNK: &str = "UNK";

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

/// First id handed to a real token.
const FIRST_WORD_ID: u32 = 2;

/// A string to id mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary {
    index: HashMap<String, u32>,
}

impl Vocabulary {
    /// Assign `offset + rank` to each item, in iteration order.
    fn enumerate<'a>(items: impl IntoIterator<Item = &'a str>, offset: u32) -> Self {
        let index = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (item.to_string(), offset + i as u32))
            .collect();
        Self { index }
    }

    pub fn get(&self, key: &str) -> Option<u32> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Insert or override an entry.
    pub fn insert(&mut self, key: impl Into<String>, id: u32) {
        self.index.insert(key.into(), id);
    }

    /// Largest id in use, if any.
    pub fn max_id(&self) -> Option<u32> {
        self.index.values().copied().max()
    }

    /// Id to string table. Slots whose id was overridden stay `None`.
    pub fn invert(&self) -> Vec<Option<String>> {
        let size = self.max_id().map_or(0, |m| m as usize + 1);
        let mut table = vec![None; size];
        for (key, &id) in &self.index {
            table[id as usize] = Some(key.clone());
        }
        table
    }
}

/// The pair of vocabularies a model is trained against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabularies {
    pub word2idx: Vocabulary,
    pub tag2idx: Vocabulary,
}

impl Vocabularies {
    /// Rows needed in an embedding table indexed by token id.
    ///
    /// A corpus token spelled `PAD` or `UNK` loses its sorted slot to the
    /// reserved id, leaving a gap, so this is `max id + 1` rather than the
    /// entry count.
    pub fn vocab_size(&self) -> usize {
        self.word2idx.max_id().map_or(0, |m| m as usize + 1)
    }

    /// Number of output classes.
    pub fn num_tags(&self) -> usize {
        self.tag2idx.len()
    }
}

/// Build the word and tag vocabularies of a corpus.
///
/// `PAD` and `UNK` are always present with ids 0 and 1, overriding a corpus
/// token of the same spelling.
pub fn build_vocab(data: &[LabeledSentence]) -> Vocabularies {
    let mut word_set = BTreeSet::new();
    let mut tag_set = BTreeSet::new();
    for sentence in data {
        word_set.extend(sentence.tokens.iter().map(String::as_str));
        tag_set.extend(sentence.tags.iter().map(String::as_str));
    }

    let mut word2idx = Vocabulary::enumerate(word_set, FIRST_WORD_ID);
    word2idx.insert(PAD, PAD_ID);
    word2idx.insert(UNK, UNK_ID);
    let tag2idx = Vocabulary::enumerate(tag_set, 0);

    debug!(
        words = word2idx.len(),
        tags = tag2idx.len(),
        "built vocabularies"
    );

    Vocabularies { word2idx, tag2idx }
}
