//! Tagging raw sentences with a saved model.

use std::path::Path;

use candle_core::{Device, Tensor};
use serde::Serialize;

use beneficiary_core::encoder::encode_tokens;
use beneficiary_core::tags::OUTSIDE;
use beneficiary_core::{Entity, Side, Tokenizer, extract_entities, pad_sequences};

use crate::artifact::{LoadedModel, ModelManifest, load_model};
use crate::model::BiLstmTagger;

/// A sentence with one predicted tag per token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedSentence {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
    /// Byte range of each token in the input sentence.
    pub spans: Vec<(usize, usize)>,
}

impl TaggedSentence {
    /// Every predicted entity span.
    pub fn entities(&self) -> Vec<Entity> {
        extract_entities(&self.tokens, &self.tags)
    }

    /// Text of the first predicted entity, if any.
    pub fn beneficiary(&self) -> Option<String> {
        self.entities().into_iter().next().map(|e| e.text)
    }

    /// Byte range of the first predicted entity in the input sentence.
    pub fn beneficiary_span(&self) -> Option<(usize, usize)> {
        let entity = self.entities().into_iter().next()?;
        let (start, _) = *self.spans.get(entity.start_token)?;
        let (_, end) = *self.spans.get(entity.end_token - 1)?;
        Some((start, end))
    }
}

/// Runs a trained tagger over whitespace-tokenized sentences.
pub struct Tagger {
    model: BiLstmTagger,
    manifest: ModelManifest,
    idx2tag: Vec<Option<String>>,
    tokenizer: Tokenizer,
}

impl Tagger {
    pub fn new(model: BiLstmTagger, manifest: ModelManifest) -> Self {
        let idx2tag = manifest.vocab.tag2idx.invert();
        Self {
            model,
            manifest,
            idx2tag,
            tokenizer: Tokenizer::new(),
        }
    }

    /// Load the weights at `path` and their manifest on the CPU.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let LoadedModel {
            model, manifest, ..
        } = load_model(path, &Device::Cpu)?;
        Ok(Self::new(model, manifest))
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Tag one sentence. Tokens past the model's `max_len` are tagged `O`.
    pub fn tag(&self, sentence: &str) -> anyhow::Result<TaggedSentence> {
        let (tokens, spans): (Vec<String>, Vec<(usize, usize)>) = self
            .tokenizer
            .tokenize(sentence)
            .into_iter()
            .map(|t| (t.text, (t.start, t.end)))
            .unzip();
        if tokens.is_empty() {
            return Ok(TaggedSentence {
                tokens,
                tags: Vec::new(),
                spans,
            });
        }

        let config = self.model.config();
        let ids = encode_tokens(&tokens, &self.manifest.vocab.word2idx)?;
        let row = pad_sequences(&[ids], config.max_len, Side::Post, Side::Post, config.pad_id);
        let input = Tensor::from_slice(row.as_slice(), row.shape(), self.model.device())?;

        let predicted = self.model.predict(&input)?;
        let tags = (0..tokens.len())
            .map(|i| {
                predicted[0]
                    .get(i)
                    .and_then(|&id| self.idx2tag.get(id as usize).cloned().flatten())
                    .unwrap_or_else(|| OUTSIDE.to_string())
            })
            .collect();

        Ok(TaggedSentence {
            tokens,
            tags,
            spans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beneficiary_core::{build_vocab, generate_synthetic_data};
    use candle_core::DType;
    use candle_nn::{VarBuilder, VarMap};

    use crate::model::ModelConfig;

    fn untrained_tagger(max_len: usize) -> Tagger {
        let vocab = build_vocab(&generate_synthetic_data(30, 1));
        let config = ModelConfig::new(vocab.vocab_size(), vocab.num_tags(), max_len);
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = BiLstmTagger::new(config, vb).unwrap();
        Tagger::new(model, ModelManifest { config, vocab })
    }

    #[test]
    fn test_tags_align_with_tokens() {
        let tagger = untrained_tagger(20);
        let tagged = tagger
            .tag("Le bénéficiaire du contrat est Jean Dupont.")
            .unwrap();

        assert_eq!(tagged.tokens.len(), 7);
        assert_eq!(tagged.tags.len(), 7);
        assert_eq!(tagged.spans[5], (33, 37));
        for tag in &tagged.tags {
            assert!(tagger.manifest().vocab.tag2idx.contains(tag));
        }
    }

    #[test]
    fn test_unknown_words_and_long_sentences() {
        let tagger = untrained_tagger(4);
        let tagged = tagger.tag("Zoé Lefèvre touchera tout le capital décès").unwrap();

        assert_eq!(tagged.tags.len(), 7);
        assert!(tagged.tags[4..].iter().all(|t| t == "O"));
    }

    #[test]
    fn test_empty_sentence() {
        let tagged = untrained_tagger(8).tag("   ").unwrap();
        assert!(tagged.tokens.is_empty());
        assert_eq!(tagged.beneficiary(), None);
        assert_eq!(tagged.beneficiary_span(), None);
    }

    #[test]
    fn test_beneficiary_span() {
        let tagged = TaggedSentence {
            tokens: vec!["pour".into(), "Paul".into(), "Martin.".into()],
            tags: vec!["O".into(), "B-ENTITY".into(), "I-ENTITY".into()],
            spans: vec![(0, 4), (5, 9), (10, 17)],
        };
        assert_eq!(tagged.beneficiary().as_deref(), Some("Paul Martin."));
        assert_eq!(tagged.beneficiary_span(), Some((5, 17)));
    }
}
