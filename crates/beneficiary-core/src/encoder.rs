//! # Sequence Encoder
//!
//! Turns labeled sentences into rectangular id arrays ready for a tensor
//! engine. Tokens fall back to `UNK`; tags have no fallback because the tag
//! set is closed once the vocabulary is built.

use tracing::debug;

use crate::error::{NerError, Result};
use crate::sentence::LabeledSentence;
use crate::tags::OUTSIDE;
use crate::vocab::{PAD, UNK, Vocabulary};

/// Target sequence length used when the caller has no preference.
pub const DEFAULT_MAX_LEN: usize = 20;

/// Which end of a sequence padding or truncation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    /// Pad before the sequence, or drop its head.
    Pre,
    /// Pad after the sequence, or drop its tail.
    #[default]
    Post,
}

/// A dense row-major `rows x cols` array of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedArray {
    rows: usize,
    cols: usize,
    data: Vec<u32>,
}

impl PaddedArray {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u32> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    pub fn row(&self, row: usize) -> &[u32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Row-major backing storage.
    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }

    /// Copy out the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> PaddedArray {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        PaddedArray {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }
}

/// Bring variable-length sequences to `max_len`.
///
/// Short sequences are filled with `value` on the `padding` side; long ones
/// lose elements on the `truncating` side.
pub fn pad_sequences(
    sequences: &[Vec<u32>],
    max_len: usize,
    padding: Side,
    truncating: Side,
    value: u32,
) -> PaddedArray {
    let mut data = Vec::with_capacity(sequences.len() * max_len);

    for seq in sequences {
        let kept = if seq.len() > max_len {
            match truncating {
                Side::Post => &seq[..max_len],
                Side::Pre => &seq[seq.len() - max_len..],
            }
        } else {
            &seq[..]
        };
        let fill = max_len - kept.len();

        if padding == Side::Pre {
            data.extend(std::iter::repeat_n(value, fill));
        }
        data.extend_from_slice(kept);
        if padding == Side::Post {
            data.extend(std::iter::repeat_n(value, fill));
        }
    }

    PaddedArray {
        rows: sequences.len(),
        cols: max_len,
        data,
    }
}

/// Token and tag ids for a corpus, aligned position by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub x: PaddedArray,
    pub y: PaddedArray,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.x.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.rows() == 0
    }

    /// Keep only the rows at `indices`.
    pub fn select(&self, indices: &[usize]) -> EncodedBatch {
        EncodedBatch {
            x: self.x.select_rows(indices),
            y: self.y.select_rows(indices),
        }
    }
}

fn tag_id(tag2idx: &Vocabulary, tag: &str) -> Result<u32> {
    tag2idx
        .get(tag)
        .ok_or_else(|| NerError::UnknownTag(tag.to_string()))
}

fn reserved_id(word2idx: &Vocabulary, token: &str) -> Result<u32> {
    word2idx
        .get(token)
        .ok_or_else(|| NerError::MissingToken(token.to_string()))
}

/// Map one sentence's tokens to ids, falling back to `UNK`.
pub fn encode_tokens<S: AsRef<str>>(tokens: &[S], word2idx: &Vocabulary) -> Result<Vec<u32>> {
    let unk = reserved_id(word2idx, UNK)?;
    Ok(tokens
        .iter()
        .map(|t| word2idx.get(t.as_ref()).unwrap_or(unk))
        .collect())
}

/// Encode a corpus into right-padded, right-truncated id arrays.
///
/// Token rows are padded with the `PAD` id and tag rows with the id of `O`.
pub fn encode_data(
    data: &[LabeledSentence],
    word2idx: &Vocabulary,
    tag2idx: &Vocabulary,
    max_len: usize,
) -> Result<EncodedBatch> {
    for (i, sentence) in data.iter().enumerate() {
        sentence.validate(i)?;
    }

    let pad_id = reserved_id(word2idx, PAD)?;
    let outside_id = tag_id(tag2idx, OUTSIDE)?;

    let token_rows = data
        .iter()
        .map(|s| encode_tokens(&s.tokens, word2idx))
        .collect::<Result<Vec<_>>>()?;
    let tag_rows = data
        .iter()
        .map(|s| s.tags.iter().map(|t| tag_id(tag2idx, t)).collect())
        .collect::<Result<Vec<Vec<u32>>>>()?;

    let truncated = token_rows.iter().filter(|r| r.len() > max_len).count();
    if truncated > 0 {
        debug!(truncated, max_len, "truncating long sentences");
    }

    Ok(EncodedBatch {
        x: pad_sequences(&token_rows, max_len, Side::Post, Side::Post, pad_id),
        y: pad_sequences(&tag_rows, max_len, Side::Post, Side::Post, outside_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{PAD_ID, UNK_ID, build_vocab};

    fn sentence(tokens: &[&str], tags: &[&str]) -> LabeledSentence {
        LabeledSentence::try_from((tokens, tags)).unwrap()
    }

    fn corpus() -> Vec<LabeledSentence> {
        vec![
            sentence(&["Jean", "aime", "Paris"], &["B-PER", "O", "B-LOC"]),
            sentence(&["Marie", "visite", "Londres"], &["B-PER", "O", "B-LOC"]),
            sentence(&["Pierre", "mange", "une", "pomme"], &["B-PER", "O", "O", "O"]),
        ]
    }

    #[test]
    fn test_encode_shape_and_padding() {
        let data = corpus();
        let vocab = build_vocab(&data);
        let batch = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 5).unwrap();

        assert_eq!(batch.x.shape(), (3, 5));
        assert_eq!(batch.y.shape(), (3, 5));

        let outside = vocab.tag2idx.get("O").unwrap();
        for (i, s) in data.iter().enumerate() {
            assert!(batch.x.row(i)[s.len()..].iter().all(|&v| v == PAD_ID));
            assert!(batch.y.row(i)[s.len()..].iter().all(|&v| v == outside));
        }
    }

    #[test]
    fn test_single_sentence_padding() {
        let data = vec![sentence(&["Jean", "aime", "Paris"], &["B-PER", "O", "B-LOC"])];
        let vocab = build_vocab(&data);
        let batch = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 5).unwrap();

        let outside = vocab.tag2idx.get("O").unwrap();
        assert_eq!(batch.x.shape(), (1, 5));
        assert_eq!(&batch.x.row(0)[3..5], &[PAD_ID, PAD_ID]);
        assert_eq!(&batch.y.row(0)[3..5], &[outside, outside]);
    }

    #[test]
    fn test_unknown_token_maps_to_unk() {
        let mut word2idx = Vocabulary::default();
        for (w, id) in [("PAD", 0), ("UNK", 1), ("a", 2), ("b", 3)] {
            word2idx.insert(w, id);
        }
        let mut tag2idx = Vocabulary::default();
        tag2idx.insert("O", 0);

        let data = vec![sentence(&["a", "c"], &["O", "O"])];
        let batch = encode_data(&data, &word2idx, &tag2idx, 3).unwrap();
        assert_eq!(batch.x.row(0), &[2, UNK_ID, PAD_ID]);
        assert_eq!(batch.y.row(0), &[0, 0, 0]);
    }

    #[test]
    fn test_unknown_word_against_built_vocab() {
        let vocab = build_vocab(&corpus());
        let data = vec![sentence(&["Inconnu", "aime", "Paris"], &["O", "O", "B-LOC"])];
        let batch = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 5).unwrap();
        assert_eq!(batch.x.get(0, 0), Some(UNK_ID));
    }

    #[test]
    fn test_unknown_tag_fails() {
        let vocab = build_vocab(&corpus());
        let data = vec![sentence(&["Jean"], &["B-ORG"])];
        let err = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 5).unwrap_err();
        assert!(matches!(err, NerError::UnknownTag(t) if t == "B-ORG"));
    }

    #[test]
    fn test_missing_outside_tag_fails() {
        let data = vec![sentence(&["Jean"], &["B-PER"])];
        let vocab = build_vocab(&data);
        let err = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 5).unwrap_err();
        assert!(matches!(err, NerError::UnknownTag(t) if t == "O"));
    }

    #[test]
    fn test_missing_reserved_token_fails() {
        let mut word2idx = Vocabulary::default();
        word2idx.insert("PAD", 0);
        let mut tag2idx = Vocabulary::default();
        tag2idx.insert("O", 0);

        let data = vec![sentence(&["a"], &["O"])];
        let err = encode_data(&data, &word2idx, &tag2idx, 2).unwrap_err();
        assert!(matches!(err, NerError::MissingToken(t) if t == "UNK"));
    }

    #[test]
    fn test_length_mismatch_fails_first() {
        let vocab = build_vocab(&corpus());
        let data = vec![
            sentence(&["Jean"], &["B-PER"]),
            LabeledSentence {
                tokens: vec!["aime".into()],
                tags: vec!["O".into(), "O".into()],
            },
        ];
        let err = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 5).unwrap_err();
        assert!(matches!(err, NerError::LengthMismatch { index: 1, .. }));
    }

    #[test]
    fn test_long_rows_are_truncated_on_the_right() {
        let data = corpus();
        let vocab = build_vocab(&data);
        let batch = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 2).unwrap();

        assert_eq!(batch.x.shape(), (3, 2));
        let pierre = vocab.word2idx.get("Pierre").unwrap();
        let mange = vocab.word2idx.get("mange").unwrap();
        assert_eq!(batch.x.row(2), &[pierre, mange]);
        assert_eq!(batch.y.row(2)[0], vocab.tag2idx.get("B-PER").unwrap());
    }

    #[test]
    fn test_pad_sequences_sides() {
        let seqs = vec![vec![1, 2, 3, 4], vec![5]];

        let post = pad_sequences(&seqs, 3, Side::Post, Side::Post, 0);
        assert_eq!(post.as_slice(), &[1, 2, 3, 5, 0, 0]);

        let pre = pad_sequences(&seqs, 3, Side::Pre, Side::Pre, 9);
        assert_eq!(pre.as_slice(), &[2, 3, 4, 9, 9, 5]);
    }

    #[test]
    fn test_empty_corpus_and_zero_length() {
        let vocab = build_vocab(&corpus());
        let batch = encode_data(&[], &vocab.word2idx, &vocab.tag2idx, 4).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.x.shape(), (0, 4));

        let empty = pad_sequences(&[vec![1, 2]], 0, Side::Post, Side::Post, 0);
        assert_eq!(empty.shape(), (1, 0));
    }

    #[test]
    fn test_select_rows() {
        let data = corpus();
        let vocab = build_vocab(&data);
        let batch = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, 4).unwrap();
        let picked = batch.select(&[2, 0]);

        assert_eq!(picked.len(), 2);
        assert_eq!(picked.x.row(0), batch.x.row(2));
        assert_eq!(picked.y.row(1), batch.y.row(0));
    }
}
