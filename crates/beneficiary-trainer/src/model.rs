//! Bidirectional LSTM sequence tagger.
//!
//! embedding(vocab, 64) -> forward + backward LSTM(32) -> concat(64)
//! -> position-wise linear(num_tags) -> softmax.
//!
//! Padding ids are masked wherever they occur: both LSTMs read only the real
//! positions of a row, packed together (reversed for the backward one), so
//! padding never feeds the recurrent state. Recurrent outputs at padded
//! positions are zeroed, and [`masked_cross_entropy`] ignores them.

use candle_core::{D, DType, Device, Result, Tensor};
use candle_nn::{Embedding, LSTM, LSTMConfig, Linear, Module, RNN, VarBuilder};
use serde::{Deserialize, Serialize};

use beneficiary_core::PAD_ID;

pub const EMBEDDING_DIM: usize = 64;
pub const HIDDEN_DIM: usize = 32;

/// Sizes the tagger is built with. Persisted next to the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub num_tags: usize,
    pub max_len: usize,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub pad_id: u32,
}

impl ModelConfig {
    pub fn new(vocab_size: usize, num_tags: usize, max_len: usize) -> Self {
        Self {
            vocab_size,
            num_tags,
            max_len,
            embedding_dim: EMBEDDING_DIM,
            hidden_dim: HIDDEN_DIM,
            pad_id: PAD_ID,
        }
    }
}

pub struct BiLstmTagger {
    embedding: Embedding,
    forward_lstm: LSTM,
    backward_lstm: LSTM,
    classifier: Linear,
    config: ModelConfig,
    device: Device,
}

/// Build a tagger for `vocab_size` token ids, `num_tags` classes and rows
/// of `max_len` ids.
pub fn build_model(
    vocab_size: usize,
    num_tags: usize,
    max_len: usize,
    vb: VarBuilder,
) -> Result<BiLstmTagger> {
    BiLstmTagger::new(ModelConfig::new(vocab_size, num_tags, max_len), vb)
}

impl BiLstmTagger {
    pub fn new(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        let device = vb.device().clone();
        let embedding = candle_nn::embedding(
            config.vocab_size,
            config.embedding_dim,
            vb.pp("embedding"),
        )?;
        let forward_lstm = candle_nn::lstm(
            config.embedding_dim,
            config.hidden_dim,
            LSTMConfig::default(),
            vb.pp("lstm_forward"),
        )?;
        let backward_lstm = candle_nn::lstm(
            config.embedding_dim,
            config.hidden_dim,
            LSTMConfig::default(),
            vb.pp("lstm_backward"),
        )?;
        let classifier =
            candle_nn::linear(2 * config.hidden_dim, config.num_tags, vb.pp("classifier"))?;

        Ok(Self {
            embedding,
            forward_lstm,
            backward_lstm,
            classifier,
            config,
            device,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Per-position `id != pad_id` flags, one row per input row.
    fn real_positions(&self, ids: &Tensor) -> Result<Vec<Vec<bool>>> {
        let rows = ids.to_dtype(DType::U32)?.to_vec2::<u32>()?;
        Ok(rows
            .iter()
            .map(|row| row.iter().map(|&id| id != self.config.pad_id).collect())
            .collect())
    }

    /// `[batch, seq]` f32 mask, 1.0 on real tokens and 0.0 on padding.
    pub fn padding_mask(&self, ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = ids.dims2()?;
        let real = self.real_positions(ids)?;
        position_mask(&real, batch, seq, &self.device)
    }

    /// Per-position class scores, `[batch, max_len, num_tags]`.
    pub fn forward_logits(&self, ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = ids.dims2()?;
        if seq != self.config.max_len {
            candle_core::bail!(
                "expected input rows of {} ids, got {}",
                self.config.max_len,
                seq
            );
        }
        let real = self.real_positions(ids)?;

        let embedded = self.embedding.forward(ids)?;

        let forward = self.run_packed(&self.forward_lstm, &embedded, &real, false)?;
        let backward = self.run_packed(&self.backward_lstm, &embedded, &real, true)?;

        let mask = position_mask(&real, batch, seq, &self.device)?.unsqueeze(2)?;
        let hidden = Tensor::cat(&[&forward, &backward], 2)?.broadcast_mul(&mask)?;

        self.classifier.forward(&hidden)
    }

    /// Run `lstm` over each row's real positions only, packed to the front
    /// of the row, then move the outputs back to their original positions.
    fn run_packed(
        &self,
        lstm: &LSTM,
        embedded: &Tensor,
        real: &[Vec<bool>],
        reverse: bool,
    ) -> Result<Tensor> {
        let (_, seq, _) = embedded.dims3()?;
        let packing = Packing::new(real, seq, reverse, &self.device)?;
        let packed = reorder(embedded, &packing.gather)?;
        let states = lstm.seq(&packed)?;
        reorder(&lstm.states_to_tensor(&states)?, &packing.scatter)
    }

    /// Per-position tag probabilities, `[batch, max_len, num_tags]`.
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        candle_nn::ops::softmax_last_dim(&self.forward_logits(ids)?)
    }

    /// Most likely tag id at every position, `[batch, max_len]`.
    pub fn predict(&self, ids: &Tensor) -> Result<Vec<Vec<u32>>> {
        self.forward_logits(ids)?.argmax(D::Minus1)?.to_vec2::<u32>()
    }
}

fn position_mask(
    real: &[Vec<bool>],
    batch: usize,
    seq: usize,
    device: &Device,
) -> Result<Tensor> {
    let mask = real
        .iter()
        .flat_map(|row| row.iter().map(|&r| if r { 1f32 } else { 0f32 }))
        .collect::<Vec<_>>();
    Tensor::from_vec(mask, (batch, seq), device)
}

/// Flat row-major gather indices that pack each row's real positions at its
/// front (reversed when `reverse` is set) with the padded positions behind
/// them, and the inverse indices that undo the packing.
struct Packing {
    gather: Tensor,
    scatter: Tensor,
}

impl Packing {
    fn new(real: &[Vec<bool>], seq: usize, reverse: bool, device: &Device) -> Result<Self> {
        let n = real.len() * seq;
        let mut gather = vec![0u32; n];
        let mut scatter = vec![0u32; n];
        for (row, flags) in real.iter().enumerate() {
            let base = row * seq;
            let mut order: Vec<usize> = (0..seq).filter(|&j| flags[j]).collect();
            if reverse {
                order.reverse();
            }
            order.extend((0..seq).filter(|&j| !flags[j]));

            for (packed, &src) in order.iter().enumerate() {
                gather[base + packed] = (base + src) as u32;
                scatter[base + src] = (base + packed) as u32;
            }
        }
        Ok(Self {
            gather: Tensor::from_vec(gather, n, device)?,
            scatter: Tensor::from_vec(scatter, n, device)?,
        })
    }
}

fn reorder(xs: &Tensor, flat_index: &Tensor) -> Result<Tensor> {
    let (batch, seq, dim) = xs.dims3()?;
    xs.reshape((batch * seq, dim))?
        .index_select(flat_index, 0)?
        .reshape((batch, seq, dim))
}

/// Loss and accuracy over the real (unmasked) positions of a batch.
pub struct MaskedStats {
    /// Mean cross-entropy over real positions, a scalar tensor.
    pub loss: Tensor,
    pub correct: usize,
    pub count: usize,
}

/// Sparse categorical cross-entropy restricted to positions where `mask`
/// is 1.0.
///
/// `logits`: `[batch, seq, num_tags]`, `targets`: `[batch, seq]` u32,
/// `mask`: `[batch, seq]` f32.
pub fn masked_cross_entropy(
    logits: &Tensor,
    targets: &Tensor,
    mask: &Tensor,
) -> Result<MaskedStats> {
    let (batch, seq, num_tags) = logits.dims3()?;
    let n = batch * seq;
    let logits = logits.reshape((n, num_tags))?;
    let targets = targets.reshape(n)?;
    let mask = mask.reshape(n)?;

    let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
    let picked = log_probs.gather(&targets.unsqueeze(1)?, 1)?.squeeze(1)?;

    let mask_values = mask.to_vec1::<f32>()?;
    let count = mask_values.iter().filter(|&&m| m > 0.0).count();
    let denom = count.max(1) as f64;
    let loss = (picked.mul(&mask)?.sum_all()?.neg()? / denom)?;

    let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
    let expected = targets.to_vec1::<u32>()?;
    let correct = predicted
        .iter()
        .zip(&expected)
        .zip(&mask_values)
        .filter(|((p, e), m)| **m > 0.0 && p == e)
        .count();

    Ok(MaskedStats {
        loss,
        correct,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn tagger(vocab_size: usize, num_tags: usize, max_len: usize) -> (VarMap, BiLstmTagger) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = build_model(vocab_size, num_tags, max_len, vb).unwrap();
        (varmap, model)
    }

    fn ids(rows: &[&[u32]]) -> Tensor {
        let width = rows[0].len();
        let flat: Vec<u32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::from_vec(flat, (rows.len(), width), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_output_shape_and_distribution() {
        let (_varmap, model) = tagger(100, 5, 10);
        let input = ids(&[&[5, 6, 7, 0, 0, 0, 0, 0, 0, 0], &[9; 10]]);

        let probs = model.forward(&input).unwrap();
        assert_eq!(probs.dims(), &[2, 10, 5]);

        let sums = probs.sum(D::Minus1).unwrap().to_vec2::<f32>().unwrap();
        for row in sums {
            for s in row {
                assert!((s - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_rejects_wrong_width() {
        let (_varmap, model) = tagger(20, 3, 4);
        assert!(model.forward(&ids(&[&[2, 3, 0]])).is_err());
    }

    #[test]
    fn test_out_of_range_id_is_an_engine_error() {
        let (_varmap, model) = tagger(4, 3, 3);
        assert!(model.forward(&ids(&[&[2, 50, 0]])).is_err());
    }

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
        let diff = (a - b).unwrap().abs().unwrap().flatten_all().unwrap();
        diff.max(0).unwrap().to_scalar::<f32>().unwrap()
    }

    /// Two models of different widths sharing one set of weights.
    fn shared_taggers(
        vocab_size: usize,
        num_tags: usize,
        wide: usize,
        narrow: usize,
    ) -> (VarMap, BiLstmTagger, BiLstmTagger) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let wide = build_model(vocab_size, num_tags, wide, vb.clone()).unwrap();
        let narrow = build_model(vocab_size, num_tags, narrow, vb).unwrap();
        (varmap, wide, narrow)
    }

    #[test]
    fn test_trailing_padding_does_not_feed_real_positions() {
        let (_varmap, padded, exact) = shared_taggers(30, 3, 6, 3);
        let with_padding = padded.forward(&ids(&[&[4, 5, 6, 0, 0, 0]])).unwrap();
        let without = exact.forward(&ids(&[&[4, 5, 6]])).unwrap();

        let prefix = with_padding.narrow(1, 0, 3).unwrap();
        assert!(max_abs_diff(&prefix, &without) < 1e-5);
    }

    #[test]
    fn test_interior_padding_is_skipped() {
        let (_varmap, padded, exact) = shared_taggers(30, 3, 5, 3);
        let with_padding = padded.forward(&ids(&[&[4, 0, 5, 6, 0]])).unwrap();
        let without = exact.forward(&ids(&[&[4, 5, 6]])).unwrap();

        let real = Tensor::new(&[0u32, 2, 3], &Device::Cpu).unwrap();
        let kept = with_padding.index_select(&real, 1).unwrap();
        assert!(max_abs_diff(&kept, &without) < 1e-5);
    }

    #[test]
    fn test_rows_in_a_batch_are_independent() {
        let (_varmap, model) = tagger(30, 3, 6);
        let alone = model.forward(&ids(&[&[4, 5, 6, 0, 0, 0]])).unwrap();
        let batched = model.forward(&ids(&[&[4, 5, 6, 0, 0, 0], &[7; 6]])).unwrap();

        let b = batched.narrow(0, 0, 1).unwrap();
        assert!(max_abs_diff(&alone, &b) < 1e-5);
    }

    #[test]
    fn test_padding_mask() {
        let (_varmap, model) = tagger(30, 3, 5);
        let mask = model
            .padding_mask(&ids(&[&[4, 5, 0, 0, 0], &[4, 0, 5, 6, 0], &[0; 5]]))
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();
        assert_eq!(
            mask,
            vec![
                vec![1.0, 1.0, 0.0, 0.0, 0.0],
                vec![1.0, 0.0, 1.0, 1.0, 0.0],
                vec![0.0; 5],
            ]
        );
    }

    #[test]
    fn test_packing_moves_padding_behind_real_positions() {
        let real = vec![vec![true, false, true, true], vec![true, false, false, false]];
        let packing = Packing::new(&real, 4, true, &Device::Cpu).unwrap();
        let gather = packing.gather.to_vec1::<u32>().unwrap();
        let scatter = packing.scatter.to_vec1::<u32>().unwrap();

        assert_eq!(gather, vec![3, 2, 0, 1, 4, 5, 6, 7]);
        for (packed, &src) in gather.iter().enumerate() {
            assert_eq!(scatter[src as usize], packed as u32);
        }
    }

    #[test]
    fn test_masked_cross_entropy_ignores_padding() {
        // Two positions, the second one padded. Logits favour class 1.
        let logits = Tensor::new(&[[[0f32, 5.0], [5.0, 0.0]]], &Device::Cpu).unwrap();
        let targets = Tensor::new(&[[1u32, 1]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1f32, 0.0]], &Device::Cpu).unwrap();

        let stats = masked_cross_entropy(&logits, &targets, &mask).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.correct, 1);

        let loss = stats.loss.to_scalar::<f32>().unwrap();
        let expected = (1.0 + (-5f32).exp()).ln();
        assert!((loss - expected).abs() < 1e-5);
    }
}
