//! Training loop for the BiLSTM tagger.

use std::path::PathBuf;

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use oorandom::Rand32;
use tracing::{debug, info, warn};

use beneficiary_core::{
    DEFAULT_MAX_LEN, EncodedBatch, PaddedArray, Vocabularies, build_vocab, encode_data,
    generate_synthetic_data,
};

use crate::artifact::{DEFAULT_MODEL_PATH, ModelManifest, save_model};
use crate::model::{BiLstmTagger, MaskedStats, ModelConfig, masked_cross_entropy};

/// Settings for one end-to-end training run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Synthetic sentences to generate
    pub num_samples: usize,
    /// Row width of the encoded arrays
    pub max_len: usize,
    /// Passes over the training rows
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of rows, taken from the end, held out for validation
    pub validation_split: f64,
    pub learning_rate: f64,
    /// Seeds both data generation and per-epoch shuffling
    pub seed: u64,
    /// Weights file; the manifest lands next to it
    pub output: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_samples: 300,
            max_len: DEFAULT_MAX_LEN,
            epochs: 3,
            batch_size: 8,
            validation_split: 0.2,
            learning_rate: 1e-3,
            seed: 42,
            output: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the batch size. Zero is bumped to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the validation fraction, clamped to `[0.0, 1.0)`.
    pub fn with_validation_split(mut self, split: f64) -> Self {
        self.validation_split = split.clamp(0.0, 0.99);
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, output: P) -> Self {
        self.output = output.into();
        self
    }
}

/// Metrics for one pass over the training rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
}

/// Outcome of [`run_training`].
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub vocab_size: usize,
    pub num_tags: usize,
    pub train_rows: usize,
    pub val_rows: usize,
    pub history: Vec<EpochMetrics>,
    pub model_path: PathBuf,
}

#[derive(Default)]
struct Accumulator {
    weighted_loss: f64,
    correct: usize,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, stats: &MaskedStats) -> candle_core::Result<()> {
        self.weighted_loss += stats.loss.to_scalar::<f32>()? as f64 * stats.count as f64;
        self.correct += stats.correct;
        self.count += stats.count;
        Ok(())
    }

    fn loss(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.weighted_loss / self.count as f64) as f32
        }
    }

    fn accuracy(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            self.correct as f32 / self.count as f32
        }
    }
}

fn to_tensor(array: &PaddedArray, device: &Device) -> candle_core::Result<Tensor> {
    Tensor::from_slice(array.as_slice(), array.shape(), device)
}

/// Rows kept for training when `split` of `rows` is held out.
fn split_point(rows: usize, split: f64) -> usize {
    ((rows as f64) * (1.0 - split)) as usize
}

pub struct Trainer {
    model: BiLstmTagger,
    varmap: VarMap,
    optimizer: AdamW,
    rng: Rand32,
}

impl Trainer {
    /// Fresh model and Adam optimizer (AdamW without weight decay).
    pub fn new(config: ModelConfig, learning_rate: f64, seed: u64) -> anyhow::Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BiLstmTagger::new(config, vb).context("building model")?;

        let params = ParamsAdamW {
            lr: learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let optimizer = AdamW::new(varmap.all_vars(), params)?;

        Ok(Self {
            model,
            varmap,
            optimizer,
            rng: Rand32::new(seed),
        })
    }

    pub fn model(&self) -> &BiLstmTagger {
        &self.model
    }

    fn shuffled(&mut self, n: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        for i in (1..n).rev() {
            let j = self.rng.rand_range(0..(i + 1) as u32) as usize;
            indices.swap(i, j);
        }
        indices
    }

    fn batch_stats(&self, batch: &EncodedBatch) -> candle_core::Result<MaskedStats> {
        let device = self.model.device();
        let x = to_tensor(&batch.x, device)?;
        let y = to_tensor(&batch.y, device)?;

        let logits = self.model.forward_logits(&x)?;
        let mask = self.model.padding_mask(&x)?;
        masked_cross_entropy(&logits, &y, &mask)
    }

    fn step(&mut self, batch: &EncodedBatch, acc: &mut Accumulator) -> anyhow::Result<()> {
        let stats = self.batch_stats(batch)?;
        if stats.count > 0 {
            self.optimizer.backward_step(&stats.loss)?;
        }
        acc.add(&stats)?;
        Ok(())
    }

    /// Mean masked loss and accuracy over `data`, without updating weights.
    pub fn evaluate(&self, data: &EncodedBatch, batch_size: usize) -> anyhow::Result<(f32, f32)> {
        let mut acc = Accumulator::default();
        let indices: Vec<usize> = (0..data.len()).collect();

        for chunk in indices.chunks(batch_size.max(1)) {
            acc.add(&self.batch_stats(&data.select(chunk))?)?;
        }

        Ok((acc.loss(), acc.accuracy()))
    }

    /// Train on `data`, holding out its last `validation_split` fraction.
    ///
    /// Training rows are reshuffled every epoch.
    pub fn fit(
        &mut self,
        data: &EncodedBatch,
        epochs: usize,
        batch_size: usize,
        validation_split: f64,
    ) -> anyhow::Result<Vec<EpochMetrics>> {
        let split = split_point(data.len(), validation_split);
        let train = data.select(&(0..split).collect::<Vec<_>>());
        let val = data.select(&(split..data.len()).collect::<Vec<_>>());
        info!(train = train.len(), val = val.len(), "fitting");

        if train.is_empty() {
            anyhow::bail!(
                "no training rows left after holding out {:.0}% of {} rows",
                validation_split * 100.0,
                data.len()
            );
        }
        if val.is_empty() && validation_split > 0.0 {
            warn!("validation split produced no rows, skipping validation");
        }

        let batch_size = batch_size.max(1);
        let mut history = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            let order = self.shuffled(train.len());
            let mut acc = Accumulator::default();

            for (step, chunk) in order.chunks(batch_size).enumerate() {
                self.step(&train.select(chunk), &mut acc)?;
                debug!(epoch = epoch + 1, step = step + 1, loss = acc.loss(), "batch done");
            }

            let (val_loss, val_accuracy) = if val.is_empty() {
                (None, None)
            } else {
                let (loss, accuracy) = self.evaluate(&val, batch_size)?;
                (Some(loss), Some(accuracy))
            };

            let metrics = EpochMetrics {
                epoch: epoch + 1,
                loss: acc.loss(),
                accuracy: acc.accuracy(),
                val_loss,
                val_accuracy,
            };
            info!(
                "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
                metrics.epoch,
                epochs,
                metrics.loss,
                metrics.accuracy,
                val_loss.unwrap_or(f32::NAN),
                val_accuracy.unwrap_or(f32::NAN)
            );
            history.push(metrics);
        }

        Ok(history)
    }

    pub fn save_model<P: AsRef<std::path::Path>>(
        &self,
        path: P,
        vocab: &Vocabularies,
    ) -> anyhow::Result<()> {
        let manifest = ModelManifest {
            config: *self.model.config(),
            vocab: vocab.clone(),
        };
        save_model(path, &self.varmap, &manifest)
    }
}

/// Generate data, build vocabularies, encode, train and save.
pub fn run_training(config: &TrainConfig) -> anyhow::Result<TrainingReport> {
    info!(samples = config.num_samples, seed = config.seed, "generating synthetic data");
    let data = generate_synthetic_data(config.num_samples, config.seed);

    let vocab = build_vocab(&data);
    info!(
        vocab_size = vocab.vocab_size(),
        num_tags = vocab.num_tags(),
        "vocabularies built"
    );

    let encoded = encode_data(&data, &vocab.word2idx, &vocab.tag2idx, config.max_len)
        .context("encoding training data")?;

    let model_config = ModelConfig::new(vocab.vocab_size(), vocab.num_tags(), config.max_len);
    let mut trainer = Trainer::new(model_config, config.learning_rate, config.seed)?;

    let history = trainer.fit(
        &encoded,
        config.epochs,
        config.batch_size,
        config.validation_split,
    )?;

    trainer.save_model(&config.output, &vocab)?;

    let split = split_point(encoded.len(), config.validation_split);
    Ok(TrainingReport {
        vocab_size: vocab.vocab_size(),
        num_tags: vocab.num_tags(),
        train_rows: split,
        val_rows: encoded.len() - split,
        history,
        model_path: config.output.clone(),
    })
}
