//! # Beneficiary Trainer
//!
//! Model definition, training driver and inference for the beneficiary
//! recognizer. Builds on [`beneficiary_core`] for data and uses candle as the
//! tensor engine.

pub mod artifact;
pub mod model;
pub mod predict;
pub mod trainer;

pub use artifact::{DEFAULT_MODEL_PATH, LoadedModel, ModelManifest, load_model, save_model};
pub use model::{BiLstmTagger, ModelConfig, build_model};
pub use predict::{TaggedSentence, Tagger};
pub use trainer::{EpochMetrics, TrainConfig, Trainer, TrainingReport, run_training};
