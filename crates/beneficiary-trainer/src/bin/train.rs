use std::path::PathBuf;

use beneficiary_trainer::{DEFAULT_MODEL_PATH, TrainConfig, run_training};
use clap::Parser;

/// Train the beneficiary tagger on synthetic contract sentences.
#[derive(Parser)]
#[command(name = "train")]
#[command(version)]
struct Cli {
    /// Synthetic sentences to generate
    #[arg(short = 'n', long, default_value_t = 300)]
    samples: usize,

    /// Passes over the training data
    #[arg(short, long, default_value_t = 3)]
    epochs: usize,

    /// Sentences per optimizer step
    #[arg(short, long, default_value_t = 8)]
    batch_size: usize,

    /// Encoded sequence length
    #[arg(short, long, default_value_t = 20)]
    max_len: usize,

    /// Seed for data generation and shuffling
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Weights file (a .json manifest is written next to it)
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    output: PathBuf,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = TrainConfig::new()
        .with_samples(cli.samples)
        .with_epochs(cli.epochs)
        .with_batch_size(cli.batch_size)
        .with_max_len(cli.max_len)
        .with_seed(cli.seed)
        .with_output(cli.output);

    match run_training(&config) {
        Ok(report) => {
            if let Some(last) = report.history.last() {
                println!(
                    "Trained on {} rows ({} held out), final accuracy {:.2}%",
                    report.train_rows,
                    report.val_rows,
                    last.accuracy * 100.0
                );
            }
            println!("Model saved to {}", report.model_path.display());
        }
        Err(e) => {
            eprintln!("Training failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
