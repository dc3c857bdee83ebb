use std::io::{self, BufRead};
use std::path::PathBuf;

use beneficiary_trainer::{DEFAULT_MODEL_PATH, Tagger};
use clap::Parser;
use serde::Serialize;

/// Tag sentences read from stdin, one JSON object per line.
#[derive(Parser)]
#[command(name = "tag")]
#[command(version)]
struct Cli {
    /// Weights file written by `train`
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,
}

#[derive(Serialize)]
struct TagOutput {
    input: String,
    tokens: Vec<String>,
    tags: Vec<String>,
    beneficiary: Option<String>,
    beneficiary_span: Option<(usize, usize)>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    let tagger = Tagger::load(&cli.model)?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let tagged = tagger.tag(line)?;
        let output = TagOutput {
            input: line.to_string(),
            beneficiary: tagged.beneficiary(),
            beneficiary_span: tagged.beneficiary_span(),
            tokens: tagged.tokens,
            tags: tagged.tags,
        };
        println!("{}", serde_json::to_string(&output)?);
    }

    Ok(())
}
