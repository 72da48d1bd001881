// ============================================================================
// main.rs – train on a tiny corpus, then predict the next word of a prompt
// ============================================================================

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tiny_transformer::{LanguageModel, RunConfig, Trainer, Vocabulary};

#[derive(Debug, Parser)]
#[command(
    name = "tiny-transformer",
    version,
    about = "Single-head transformer next-token predictor"
)]
struct Cli {
    /// JSON run configuration (model, training, corpus, prompt)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f32>,

    /// Seed for weight initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Text whose next word is predicted
    #[arg(long)]
    prompt: Option<String>,

    /// Also greedily generate this many words after the prompt
    #[arg(long, value_name = "N")]
    generate: Option<usize>,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            cfg.training.epochs = epochs;
        }
        if let Some(lr) = self.learning_rate {
            cfg.training.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            cfg.model.seed = Some(seed);
        }
        if let Some(prompt) = &self.prompt {
            cfg.prompt = prompt.clone();
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut cfg = cli.run_config()?;

    let vocab = Vocabulary::from_corpus(&cfg.corpus);
    cfg.model.vocab_size = vocab.len();
    info!(vocab_size = vocab.len(), sentences = cfg.corpus.len(), "vocabulary built");

    let mut model = LanguageModel::new(cfg.model.clone()).context("cannot build model")?;
    println!("Network: {}", model.network_description());
    println!("Parameters: {}", model.parameter_count());

    let sequences: Vec<Vec<usize>> = cfg.corpus.iter().map(|s| vocab.tokenize(s)).collect();
    let trainer = Trainer::new(cfg.training.clone()).context("invalid training settings")?;
    let report = trainer.train(&mut model, &sequences)?;
    if let (Some(first), Some(last)) = (report.first_loss(), report.final_loss()) {
        println!(
            "Trained {} epochs, loss {first:.4} -> {last:.4}",
            report.epoch_losses.len()
        );
    }

    let prompt_ids = vocab.tokenize(&cfg.prompt);
    let next = model
        .predict_next(&prompt_ids)
        .with_context(|| format!("cannot predict after prompt {:?}", cfg.prompt))?;
    println!("{} -> {}", cfg.prompt, vocab.decode(&[next])?);

    if let Some(n) = cli.generate {
        let generated = model.generate(&prompt_ids, n)?;
        println!("{} {}", cfg.prompt, vocab.decode(&generated)?);
    }
    Ok(())
}
