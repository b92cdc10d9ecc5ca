//! Train embeddings and a window classifier on a labeled corpus, then
//! decode every sentence.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use windvec_core::{LabelSet, Pipeline, PipelineConfig, PipelineReport};
use windvec_trainer::LocalCoordinator;

/// CLI arguments
#[derive(Parser)]
#[command(name = "windvec-train")]
#[command(about = "Train word vectors and a moving-window classifier")]
#[command(version)]
struct Cli {
    /// Delimited corpus of (label, text) records
    #[arg(short, long, env = "WINDVEC_CORPUS")]
    corpus: PathBuf,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, env = "WINDVEC_CONFIG")]
    config: Option<PathBuf>,

    /// Embeddings file, loaded when present and written otherwise
    #[arg(short, long, env = "WINDVEC_EMBEDDINGS")]
    embeddings: Option<PathBuf>,

    /// Embedding dimensionality
    #[arg(short, long)]
    dimensions: Option<usize>,

    /// Half window for classifier features
    #[arg(short, long)]
    window: Option<isize>,

    /// Minimum token count for the vocabulary
    #[arg(long)]
    min_count: Option<u64>,

    /// Embedding epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Hogwild threads for embeddings and replicas for the classifier
    #[arg(long)]
    workers: Option<usize>,

    /// Seed for embeddings and network initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Comma-separated label set, e.g. "0,1,2"
    #[arg(long, value_delimiter = ',')]
    labels: Option<Vec<String>>,

    /// Write the full report as JSON
    #[arg(short, long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(path) = &self.embeddings {
            config.embeddings_path = Some(path.clone());
        }
        if let Some(dimensions) = self.dimensions {
            config.word2vec.dimensions = dimensions;
        }
        if let Some(window) = self.window {
            config.half_window = window;
        }
        if let Some(min_count) = self.min_count {
            config.word2vec.min_count = min_count;
        }
        if let Some(epochs) = self.epochs {
            config.word2vec.epochs = epochs;
        }
        if let Some(workers) = self.workers {
            config.word2vec.workers = workers;
            config.network.workers = workers;
        }
        if let Some(seed) = self.seed {
            config.word2vec.seed = seed;
            config.network.seed = seed;
        }
        if let Some(labels) = &self.labels {
            config.corpus.labels = LabelSet::new(labels.iter().map(|l| l.trim()));
        }
        Ok(config)
    }
}

fn summarize(report: &PipelineReport) {
    info!(
        sentences = report.corpus.sentences,
        skipped = report.corpus.malformed_lines
            + report.corpus.unknown_labels
            + report.corpus.empty_sentences,
        vocabulary = report.vocabulary_size,
        "corpus"
    );
    if let Some(loss) = report.embedding_losses.last() {
        info!(loss, epochs = report.embedding_losses.len(), "embeddings trained");
    }
    println!(
        "{} sentences, {} windows, vocabulary {}, position accuracy {:.2}%",
        report.sentences.len(),
        report.training_samples,
        report.vocabulary_size,
        report.accuracy * 100.0
    );
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.pipeline_config()?;
    let pipeline = Pipeline::new(config, LocalCoordinator::new());
    let report = pipeline.run(&cli.corpus)?;

    summarize(&report);
    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("Training failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
