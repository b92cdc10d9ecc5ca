//! # Word2Vec Trainer
//!
//! Skip-gram training with a symmetric context window. Every
//! `(target, context)` pair inside the window is a positive example; the
//! output layer is trained either with negative sampling or with
//! hierarchical softmax over a Huffman tree.
//!
//! ## Concurrency
//!
//! With `workers > 1` the corpus is split into contiguous shards that train
//! concurrently on a rayon pool against the same weight matrices. Weights are
//! stored as `AtomicU32` bit patterns and read/written with relaxed ordering,
//! so concurrent updates to the same vector may interleave and overwrite each
//! other (the Hogwild approximation). Individual floats are never torn.
//! A single worker is fully deterministic for a given seed.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use oorandom::Rand64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::embedding::sampler::{HuffmanTree, UnigramTable};
use crate::embedding::table::{EmbeddingTable, WordVectors};
use crate::embedding::vocabulary::Vocabulary;
use crate::error::{Result, WindvecError};

/// Output-layer objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Objective {
    /// Contrast each positive pair against `negatives` noise tokens drawn
    /// from the unigram distribution raised to 0.75.
    NegativeSampling { negatives: usize },
    /// Normalized objective over a Huffman coding of the vocabulary.
    HierarchicalSoftmax,
}

impl Default for Objective {
    fn default() -> Self {
        Objective::NegativeSampling { negatives: 5 }
    }
}

/// Hyperparameters for embedding training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Word2VecConfig {
    /// Vector dimensionality D.
    pub dimensions: usize,
    /// Context positions taken on each side of the target.
    pub window: usize,
    /// Tokens seen fewer times are dropped from the vocabulary.
    pub min_count: u64,
    pub epochs: usize,
    /// Initial learning rate; decays linearly with processed words.
    pub learning_rate: f32,
    /// Floor for the decayed learning rate.
    pub min_learning_rate: f32,
    pub objective: Objective,
    /// Frequent-word subsampling threshold. `0` disables subsampling.
    pub sample: f64,
    pub workers: usize,
    pub seed: u64,
}

impl Default for Word2VecConfig {
    fn default() -> Self {
        Self {
            dimensions: 50,
            window: 5,
            min_count: 5,
            epochs: 1,
            learning_rate: 0.025,
            min_learning_rate: 1e-4,
            objective: Objective::default(),
            sample: 0.0,
            workers: 1,
            seed: 42,
        }
    }
}

impl Word2VecConfig {
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_min_count(mut self, min_count: u64) -> Self {
        self.min_count = min_count;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_sample(mut self, sample: f64) -> Self {
        self.sample = sample;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check every field before any training work starts.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(WindvecError::InvalidConfig(msg.to_string()));

        if self.dimensions == 0 {
            return fail("dimensions must be positive");
        }
        if self.window == 0 {
            return fail("window must be at least 1");
        }
        if self.epochs == 0 {
            return fail("epochs must be positive");
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return fail("learning rate must be a positive number");
        }
        if !self.min_learning_rate.is_finite()
            || self.min_learning_rate < 0.0
            || self.min_learning_rate > self.learning_rate
        {
            return fail("min learning rate must lie in [0, learning rate]");
        }
        if !self.sample.is_finite() || self.sample < 0.0 {
            return fail("sample must be non-negative");
        }
        if self.workers == 0 {
            return fail("workers must be positive");
        }
        if let Objective::NegativeSampling { negatives: 0 } = self.objective {
            return fail("negative sampling needs at least one negative");
        }
        Ok(())
    }
}

/// Progress of one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Mean loss per positive pair.
    pub loss: f64,
    pub pairs: u64,
    /// Learning rate reached at the end of the epoch.
    pub learning_rate: f32,
}

/// Per-epoch training history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochStats>,
}

impl TrainingReport {
    pub fn losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.loss).collect()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.loss)
    }
}

/// Row-major matrix shared between Hogwild workers.
struct SharedMatrix {
    cols: usize,
    cells: Vec<AtomicU32>,
}

impl SharedMatrix {
    fn from_values(cols: usize, values: impl IntoIterator<Item = f32>) -> Self {
        Self {
            cols,
            cells: values
                .into_iter()
                .map(|v| AtomicU32::new(v.to_bits()))
                .collect(),
        }
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> f32 {
        f32::from_bits(self.cells[row * self.cols + col].load(Ordering::Relaxed))
    }

    #[inline]
    fn set(&self, row: usize, col: usize, value: f32) {
        self.cells[row * self.cols + col].store(value.to_bits(), Ordering::Relaxed);
    }

    fn read_row(&self, row: usize, out: &mut [f32]) {
        for (col, v) in out.iter_mut().enumerate() {
            *v = self.get(row, col);
        }
    }

    fn add_row(&self, row: usize, delta: &[f32]) {
        for (col, d) in delta.iter().enumerate() {
            self.set(row, col, self.get(row, col) + d);
        }
    }

    fn into_values(self) -> Vec<f32> {
        self.cells
            .into_iter()
            .map(|c| f32::from_bits(c.into_inner()))
            .collect()
    }
}

enum OutputLayer {
    Negative { noise: UnigramTable, negatives: usize },
    Hierarchical(HuffmanTree),
}

/// Linear learning-rate decay driven by processed words across workers.
struct Progress {
    processed: AtomicU64,
    total: u64,
    initial: f32,
    floor: f32,
}

impl Progress {
    fn learning_rate(&self) -> f32 {
        let done = self.processed.load(Ordering::Relaxed) as f64 / self.total.max(1) as f64;
        let lr = self.initial as f64 * (1.0 - done);
        (lr as f32).max(self.floor)
    }

    fn advance(&self, words: u64) {
        self.processed.fetch_add(words, Ordering::Relaxed);
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ShardTotals {
    loss: f64,
    pairs: u64,
}

impl ShardTotals {
    fn merge(self, other: Self) -> Self {
        Self {
            loss: self.loss + other.loss,
            pairs: self.pairs + other.pairs,
        }
    }
}

/// Weights and sampling state of a model under training.
struct SkipGram<'c> {
    config: &'c Word2VecConfig,
    counts: Vec<u64>,
    total_count: u64,
    input: SharedMatrix,
    output: SharedMatrix,
    layer: OutputLayer,
}

impl<'c> SkipGram<'c> {
    fn new(config: &'c Word2VecConfig, vocabulary: &Vocabulary) -> Self {
        let dims = config.dimensions;
        let counts: Vec<u64> = vocabulary.entries().iter().map(|e| e.count).collect();
        let mut rng = Rand64::new(config.seed as u128);
        let scale = dims as f64;
        let input = SharedMatrix::from_values(
            dims,
            (0..counts.len() * dims).map(|_| ((rng.rand_float() - 0.5) / scale) as f32),
        );

        let (layer, output_rows) = match config.objective {
            Objective::NegativeSampling { negatives } => (
                OutputLayer::Negative {
                    noise: UnigramTable::new(&counts),
                    negatives,
                },
                counts.len(),
            ),
            Objective::HierarchicalSoftmax => {
                let tree = HuffmanTree::new(&counts);
                let rows = tree.inner_nodes();
                (OutputLayer::Hierarchical(tree), rows)
            }
        };
        let output = SharedMatrix::from_values(dims, std::iter::repeat_n(0.0, output_rows * dims));

        Self {
            config,
            total_count: vocabulary.total_count(),
            counts,
            input,
            output,
            layer,
        }
    }

    fn train_shard(
        &self,
        sentences: &[Vec<u32>],
        epoch: usize,
        shard: usize,
        progress: &Progress,
    ) -> ShardTotals {
        let dims = self.config.dimensions;
        let window = self.config.window;
        let seed = ((self.config.seed as u128) << 64) | ((epoch as u128) << 32) | shard as u128;
        let mut rng = Rand64::new(seed);
        let mut hidden = vec![0.0f32; dims];
        let mut grad = vec![0.0f32; dims];
        let mut kept: Vec<usize> = Vec::new();
        let mut totals = ShardTotals::default();

        for sentence in sentences {
            let lr = progress.learning_rate();
            self.subsample(sentence, &mut rng, &mut kept);

            for t in 0..kept.len() {
                let lo = t.saturating_sub(window);
                let hi = t.saturating_add(window).min(kept.len() - 1);
                for c in lo..=hi {
                    if c == t {
                        continue;
                    }
                    totals.loss +=
                        self.train_pair(kept[t], kept[c], lr, &mut rng, &mut hidden, &mut grad);
                    totals.pairs += 1;
                }
            }

            progress.advance(sentence.len() as u64);
        }

        totals
    }

    fn subsample(&self, sentence: &[u32], rng: &mut Rand64, kept: &mut Vec<usize>) {
        kept.clear();
        let sample = self.config.sample;
        if sample <= 0.0 {
            kept.extend(sentence.iter().map(|&w| w as usize));
            return;
        }

        let threshold = sample * self.total_count as f64;
        for &w in sentence {
            let freq = self.counts[w as usize] as f64;
            let keep = ((freq / threshold).sqrt() + 1.0) * threshold / freq;
            if keep >= rng.rand_float() {
                kept.push(w as usize);
            }
        }
    }

    /// One positive pair plus its negatives (or Huffman path). Returns the loss.
    fn train_pair(
        &self,
        target: usize,
        context: usize,
        lr: f32,
        rng: &mut Rand64,
        hidden: &mut [f32],
        grad: &mut [f32],
    ) -> f64 {
        self.input.read_row(target, hidden);
        grad.fill(0.0);
        let mut loss = 0.0;

        match &self.layer {
            OutputLayer::Negative { noise, negatives } => {
                loss += self.update_output(context, 1.0, lr, hidden, grad);
                for _ in 0..*negatives {
                    let word = noise.sample(rng);
                    if word == context {
                        continue;
                    }
                    loss += self.update_output(word, 0.0, lr, hidden, grad);
                }
            }
            OutputLayer::Hierarchical(tree) => {
                for step in tree.path(context) {
                    let label = 1.0 - step.code as f32;
                    loss += self.update_output(step.node, label, lr, hidden, grad);
                }
            }
        }

        self.input.add_row(target, grad);
        loss
    }

    fn update_output(
        &self,
        row: usize,
        label: f32,
        lr: f32,
        hidden: &[f32],
        grad: &mut [f32],
    ) -> f64 {
        let dot: f32 = hidden
            .iter()
            .enumerate()
            .map(|(i, h)| h * self.output.get(row, i))
            .sum();
        let g = (label - sigmoid(dot)) * lr;

        for (i, h) in hidden.iter().enumerate() {
            let w = self.output.get(row, i);
            grad[i] += g * w;
            self.output.set(row, i, w + g * h);
        }

        if label > 0.5 {
            -log_sigmoid(dot)
        } else {
            -log_sigmoid(-dot)
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn log_sigmoid(x: f32) -> f64 {
    let x = x as f64;
    -((-x).max(0.0) + (-x.abs()).exp().ln_1p())
}

/// Skip-gram trainer with optional cancellation and epoch callback.
pub struct Word2VecTrainer<'a> {
    config: Word2VecConfig,
    cancel: Option<CancellationToken>,
    on_epoch: Option<Box<dyn FnMut(&EpochStats) + 'a>>,
}

impl<'a> Word2VecTrainer<'a> {
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration fails validation.
    pub fn new(config: Word2VecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
            on_epoch: None,
        })
    }

    /// Stop between epochs once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Invoke `callback` after every finished epoch.
    pub fn on_epoch(mut self, callback: impl FnMut(&EpochStats) + 'a) -> Self {
        self.on_epoch = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &Word2VecConfig {
        &self.config
    }

    /// Build the vocabulary from `sentences` and train on them.
    pub fn fit<S>(&mut self, sentences: &[S]) -> Result<(WordVectors, TrainingReport)>
    where
        S: AsRef<[String]>,
    {
        let vocabulary = Vocabulary::build(sentences, self.config.min_count)?;
        info!(
            vocabulary = vocabulary.len(),
            min_count = self.config.min_count,
            "vocabulary built"
        );
        self.train(sentences, vocabulary)
    }

    /// Train vectors for `vocabulary` over `sentences`. Out-of-vocabulary
    /// tokens are dropped from each sentence before windowing.
    ///
    /// # Errors
    ///
    /// `EmptyInput` if no corpus token is in the vocabulary, `Cancelled` if
    /// the token fires between epochs.
    pub fn train<S>(
        &mut self,
        sentences: &[S],
        vocabulary: Vocabulary,
    ) -> Result<(WordVectors, TrainingReport)>
    where
        S: AsRef<[String]>,
    {
        let encoded: Vec<Vec<u32>> = sentences
            .iter()
            .map(|s| {
                s.as_ref()
                    .iter()
                    .filter_map(|t| vocabulary.index_of(t).map(|i| i as u32))
                    .collect::<Vec<u32>>()
            })
            .filter(|s| !s.is_empty())
            .collect();
        let corpus_words: u64 = encoded.iter().map(|s| s.len() as u64).sum();
        if corpus_words == 0 {
            return Err(WindvecError::EmptyInput(
                "no corpus token is in the vocabulary".into(),
            ));
        }

        let config = &self.config;
        let model = SkipGram::new(config, &vocabulary);
        let progress = Progress {
            processed: AtomicU64::new(0),
            total: corpus_words * config.epochs as u64,
            initial: config.learning_rate,
            floor: config.min_learning_rate,
        };

        let pool = if config.workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.workers)
                    .build()
                    .map_err(|e| WindvecError::InvalidConfig(format!("worker pool: {e}")))?,
            )
        } else {
            None
        };
        let shard_len = encoded.len().div_ceil(config.workers);

        info!(
            sentences = encoded.len(),
            words = corpus_words,
            dimensions = config.dimensions,
            workers = config.workers,
            objective = ?config.objective,
            "training embeddings"
        );

        let mut report = TrainingReport::default();
        for epoch in 0..config.epochs {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                info!(completed_epochs = epoch, "embedding training cancelled");
                return Err(WindvecError::Cancelled {
                    completed_epochs: epoch,
                });
            }

            let run_shard = |(shard, chunk): (usize, &[Vec<u32>])| {
                model.train_shard(chunk, epoch, shard, &progress)
            };
            let totals = match &pool {
                Some(pool) => pool.install(|| {
                    encoded
                        .par_chunks(shard_len)
                        .enumerate()
                        .map(&run_shard)
                        .reduce(ShardTotals::default, ShardTotals::merge)
                }),
                None => run_shard((0, encoded.as_slice())),
            };

            let stats = EpochStats {
                epoch,
                loss: if totals.pairs == 0 {
                    0.0
                } else {
                    totals.loss / totals.pairs as f64
                },
                pairs: totals.pairs,
                learning_rate: progress.learning_rate(),
            };
            info!(
                epoch = epoch + 1,
                epochs = config.epochs,
                loss = stats.loss,
                pairs = stats.pairs,
                lr = stats.learning_rate,
                "embedding epoch complete"
            );
            if let Some(callback) = self.on_epoch.as_mut() {
                callback(&stats);
            }
            report.epochs.push(stats);
        }

        let rows = vocabulary.len();
        let dims = config.dimensions;
        debug!(rows, dims, "freezing embedding table");
        let table = EmbeddingTable::from_raw(rows, dims, model.input.into_values())?;
        Ok((WordVectors::new(vocabulary, table)?, report))
    }
}

/// Train vectors for an existing vocabulary. See [`Word2VecTrainer::train`].
pub fn train<S>(
    sentences: &[S],
    vocabulary: Vocabulary,
    config: &Word2VecConfig,
) -> Result<(WordVectors, TrainingReport)>
where
    S: AsRef<[String]>,
{
    Word2VecTrainer::new(config.clone())?.train(sentences, vocabulary)
}
