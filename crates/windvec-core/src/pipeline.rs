//! # Pipeline Driver
//!
//! Wires the stages together: read corpus, train or load embeddings, build
//! window batches, train the classifier through a [`DistributedTrainer`],
//! then decode every sentence. Failures are reported with the [`Stage`] they
//! came from.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::coordinator::{DistributedTrainer, NetworkConfig, ScoringModel};
use crate::corpus::{Corpus, CorpusConfig, CorpusReader, CorpusStats};
use crate::decode::{DecodedPath, TransitionModel, ViterbiDecoder};
use crate::embedding::{Vocabulary, Word2VecConfig, Word2VecTrainer, WordVectors};
use crate::error::{PipelineError, Result, Stage, StageExt, WindvecError};
use crate::window::{WindowBatches, WindowBuilder};

/// Configuration for a full pipeline run. Loadable from JSON; every field
/// has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub corpus: CorpusConfig,
    pub word2vec: Word2VecConfig,
    /// Tokens taken on each side of a window center.
    pub half_window: isize,
    /// Window samples per training batch.
    pub batch_size: usize,
    /// Classifier hyperparameters. `n_in` and `n_out` are overwritten from
    /// the window geometry and label set.
    pub network: NetworkConfig,
    pub transition: TransitionModel,
    /// Load embeddings from here when the file exists, otherwise save the
    /// freshly trained ones here.
    pub embeddings_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            corpus: CorpusConfig::default(),
            word2vec: Word2VecConfig::default(),
            half_window: 2,
            batch_size: 64,
            network: NetworkConfig::default(),
            transition: TransitionModel::MetaStable { stability: 0.9 },
            embeddings_path: None,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn with_corpus(mut self, corpus: CorpusConfig) -> Self {
        self.corpus = corpus;
        self
    }

    pub fn with_word2vec(mut self, word2vec: Word2VecConfig) -> Self {
        self.word2vec = word2vec;
        self
    }

    pub fn with_half_window(mut self, half_window: isize) -> Self {
        self.half_window = half_window;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_transition(mut self, transition: TransitionModel) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_embeddings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.embeddings_path = Some(path.into());
        self
    }

    /// Network config with the input and output widths filled in.
    pub fn network_for(&self, dimensions: usize, labels: usize) -> NetworkConfig {
        let window = (self.half_window.max(0) as usize)
            .saturating_mul(2)
            .saturating_add(1);
        self.network
            .clone()
            .with_shape(dimensions.saturating_mul(window), labels)
    }

    /// Check every stage's settings for `labels` classes before any work.
    pub fn validate(&self, labels: usize) -> std::result::Result<(), PipelineError> {
        self.word2vec.validate().at(Stage::EmbeddingTraining)?;
        let window_error = |msg: String| {
            Err(PipelineError::new(
                Stage::WindowBuilding,
                WindvecError::InvalidConfig(msg),
            ))
        };
        if self.half_window < 0 {
            return window_error(format!("half window {} is negative", self.half_window));
        }
        if self.batch_size == 0 {
            return window_error("batch size must be positive".into());
        }
        let feature_len = (self.half_window as usize)
            .checked_mul(2)
            .and_then(|w| w.checked_add(1))
            .and_then(|w| w.checked_mul(self.word2vec.dimensions));
        if feature_len.is_none() {
            return window_error(format!(
                "half window {} overflows the feature length",
                self.half_window
            ));
        }
        self.network_for(self.word2vec.dimensions, labels)
            .validate()
            .at(Stage::ClassifierTraining)?;
        self.transition.validate(labels).at(Stage::Decoding)
    }
}

/// Decoded label path of one sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceDecoding {
    /// Sentence label from the corpus.
    pub label: usize,
    pub path: DecodedPath,
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub corpus: CorpusStats,
    pub vocabulary_size: usize,
    pub embeddings_loaded: bool,
    /// Mean loss per embedding epoch; empty when embeddings were loaded.
    pub embedding_losses: Vec<f64>,
    pub training_samples: usize,
    pub sentences: Vec<SentenceDecoding>,
    /// Fraction of positions whose decoded label equals the sentence label.
    pub accuracy: f64,
}

/// End-to-end driver generic over the classifier backend.
pub struct Pipeline<T: DistributedTrainer> {
    config: PipelineConfig,
    trainer: T,
    cancel: Option<CancellationToken>,
}

impl<T: DistributedTrainer> Pipeline<T> {
    pub fn new(config: PipelineConfig, trainer: T) -> Self {
        Self {
            config,
            trainer,
            cancel: None,
        }
    }

    /// Cancel embedding training between epochs once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read the corpus at `path` and run every stage.
    pub fn run<P: AsRef<Path>>(&self, path: P) -> std::result::Result<PipelineReport, PipelineError> {
        let reader = CorpusReader::new(self.config.corpus.clone()).at(Stage::Tokenization)?;
        let corpus = reader.read_path(path).at(Stage::Tokenization)?;
        self.run_with_corpus(corpus)
    }

    /// Run every stage after tokenization on an already parsed corpus.
    pub fn run_with_corpus(
        &self,
        corpus: Corpus,
    ) -> std::result::Result<PipelineReport, PipelineError> {
        let config = &self.config;
        config.validate(corpus.labels.len())?;

        let (vectors, embedding_losses, embeddings_loaded) = self.embeddings(&corpus)?;

        let builder =
            WindowBuilder::new(config.half_window, &vectors).at(Stage::WindowBuilding)?;
        let mut batches =
            WindowBatches::new(builder, &corpus, config.batch_size).at(Stage::WindowBuilding)?;
        let training_samples = batches.total_samples();

        let network = config.network_for(vectors.dimensions(), corpus.labels.len());
        info!(
            n_in = network.n_in,
            n_out = network.n_out,
            samples = training_samples,
            workers = network.workers,
            "training window classifier"
        );
        let handle = self.trainer.configure(&network).at(Stage::ClassifierTraining)?;
        let model = self
            .trainer
            .submit(handle, &mut batches)
            .at(Stage::ClassifierTraining)?;

        let decoder = ViterbiDecoder::new(config.transition.clone());
        let mut sentences = Vec::with_capacity(corpus.len());
        let mut correct = 0usize;
        let mut positions = 0usize;
        for sentence in &corpus.sentences {
            if sentence.is_empty() {
                sentences.push(SentenceDecoding {
                    label: sentence.label,
                    path: DecodedPath {
                        labels: Vec::new(),
                        score: 0.0,
                    },
                });
                continue;
            }
            let path = decode_sentence(&builder, &model, &decoder, &sentence.tokens)
                .at(Stage::Decoding)?;
            correct += path.labels.iter().filter(|&&l| l == sentence.label).count();
            positions += path.len();
            sentences.push(SentenceDecoding {
                label: sentence.label,
                path,
            });
        }
        let accuracy = if positions == 0 {
            0.0
        } else {
            correct as f64 / positions as f64
        };
        info!(sentences = sentences.len(), accuracy, "decoding complete");

        Ok(PipelineReport {
            corpus: corpus.stats,
            vocabulary_size: vectors.vocabulary().len(),
            embeddings_loaded,
            embedding_losses,
            training_samples,
            sentences,
            accuracy,
        })
    }

    fn embeddings(
        &self,
        corpus: &Corpus,
    ) -> std::result::Result<(WordVectors, Vec<f64>, bool), PipelineError> {
        let config = &self.config;
        if let Some(path) = config.embeddings_path.as_deref().filter(|p| p.exists()) {
            let vectors = WordVectors::load(path).at(Stage::EmbeddingTraining)?;
            info!(
                path = %path.display(),
                vocabulary = vectors.vocabulary().len(),
                dimensions = vectors.dimensions(),
                "loaded embeddings"
            );
            return Ok((vectors, Vec::new(), true));
        }

        let sequences: Vec<&[String]> = corpus.token_sequences().collect();
        let vocabulary =
            Vocabulary::build(&sequences, config.word2vec.min_count).at(Stage::Vocabulary)?;
        debug!(vocabulary = vocabulary.len(), "vocabulary built");

        let mut trainer =
            Word2VecTrainer::new(config.word2vec.clone()).at(Stage::EmbeddingTraining)?;
        if let Some(token) = &self.cancel {
            trainer = trainer.with_cancellation(token.clone());
        }
        let (vectors, report) = trainer
            .train(&sequences, vocabulary)
            .at(Stage::EmbeddingTraining)?;

        if let Some(path) = &config.embeddings_path {
            vectors.save(path).at(Stage::EmbeddingTraining)?;
            info!(path = %path.display(), "saved embeddings");
        }
        Ok((vectors, report.losses(), false))
    }
}

/// Score every window of `tokens` and decode the per-position
/// log-probabilities.
pub fn decode_sentence<M: ScoringModel>(
    builder: &WindowBuilder<'_>,
    model: &M,
    decoder: &ViterbiDecoder,
    tokens: &[String],
) -> Result<DecodedPath> {
    let rows: Vec<Vec<f32>> = (0..tokens.len())
        .map(|position| {
            let mut features = Vec::with_capacity(builder.feature_len());
            builder.extend_features(tokens, position, &mut features);
            features
        })
        .collect();
    let scores = model.score_rows(&rows)?.ln()?;
    decoder.decode(&scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::BatchIterator;
    use crate::corpus::{LabelSet, LabeledSentence};

    /// Scores by softmax of negative squared distance to per-class means.
    struct CentroidTrainer;

    struct Centroids {
        means: Vec<Vec<f32>>,
    }

    impl ScoringModel for Centroids {
        fn num_classes(&self) -> usize {
            self.means.len()
        }

        fn score(&self, features: &[f32]) -> Result<Vec<f32>> {
            let logits: Vec<f32> = self
                .means
                .iter()
                .map(|m| -m.iter().zip(features).map(|(a, b)| (a - b).powi(2)).sum::<f32>())
                .collect();
            let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
            let total: f32 = exp.iter().sum();
            Ok(exp.into_iter().map(|e| e / total).collect())
        }
    }

    impl DistributedTrainer for CentroidTrainer {
        type Handle = NetworkConfig;
        type Model = Centroids;

        fn configure(&self, config: &NetworkConfig) -> Result<NetworkConfig> {
            config.validate()?;
            Ok(config.clone())
        }

        fn submit(
            &self,
            handle: NetworkConfig,
            batches: &mut dyn BatchIterator,
        ) -> Result<Centroids> {
            let mut sums = vec![vec![0.0f32; handle.n_in]; handle.n_out];
            let mut counts = vec![0usize; handle.n_out];
            batches.reset();
            while let Some(batch) = batches.next_batch() {
                for (i, &label) in batch.labels.iter().enumerate() {
                    for (s, v) in sums[label].iter_mut().zip(batch.row(i)) {
                        *s += v;
                    }
                    counts[label] += 1;
                }
            }
            let means = sums
                .into_iter()
                .zip(counts)
                .map(|(s, c)| s.into_iter().map(|v| v / c.max(1) as f32).collect())
                .collect();
            Ok(Centroids { means })
        }
    }

    /// Returns raw margins instead of probabilities.
    struct Margins;

    impl ScoringModel for Margins {
        fn num_classes(&self) -> usize {
            2
        }

        fn score(&self, _features: &[f32]) -> Result<Vec<f32>> {
            Ok(vec![-1.0, 0.5])
        }
    }

    struct MarginTrainer;

    impl DistributedTrainer for MarginTrainer {
        type Handle = ();
        type Model = Margins;

        fn configure(&self, _config: &NetworkConfig) -> Result<()> {
            Ok(())
        }

        fn submit(&self, _handle: (), _batches: &mut dyn BatchIterator) -> Result<Margins> {
            Ok(Margins)
        }
    }

    struct FailingTrainer;

    impl DistributedTrainer for FailingTrainer {
        type Handle = ();
        type Model = Centroids;

        fn configure(&self, _config: &NetworkConfig) -> Result<()> {
            Ok(())
        }

        fn submit(&self, _handle: (), _batches: &mut dyn BatchIterator) -> Result<Centroids> {
            Err(WindvecError::training_failed(std::io::Error::other(
                "replica lost",
            )))
        }
    }

    fn corpus() -> Corpus {
        let rows = [
            (0, "good great fine good"),
            (1, "bad awful poor bad"),
            (0, "great good fine"),
            (1, "awful bad poor"),
        ];
        let sentences = (0..6)
            .flat_map(|_| rows.iter())
            .map(|(label, text)| {
                LabeledSentence::new(*label, text.split_whitespace().map(String::from).collect())
            })
            .collect();
        Corpus::from_sentences(LabelSet::new(["neg", "pos"]), sentences).unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_word2vec(
                Word2VecConfig::default()
                    .with_dimensions(8)
                    .with_window(2)
                    .with_min_count(1)
                    .with_epochs(3),
            )
            .with_half_window(1)
            .with_batch_size(7)
    }

    #[test]
    fn test_run_with_corpus() {
        let report = Pipeline::new(config(), CentroidTrainer)
            .run_with_corpus(corpus())
            .unwrap();

        assert_eq!(report.vocabulary_size, 6);
        assert_eq!(report.embedding_losses.len(), 3);
        assert!(!report.embeddings_loaded);
        assert_eq!(report.sentences.len(), 24);
        assert_eq!(report.training_samples, 84);
        for (decoding, sentence) in report.sentences.iter().zip(&corpus().sentences) {
            assert_eq!(decoding.path.len(), sentence.len());
            assert!(decoding.path.labels.iter().all(|&l| l < 2));
        }
        assert!((0.0..=1.0).contains(&report.accuracy));
    }

    #[test]
    fn test_embeddings_saved_then_loaded() {
        let path = std::env::temp_dir().join(format!(
            "windvec-pipeline-{}.safetensors",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        let config = config().with_embeddings_path(&path);

        let first = Pipeline::new(config.clone(), CentroidTrainer)
            .run_with_corpus(corpus())
            .unwrap();
        assert!(!first.embeddings_loaded);
        assert!(path.exists());

        let second = Pipeline::new(config, CentroidTrainer)
            .run_with_corpus(corpus())
            .unwrap();
        assert!(second.embeddings_loaded);
        assert!(second.embedding_losses.is_empty());
        assert_eq!(second.sentences, first.sentences);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_config_fails_before_training() {
        let err = Pipeline::new(config().with_half_window(-1), CentroidTrainer)
            .run_with_corpus(corpus())
            .unwrap_err();
        assert_eq!(err.stage, Stage::WindowBuilding);
        assert!(matches!(err.source, WindvecError::InvalidConfig(_)));

        let err = Pipeline::new(config().with_half_window(isize::MAX), CentroidTrainer)
            .run_with_corpus(corpus())
            .unwrap_err();
        assert_eq!(err.stage, Stage::WindowBuilding);
        assert!(matches!(err.source, WindvecError::InvalidConfig(_)));

        let bad_transition = config().with_transition(TransitionModel::MetaStable { stability: 2.0 });
        let err = Pipeline::new(bad_transition, CentroidTrainer)
            .run_with_corpus(corpus())
            .unwrap_err();
        assert_eq!(err.stage, Stage::Decoding);
    }

    #[test]
    fn test_negative_scores_fail_decoding() {
        let err = Pipeline::new(config(), MarginTrainer)
            .run_with_corpus(corpus())
            .unwrap_err();
        assert_eq!(err.stage, Stage::Decoding);
        assert!(matches!(err.source, WindvecError::InvalidConfig(_)));
    }

    #[test]
    fn test_trainer_failure_is_tagged() {
        let err = Pipeline::new(config(), FailingTrainer)
            .run_with_corpus(corpus())
            .unwrap_err();
        assert_eq!(err.stage, Stage::ClassifierTraining);
        assert!(matches!(err.source, WindvecError::TrainingFailed(_)));
        assert!(err.to_string().starts_with("classifier training failed"));
    }

    #[test]
    fn test_cancelled_embedding_training() {
        let token = CancellationToken::new();
        token.cancel();
        let err = Pipeline::new(config(), CentroidTrainer)
            .with_cancellation(token)
            .run_with_corpus(corpus())
            .unwrap_err();
        assert_eq!(err.stage, Stage::EmbeddingTraining);
        assert!(matches!(
            err.source,
            WindvecError::Cancelled {
                completed_epochs: 0
            }
        ));
    }

    #[test]
    fn test_missing_corpus_file() {
        let err = Pipeline::new(config(), CentroidTrainer)
            .run("/nonexistent/windvec/corpus.csv")
            .unwrap_err();
        assert_eq!(err.stage, Stage::Tokenization);
        assert!(matches!(err.source, WindvecError::Io(_)));
    }

    #[test]
    fn test_config_json() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"half_window": 3, "transition": {"kind": "uniform"}, "word2vec": {"dimensions": 16}}"#,
        )
        .unwrap();
        assert_eq!(config.half_window, 3);
        assert_eq!(config.transition, TransitionModel::Uniform);
        assert_eq!(config.word2vec.dimensions, 16);
        assert_eq!(config.batch_size, PipelineConfig::default().batch_size);
    }
}
