//! # Windvec Core
//!
//! Word embeddings, moving-window features and Viterbi decoding for
//! sentence-labeled text. The classifier that sits between windowing and
//! decoding is reached only through the [`coordinator`] traits.
//!
//! ## Quick Start
//!
//! ```rust
//! use windvec_core::decode::{decode, ScoreMatrix};
//!
//! let scores = ScoreMatrix::from_rows(&[vec![1.0, 3.0], vec![2.0, 2.0]], 2).unwrap();
//! let path = decode(&scores, None).unwrap();
//!
//! assert_eq!(path.labels, vec![1, 0]);
//! assert_eq!(path.score, 5.0);
//! ```
pub mod cancel;
pub mod coordinator;
pub mod corpus;
pub mod decode;
pub mod embedding;
pub mod error;
pub mod pipeline;
pub mod text;
pub mod window;

// Re-export primary API
pub use cancel::CancellationToken;
pub use coordinator::{
    Activation, Batch, BatchIterator, DistributedTrainer, MemoryBatches, NetworkConfig,
    ScoringModel,
};
pub use corpus::{Corpus, CorpusConfig, CorpusReader, CorpusStats, LabelSet, LabeledSentence};
pub use decode::{DecodedPath, ScoreMatrix, TransitionModel, ViterbiDecoder, decode};
pub use embedding::{
    EmbeddingTable, Objective, Vocabulary, Word2VecConfig, Word2VecTrainer, WordVectors,
    build_vocabulary,
};
pub use error::{PipelineError, Result, Stage, StageExt, WindvecError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport, SentenceDecoding};
pub use text::{Sanitizer, SanitizerConfig, Tokenizer};
pub use window::{WindowBatches, WindowBuilder, WindowSample, build_windows};
