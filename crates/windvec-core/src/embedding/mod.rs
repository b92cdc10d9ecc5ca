//! # Word Embeddings
//!
//! Vocabulary construction, skip-gram training and persistence of the
//! resulting [`WordVectors`].

pub mod persist;
pub mod sampler;
pub mod table;
pub mod trainer;
pub mod vocabulary;

pub use table::{EmbeddingTable, WordVectors};
pub use trainer::{
    EpochStats, Objective, TrainingReport, Word2VecConfig, Word2VecTrainer, train,
};
pub use vocabulary::{VocabEntry, Vocabulary, build_vocabulary};
