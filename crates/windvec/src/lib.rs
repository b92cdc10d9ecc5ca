//! # Windvec
//!
//! Word2Vec moving-window classification with Viterbi sequence decoding.
//! Re-exports [`windvec_core`] and the local training backend from
//! [`windvec_trainer`].
//!
//! ```no_run
//! use windvec::{LocalCoordinator, Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default(), LocalCoordinator::new());
//! let report = pipeline.run("data/tweets.csv").unwrap();
//! println!("accuracy {:.3}", report.accuracy);
//! ```

pub use windvec_core::*;
pub use windvec_trainer::{FeedForward, LocalCoordinator, NetworkHandle, TrainedNetwork};
