//! # Sequence Decoding
//!
//! Viterbi decoding of per-position label scores under a transition model.

pub mod matrix;
pub mod transition;
pub mod viterbi;

pub use matrix::ScoreMatrix;
pub use transition::TransitionModel;
pub use viterbi::{DecodedPath, ViterbiDecoder, decode};
