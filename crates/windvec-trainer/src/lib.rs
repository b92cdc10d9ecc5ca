//! # Windvec Trainer
//!
//! A local implementation of the windvec training contract. Replicas of a
//! small candle feed-forward network train on separate batches in parallel
//! and are merged by parameter averaging after every round.

pub mod coordinator;
pub mod network;
pub mod optimizer;

pub use coordinator::{LocalCoordinator, NetworkHandle, TrainedNetwork};
pub use network::FeedForward;
pub use optimizer::{MomentumSgd, SgdParams};

use windvec_core::WindvecError;

/// Wrap a candle failure as a backend training failure.
pub(crate) fn training_failed(err: candle_core::Error) -> WindvecError {
    WindvecError::training_failed(err)
}
