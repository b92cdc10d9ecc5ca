//! # Viterbi Decoding
//!
//! Finds the highest-scoring label sequence for a score matrix under an
//! additive transition model. `O(positions x labels^2)` time and
//! `O(positions x labels)` space.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::decode::matrix::ScoreMatrix;
use crate::decode::transition::TransitionModel;
use crate::error::{Result, WindvecError};

/// Best label sequence and its total score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedPath {
    pub labels: Vec<usize>,
    pub score: f32,
}

impl DecodedPath {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Viterbi decoder bound to a transition model.
#[derive(Debug, Clone, Default)]
pub struct ViterbiDecoder {
    transitions: TransitionModel,
}

/// Path score and backpointer for one cell of the DP table.
#[derive(Debug, Clone, Copy)]
struct PathState {
    score: f32,
    prev_label: usize,
}

impl ViterbiDecoder {
    pub fn new(transitions: TransitionModel) -> Self {
        Self { transitions }
    }

    pub fn transitions(&self) -> &TransitionModel {
        &self.transitions
    }

    /// Decode the optimal label sequence.
    ///
    /// Ties at any step go to the lowest label index.
    ///
    /// # Errors
    ///
    /// `EmptyInput` for a matrix with zero positions, `InvalidConfig` if the
    /// transition model does not fit the label count.
    pub fn decode(&self, scores: &ScoreMatrix) -> Result<DecodedPath> {
        let positions = scores.positions();
        let labels = scores.labels();
        if positions == 0 {
            return Err(WindvecError::EmptyInput(
                "score matrix has no positions".into(),
            ));
        }
        let transition = self.transitions.table(labels)?;

        let mut dp = vec![
            PathState {
                score: f32::NEG_INFINITY,
                prev_label: 0,
            };
            positions * labels
        ];

        for (label, state) in dp[..labels].iter_mut().enumerate() {
            state.score = scores.get(0, label);
        }

        // Forward pass
        for pos in 1..positions {
            let (done, rest) = dp.split_at_mut(pos * labels);
            let prev = &done[(pos - 1) * labels..];
            let curr = &mut rest[..labels];

            for (label, state) in curr.iter_mut().enumerate() {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for (prev_label, prev_state) in prev.iter().enumerate() {
                    let score = prev_state.score + transition[prev_label * labels + label];
                    if score > best_score {
                        best_score = score;
                        best_prev = prev_label;
                    }
                }

                state.score = best_score + scores.get(pos, label);
                state.prev_label = best_prev;
            }
        }

        // Best final label
        let last = &dp[(positions - 1) * labels..];
        let mut best_final = 0;
        for (label, state) in last.iter().enumerate() {
            if state.score > last[best_final].score {
                best_final = label;
            }
        }
        let score = last[best_final].score;

        // Backtrack
        let mut path = Vec::with_capacity(positions);
        let mut label = best_final;
        path.push(label);
        for pos in (1..positions).rev() {
            label = dp[pos * labels + label].prev_label;
            path.push(label);
        }
        path.reverse();

        trace!(positions, labels, score, "decoded sequence");
        Ok(DecodedPath {
            labels: path,
            score,
        })
    }
}

/// Decode with an optional transition model; `None` means uniform transitions.
pub fn decode(scores: &ScoreMatrix, transitions: Option<&TransitionModel>) -> Result<DecodedPath> {
    ViterbiDecoder::new(transitions.cloned().unwrap_or_default()).decode(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[f32]]) -> ScoreMatrix {
        let labels = rows.first().map_or(1, |r| r.len());
        ScoreMatrix::from_rows(rows, labels).unwrap()
    }

    #[test]
    fn test_single_cell() {
        let path = decode(&matrix(&[&[5.0]]), None).unwrap();
        assert_eq!(path.labels, vec![0]);
        assert_eq!(path.score, 5.0);
    }

    #[test]
    fn test_tie_goes_to_lowest_label() {
        // [1,0] and [1,1] both score 5.
        let path = decode(&matrix(&[&[1.0, 3.0], &[2.0, 2.0]]), None).unwrap();
        assert_eq!(path.labels, vec![1, 0]);
        assert_eq!(path.score, 5.0);
    }

    #[test]
    fn test_single_column_sums() {
        let path = decode(&matrix(&[&[1.5], &[-2.0], &[4.0]]), None).unwrap();
        assert_eq!(path.labels, vec![0, 0, 0]);
        assert_eq!(path.score, 3.5);
    }

    #[test]
    fn test_empty_matrix_rejected() {
        let empty = ScoreMatrix::from_rows::<Vec<f32>>(&[], 3).unwrap();
        assert!(matches!(
            decode(&empty, None),
            Err(WindvecError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_decoding_is_idempotent() {
        let scores = matrix(&[&[0.2, 0.5, 0.3], &[0.9, 0.05, 0.05], &[0.1, 0.1, 0.8]]);
        let decoder = ViterbiDecoder::new(TransitionModel::MetaStable { stability: 0.6 });
        let first = decoder.decode(&scores).unwrap();
        for _ in 0..5 {
            assert_eq!(decoder.decode(&scores).unwrap(), first);
        }
    }

    #[test]
    fn test_transitions_change_path() {
        let probs = matrix(&[&[0.9, 0.1], &[0.4, 0.6], &[0.9, 0.1]]).ln().unwrap();

        let free = decode(&probs, None).unwrap();
        assert_eq!(free.labels, vec![0, 1, 0]);

        let sticky = decode(&probs, Some(&TransitionModel::MetaStable { stability: 0.9 })).unwrap();
        assert_eq!(sticky.labels, vec![0, 0, 0]);
        let expected = 0.9f32.ln() + 0.4f32.ln() + 0.9f32.ln() + 2.0 * 0.9f32.ln();
        assert!((sticky.score - expected).abs() < 1e-5);
    }

    #[test]
    fn test_explicit_matrix_forbids_transition() {
        let transitions = TransitionModel::Matrix {
            scores: vec![vec![0.0, f32::NEG_INFINITY], vec![0.0, 0.0]],
        };
        let path = decode(&matrix(&[&[1.0, 0.0], &[0.0, 5.0]]), Some(&transitions)).unwrap();
        assert_eq!(path.labels, vec![1, 1]);
        assert_eq!(path.score, 5.0);
    }

    #[test]
    fn test_transition_shape_mismatch() {
        let transitions = TransitionModel::Matrix {
            scores: vec![vec![0.0; 3]; 3],
        };
        assert!(matches!(
            decode(&matrix(&[&[1.0, 2.0]]), Some(&transitions)),
            Err(WindvecError::InvalidConfig(_))
        ));
    }
}
