//! # Embedding Table
//!
//! Read-only word vectors produced by training, keyed by vocabulary index.

use std::cmp::Ordering;

use crate::embedding::vocabulary::Vocabulary;
use crate::error::{Result, WindvecError};

/// Row-major `rows x dimensions` matrix of word vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    rows: usize,
    dimensions: usize,
    data: Vec<f32>,
}

impl EmbeddingTable {
    /// Wrap raw row-major values.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `data.len() != rows * dimensions`.
    pub fn from_raw(rows: usize, dimensions: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(dimensions) != Some(data.len()) {
            return Err(WindvecError::InvalidConfig(format!(
                "embedding data has {} values, expected {rows} x {dimensions}",
                data.len()
            )));
        }
        Ok(Self {
            rows,
            dimensions,
            data,
        })
    }

    /// All-zero table.
    pub fn zeros(rows: usize, dimensions: usize) -> Self {
        Self {
            rows,
            dimensions,
            data: vec![0.0; rows * dimensions],
        }
    }

    /// Vector for a vocabulary index.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.dimensions;
        Some(&self.data[start..start + self.dimensions])
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Vector dimensionality D.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// A trained vocabulary together with its embedding table.
#[derive(Debug, Clone, PartialEq)]
pub struct WordVectors {
    vocabulary: Vocabulary,
    table: EmbeddingTable,
    zero: Vec<f32>,
}

impl WordVectors {
    /// Pair a vocabulary with its table.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` unless the table has exactly one row per vocabulary entry.
    pub fn new(vocabulary: Vocabulary, table: EmbeddingTable) -> Result<Self> {
        if vocabulary.len() != table.rows() {
            return Err(WindvecError::InvalidConfig(format!(
                "vocabulary has {} entries but table has {} rows",
                vocabulary.len(),
                table.rows()
            )));
        }
        let zero = vec![0.0; table.dimensions()];
        Ok(Self {
            vocabulary,
            table,
            zero,
        })
    }

    /// Vector for a token.
    ///
    /// # Errors
    ///
    /// `WindvecError::NotFound` if the token is out of vocabulary.
    pub fn vector(&self, token: &str) -> Result<&[f32]> {
        let index = self.vocabulary.lookup(token)?;
        self.table
            .row(index)
            .ok_or_else(|| WindvecError::token_not_found(token))
    }

    /// Vector for a token, or the zero vector when out of vocabulary.
    pub fn vector_or_zero(&self, token: &str) -> &[f32] {
        self.vector(token).unwrap_or(self.zero.as_slice())
    }

    /// Cosine similarity between two tokens. Zero vectors have similarity 0.
    pub fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        Ok(cosine(self.vector(a)?, self.vector(b)?))
    }

    /// The `n` tokens most similar to `token`, excluding itself.
    pub fn nearest(&self, token: &str, n: usize) -> Result<Vec<(String, f32)>> {
        let query_index = self.vocabulary.lookup(token)?;
        let query = self.vector(token)?;

        let mut scored: Vec<(usize, f32)> = (0..self.table.rows())
            .filter(|&i| i != query_index)
            .filter_map(|i| self.table.row(i).map(|row| (i, cosine(query, row))))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(n)
            .filter_map(|(i, score)| {
                self.vocabulary
                    .token(i)
                    .map(|t| (t.to_string(), score))
            })
            .collect())
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn table(&self) -> &EmbeddingTable {
        &self.table
    }

    pub fn dimensions(&self) -> usize {
        self.table.dimensions()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::vocabulary::VocabEntry;

    fn vectors() -> WordVectors {
        let vocab = Vocabulary::from_entries(
            ["king", "queen", "apple"]
                .iter()
                .map(|t| VocabEntry {
                    token: t.to_string(),
                    count: 1,
                })
                .collect(),
        )
        .unwrap();
        let table = EmbeddingTable::from_raw(
            3,
            2,
            vec![1.0, 0.0, 0.9, 0.1, 0.0, 1.0],
        )
        .unwrap();
        WordVectors::new(vocab, table).unwrap()
    }

    #[test]
    fn test_vector_lookup() {
        let wv = vectors();
        assert_eq!(wv.vector("queen").unwrap(), &[0.9f32, 0.1]);
        assert_eq!(wv.vector("king").unwrap().len(), wv.dimensions());
        assert!(matches!(
            wv.vector("pear"),
            Err(WindvecError::NotFound { kind: "token", .. })
        ));
        assert_eq!(wv.vector_or_zero("pear"), &[0.0f32, 0.0]);
    }

    #[test]
    fn test_nearest() {
        let wv = vectors();
        let nearest = wv.nearest("king", 2).unwrap();
        assert_eq!(nearest[0].0, "queen");
        assert_eq!(nearest[1].0, "apple");
        assert!(wv.similarity("king", "apple").unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_shape_checks() {
        assert!(EmbeddingTable::from_raw(2, 3, vec![0.0; 5]).is_err());

        let vocab = Vocabulary::from_entries(vec![VocabEntry {
            token: "a".into(),
            count: 1,
        }])
        .unwrap();
        assert!(WordVectors::new(vocab, EmbeddingTable::zeros(2, 4)).is_err());
    }
}
