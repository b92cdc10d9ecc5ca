//! # Vocabulary
//!
//! Dense token indices with occurrence counts.
//!
//! Indices are assigned by descending frequency; tokens with equal counts keep
//! the order in which they were first seen in the corpus. The same corpus
//! therefore always yields the same vocabulary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WindvecError};

/// One retained vocabulary token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub token: String,
    pub count: u64,
}

/// Closed set of retained tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    entries: Vec<VocabEntry>,
    index: HashMap<String, usize>,
    total_count: u64,
}

impl Vocabulary {
    /// Count tokens across the corpus and keep those occurring at least
    /// `min_count` times (a `min_count` of 0 behaves like 1).
    ///
    /// # Errors
    ///
    /// Returns `WindvecError::EmptyInput` if the corpus has no tokens or if
    /// no token reaches `min_count`.
    pub fn build<I, S>(corpus: I, min_count: u64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[String]>,
    {
        let min_count = min_count.max(1);
        // token -> (count, first seen)
        let mut counts: HashMap<&str, (u64, usize)> = HashMap::new();
        let sequences: Vec<S> = corpus.into_iter().collect();

        for sequence in &sequences {
            for token in sequence.as_ref() {
                let next = counts.len();
                counts.entry(token.as_str()).or_insert((0, next)).0 += 1;
            }
        }

        if counts.is_empty() {
            return Err(WindvecError::EmptyInput("corpus has no tokens".into()));
        }

        let distinct = counts.len();
        let mut kept: Vec<(&str, u64, usize)> = counts
            .into_iter()
            .filter(|(_, (count, _))| *count >= min_count)
            .map(|(token, (count, seen))| (token, count, seen))
            .collect();

        if kept.is_empty() {
            return Err(WindvecError::EmptyInput(format!(
                "no token occurs at least {min_count} time(s)"
            )));
        }

        kept.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        debug!(distinct, retained = kept.len(), min_count, "vocabulary counted");

        let entries = kept
            .into_iter()
            .map(|(token, count, _)| VocabEntry {
                token: token.to_string(),
                count,
            })
            .collect();

        Self::from_entries(entries)
    }

    /// Rebuild a vocabulary from entries in index order.
    ///
    /// # Errors
    ///
    /// `EmptyInput` for no entries, `Format` for duplicate tokens or zero counts.
    pub fn from_entries(entries: Vec<VocabEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(WindvecError::EmptyInput("vocabulary has no entries".into()));
        }

        let mut index = HashMap::with_capacity(entries.len());
        let mut total_count = 0u64;
        for (i, entry) in entries.iter().enumerate() {
            if entry.count == 0 {
                return Err(WindvecError::Format(format!(
                    "token {:?} has a zero count",
                    entry.token
                )));
            }
            if index.insert(entry.token.clone(), i).is_some() {
                return Err(WindvecError::Format(format!(
                    "duplicate token {:?}",
                    entry.token
                )));
            }
            total_count += entry.count;
        }

        Ok(Self {
            entries,
            index,
            total_count,
        })
    }

    /// Index of a token, if retained.
    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    /// Index of a token.
    ///
    /// # Errors
    ///
    /// `WindvecError::NotFound` if the token is not in the vocabulary.
    pub fn lookup(&self, token: &str) -> Result<usize> {
        self.index_of(token)
            .ok_or_else(|| WindvecError::token_not_found(token))
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.token.as_str())
    }

    pub fn count(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|e| e.count)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Entries in index order.
    pub fn entries(&self) -> &[VocabEntry] {
        &self.entries
    }

    /// Sum of all retained counts.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a vocabulary from token sequences. See [`Vocabulary::build`].
pub fn build_vocabulary<I, S>(corpus: I, min_count: u64) -> Result<Vocabulary>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[String]>,
{
    Vocabulary::build(corpus, min_count)
}
