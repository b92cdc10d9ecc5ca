//! # Moving Window Features
//!
//! Turns a labeled sentence into one fixed-width training example per token
//! position: the embeddings of the `2k + 1` tokens centered on the position,
//! concatenated in order. Positions that fall outside the sentence and
//! out-of-vocabulary tokens contribute zero vectors.

use crate::coordinator::{Batch, BatchIterator};
use crate::corpus::{Corpus, LabeledSentence};
use crate::embedding::WordVectors;
use crate::error::{Result, WindvecError};

/// One windowed example.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSample {
    /// Center position in the sentence.
    pub position: usize,
    /// `D * (2k + 1)` concatenated embeddings.
    pub features: Vec<f32>,
    /// Class index inherited from the sentence.
    pub label: usize,
}

/// Validated window geometry bound to a set of word vectors.
#[derive(Debug, Clone, Copy)]
pub struct WindowBuilder<'v> {
    vectors: &'v WordVectors,
    half_window: usize,
    window_len: usize,
    feature_len: usize,
}

impl<'v> WindowBuilder<'v> {
    /// # Errors
    ///
    /// `InvalidConfig` if `half_window` is negative, the vectors have zero
    /// dimensions, or the feature length does not fit in `usize`.
    pub fn new(half_window: isize, vectors: &'v WordVectors) -> Result<Self> {
        let half_window = usize::try_from(half_window).map_err(|_| {
            WindvecError::InvalidConfig(format!("half window {half_window} is negative"))
        })?;
        if vectors.dimensions() == 0 {
            return Err(WindvecError::InvalidConfig(
                "embedding dimensionality is zero".into(),
            ));
        }
        let window_len = half_window
            .checked_mul(2)
            .and_then(|w| w.checked_add(1))
            .ok_or_else(|| {
                WindvecError::InvalidConfig(format!("half window {half_window} is too large"))
            })?;
        let feature_len = vectors.dimensions().checked_mul(window_len).ok_or_else(|| {
            WindvecError::InvalidConfig(format!(
                "{} dimensions x {window_len} tokens overflows the feature length",
                vectors.dimensions()
            ))
        })?;
        Ok(Self {
            vectors,
            half_window,
            window_len,
            feature_len,
        })
    }

    pub fn half_window(&self) -> usize {
        self.half_window
    }

    /// Tokens per window, `2k + 1`.
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Length of every feature vector, `D * (2k + 1)`.
    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn vectors(&self) -> &'v WordVectors {
        self.vectors
    }

    /// Lazily window `sentence`. Each call starts from position 0 and yields
    /// the same samples.
    pub fn windows<'s>(&self, sentence: &'s LabeledSentence) -> Windows<'v, 's> {
        Windows {
            builder: *self,
            sentence,
            position: 0,
        }
    }

    /// Append the features of the window centered on `position` to `out`.
    pub fn extend_features(&self, tokens: &[String], position: usize, out: &mut Vec<f32>) {
        let dims = self.vectors.dimensions();
        out.reserve(self.feature_len());

        for slot in 0..self.window_len() {
            let idx = (position + slot).checked_sub(self.half_window);
            match idx.and_then(|i| tokens.get(i)) {
                Some(token) => out.extend_from_slice(self.vectors.vector_or_zero(token)),
                None => out.extend(std::iter::repeat_n(0.0, dims)),
            }
        }
    }

    fn sample(&self, sentence: &LabeledSentence, position: usize) -> WindowSample {
        let mut features = Vec::with_capacity(self.feature_len());
        self.extend_features(&sentence.tokens, position, &mut features);
        WindowSample {
            position,
            features,
            label: sentence.label,
        }
    }
}

/// Lazy iterator over the windows of one sentence.
#[derive(Debug, Clone)]
pub struct Windows<'v, 's> {
    builder: WindowBuilder<'v>,
    sentence: &'s LabeledSentence,
    position: usize,
}

impl Iterator for Windows<'_, '_> {
    type Item = WindowSample;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.sentence.len() {
            return None;
        }
        let sample = self.builder.sample(self.sentence, self.position);
        self.position += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.sentence.len().saturating_sub(self.position);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Windows<'_, '_> {}

/// Window one sentence. See [`WindowBuilder`].
pub fn build_windows<'v, 's>(
    sentence: &'s LabeledSentence,
    vectors: &'v WordVectors,
    half_window: isize,
) -> Result<Windows<'v, 's>> {
    Ok(WindowBuilder::new(half_window, vectors)?.windows(sentence))
}

/// Restartable batch stream of window samples over a whole corpus.
#[derive(Debug, Clone)]
pub struct WindowBatches<'a> {
    builder: WindowBuilder<'a>,
    corpus: &'a Corpus,
    batch_size: usize,
    sentence: usize,
    position: usize,
}

impl<'a> WindowBatches<'a> {
    /// # Errors
    ///
    /// `InvalidConfig` if `batch_size` is zero.
    pub fn new(builder: WindowBuilder<'a>, corpus: &'a Corpus, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(WindvecError::InvalidConfig("batch size must be positive".into()));
        }
        Ok(Self {
            builder,
            corpus,
            batch_size,
            sentence: 0,
            position: 0,
        })
    }

    /// Samples produced by one full pass.
    pub fn total_samples(&self) -> usize {
        self.corpus.sentences.iter().map(LabeledSentence::len).sum()
    }
}

impl BatchIterator for WindowBatches<'_> {
    fn next_batch(&mut self) -> Option<Batch> {
        let columns = self.builder.feature_len();
        let mut features = Vec::with_capacity(columns * self.batch_size);
        let mut labels = Vec::with_capacity(self.batch_size);

        while labels.len() < self.batch_size {
            let Some(sentence) = self.corpus.sentences.get(self.sentence) else {
                break;
            };
            if self.position >= sentence.len() {
                self.sentence += 1;
                self.position = 0;
                continue;
            }
            self.builder
                .extend_features(&sentence.tokens, self.position, &mut features);
            labels.push(sentence.label);
            self.position += 1;
        }

        if labels.is_empty() {
            None
        } else {
            Some(Batch::new(features, labels, columns))
        }
    }

    fn reset(&mut self) {
        self.sentence = 0;
        self.position = 0;
    }

    fn input_columns(&self) -> usize {
        self.builder.feature_len()
    }

    fn num_classes(&self) -> usize {
        self.corpus.labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::LabelSet;
    use crate::embedding::{EmbeddingTable, VocabEntry, Vocabulary};

    /// "a" -> [1, 1], "b" -> [2, 2], "c" -> [3, 3]
    fn vectors() -> WordVectors {
        let entries = ["a", "b", "c"]
            .iter()
            .map(|t| VocabEntry {
                token: t.to_string(),
                count: 1,
            })
            .collect();
        let table =
            EmbeddingTable::from_raw(3, 2, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]).unwrap();
        WordVectors::new(Vocabulary::from_entries(entries).unwrap(), table).unwrap()
    }

    fn sentence(tokens: &[&str], label: usize) -> LabeledSentence {
        LabeledSentence::new(label, tokens.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_window_features_zero_padded() {
        let wv = vectors();
        let builder = WindowBuilder::new(1, &wv).unwrap();
        let samples: Vec<_> = builder.windows(&sentence(&["a", "b", "c"], 2)).collect();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].features, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        assert_eq!(samples[1].features, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        assert_eq!(samples[2].features, vec![2.0, 2.0, 3.0, 3.0, 0.0, 0.0]);
        assert!(samples.iter().all(|s| s.label == 2));
        assert_eq!(samples[2].position, 2);
    }

    #[test]
    fn test_feature_length_constant() {
        let wv = vectors();
        for k in 0..4isize {
            let builder = WindowBuilder::new(k, &wv).unwrap();
            let expected = 2 * (2 * k as usize + 1);
            for sample in builder.windows(&sentence(&["a", "b", "c", "a", "b"], 0)) {
                assert_eq!(sample.features.len(), expected);
            }
        }
    }

    #[test]
    fn test_short_sentence_never_fails() {
        let wv = vectors();
        let samples: Vec<_> = build_windows(&sentence(&["b"], 1), &wv, 2)
            .unwrap()
            .collect();

        assert_eq!(samples.len(), 1);
        let mut expected = vec![0.0; 10];
        expected[4] = 2.0;
        expected[5] = 2.0;
        assert_eq!(samples[0].features, expected);
    }

    #[test]
    fn test_out_of_vocabulary_is_zero() {
        let wv = vectors();
        let samples: Vec<_> = build_windows(&sentence(&["zzz"], 0), &wv, 0)
            .unwrap()
            .collect();
        assert_eq!(samples[0].features, vec![0.0, 0.0]);
    }

    #[test]
    fn test_windowing_is_restartable() {
        let wv = vectors();
        let builder = WindowBuilder::new(2, &wv).unwrap();
        let s = sentence(&["c", "a", "b", "b"], 1);

        let first: Vec<_> = builder.windows(&s).collect();
        let second: Vec<_> = builder.windows(&s).collect();
        assert_eq!(first, second);
        assert_eq!(builder.windows(&s).len(), 4);
    }

    #[test]
    fn test_invalid_geometry() {
        let wv = vectors();
        assert!(matches!(
            WindowBuilder::new(-1, &wv),
            Err(WindvecError::InvalidConfig(_))
        ));
        assert!(matches!(
            WindowBuilder::new(isize::MAX, &wv),
            Err(WindvecError::InvalidConfig(_))
        ));
        assert!(matches!(
            WindowBuilder::new(isize::MAX / 2, &wv),
            Err(WindvecError::InvalidConfig(_))
        ));

        let empty_dims = WordVectors::new(
            Vocabulary::from_entries(vec![VocabEntry {
                token: "a".into(),
                count: 1,
            }])
            .unwrap(),
            EmbeddingTable::zeros(1, 0),
        )
        .unwrap();
        assert!(matches!(
            WindowBuilder::new(1, &empty_dims),
            Err(WindvecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_batches_cover_corpus_and_reset() {
        let wv = vectors();
        let corpus = Corpus::from_sentences(
            LabelSet::default(),
            vec![sentence(&["a", "b", "c"], 0), sentence(&["c", "c"], 2)],
        )
        .unwrap();
        let builder = WindowBuilder::new(1, &wv).unwrap();
        let mut batches = WindowBatches::new(builder, &corpus, 2).unwrap();

        assert_eq!(batches.input_columns(), 6);
        assert_eq!(batches.num_classes(), 3);
        assert_eq!(batches.total_samples(), 5);

        let mut sizes = Vec::new();
        let mut labels = Vec::new();
        while let Some(batch) = batches.next_batch() {
            assert_eq!(batch.features.len(), batch.rows() * 6);
            sizes.push(batch.rows());
            labels.extend(batch.labels);
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(labels, vec![0, 0, 0, 2, 2]);

        batches.reset();
        let first = batches.next_batch().unwrap();
        assert_eq!(first.row(0), &[0.0f32, 0.0, 1.0, 1.0, 2.0, 2.0]);
    }
}
