//! # Labeled Corpus
//!
//! Reads `(label, text)` records from a delimited source, sanitizes and
//! tokenizes the text, and resolves labels against a closed [`LabelSet`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, WindvecError};
use crate::text::{Sanitizer, SanitizerConfig, Tokenizer};

/// Ordered closed set of class identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::new(["0", "1", "2"])
    }
}

impl LabelSet {
    /// Build a label set; duplicates keep their first position.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for label in labels {
            let label = label.into();
            if !out.contains(&label) {
                out.push(label);
            }
        }
        Self { labels: out }
    }

    /// Class index of a label.
    pub fn index_of(&self, label: &str) -> Result<usize> {
        self.labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| WindvecError::label_not_found(label))
    }

    /// Label name of a class index.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// An ordered token sequence with its sentence-level class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSentence {
    /// Class index into the corpus [`LabelSet`].
    pub label: usize,
    pub tokens: Vec<String>,
}

impl LabeledSentence {
    pub fn new(label: usize, tokens: Vec<String>) -> Self {
        Self { label, tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Counters collected while reading a corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub lines: usize,
    pub sentences: usize,
    pub tokens: usize,
    pub malformed_lines: usize,
    pub unknown_labels: usize,
    pub empty_sentences: usize,
}

/// A parsed labeled corpus.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub labels: LabelSet,
    pub sentences: Vec<LabeledSentence>,
    pub stats: CorpusStats,
}

impl Corpus {
    /// Build a corpus from already tokenized sentences.
    ///
    /// # Errors
    ///
    /// `EmptyInput` if there are no sentences, `InvalidConfig` if a sentence
    /// label is outside the label set.
    pub fn from_sentences(labels: LabelSet, sentences: Vec<LabeledSentence>) -> Result<Self> {
        if sentences.is_empty() {
            return Err(WindvecError::EmptyInput("corpus has no sentences".into()));
        }
        if let Some(bad) = sentences.iter().find(|s| s.label >= labels.len()) {
            return Err(WindvecError::InvalidConfig(format!(
                "sentence label {} outside label set of {}",
                bad.label,
                labels.len()
            )));
        }

        let stats = CorpusStats {
            lines: sentences.len(),
            sentences: sentences.len(),
            tokens: sentences.iter().map(LabeledSentence::len).sum(),
            ..CorpusStats::default()
        };

        Ok(Self {
            labels,
            sentences,
            stats,
        })
    }

    /// Token sequences only, for vocabulary building and embedding training.
    pub fn token_sequences(&self) -> impl Iterator<Item = &[String]> {
        self.sentences.iter().map(|s| s.tokens.as_slice())
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

/// Configuration for [`CorpusReader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub delimiter: char,
    /// Zero-based column holding the label.
    pub label_column: usize,
    /// Zero-based column where the text starts; it runs to the end of the line.
    pub text_column: usize,
    pub labels: LabelSet,
    pub sanitizer: SanitizerConfig,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            label_column: 1,
            text_column: 3,
            labels: LabelSet::default(),
            sanitizer: SanitizerConfig::default(),
        }
    }
}

impl CorpusConfig {
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_columns(mut self, label_column: usize, text_column: usize) -> Self {
        self.label_column = label_column;
        self.text_column = text_column;
        self
    }

    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: SanitizerConfig) -> Self {
        self.sanitizer = sanitizer;
        self
    }
}

/// Reader for delimited `(label, text)` corpora.
#[derive(Debug, Clone)]
pub struct CorpusReader {
    config: CorpusConfig,
    sanitizer: Sanitizer,
    tokenizer: Tokenizer,
}

impl CorpusReader {
    /// # Errors
    ///
    /// `InvalidConfig` if the label set is empty, the label and text columns
    /// coincide, or the noise pattern does not compile.
    pub fn new(config: CorpusConfig) -> Result<Self> {
        if config.labels.is_empty() {
            return Err(WindvecError::InvalidConfig("label set is empty".into()));
        }
        if config.label_column == config.text_column {
            return Err(WindvecError::InvalidConfig(
                "label and text columns must differ".into(),
            ));
        }
        let sanitizer = Sanitizer::new(&config.sanitizer)?;

        Ok(Self {
            config,
            sanitizer,
            tokenizer: Tokenizer::new(),
        })
    }

    /// Sanitize and tokenize one piece of raw text.
    pub fn tokenize(&self, raw: &str) -> Vec<String> {
        self.tokenizer.words(&self.sanitizer.sanitize(raw))
    }

    /// Read a corpus from a file.
    pub fn read_path<P: AsRef<Path>>(&self, path: P) -> Result<Corpus> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!(path = %path.display(), "reading corpus");
        self.read(BufReader::new(file))
    }

    /// Read a corpus from any buffered source.
    ///
    /// # Errors
    ///
    /// `EmptyInput` if no line yields a labeled, non-empty sentence.
    pub fn read<R: BufRead>(&self, reader: R) -> Result<Corpus> {
        let mut stats = CorpusStats::default();
        let mut sentences = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            stats.lines += 1;

            let Some((label, text)) = self.split_record(&line) else {
                stats.malformed_lines += 1;
                warn!(line = stats.lines, "skipping record with too few columns");
                continue;
            };

            let label = match self.config.labels.index_of(label.trim()) {
                Ok(idx) => idx,
                Err(_) => {
                    stats.unknown_labels += 1;
                    warn!(line = stats.lines, label, "skipping record with unknown label");
                    continue;
                }
            };

            let tokens = self.tokenize(text);
            if tokens.is_empty() {
                stats.empty_sentences += 1;
                debug!(line = stats.lines, "record has no tokens after sanitizing");
                continue;
            }

            stats.tokens += tokens.len();
            sentences.push(LabeledSentence::new(label, tokens));
        }

        stats.sentences = sentences.len();
        if sentences.is_empty() {
            return Err(WindvecError::EmptyInput(format!(
                "no labeled sentences in {} line(s)",
                stats.lines
            )));
        }

        info!(
            sentences = stats.sentences,
            tokens = stats.tokens,
            skipped = stats.malformed_lines + stats.unknown_labels + stats.empty_sentences,
            "corpus loaded"
        );

        Ok(Corpus {
            labels: self.config.labels.clone(),
            sentences,
            stats,
        })
    }

    fn split_record<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let delimiter = self.config.delimiter;
        let label = line.split(delimiter).nth(self.config.label_column)?;

        // Byte offset of the text column; everything after it belongs to the text.
        let mut offset = 0;
        for (i, field) in line.split(delimiter).enumerate() {
            if i == self.config.text_column {
                return Some((label, &line[offset..]));
            }
            offset += field.len() + delimiter.len_utf8();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
1,2,Sentiment140,@jo I love this phone
2,0,Sentiment140,worst. day. ever
3,7,Sentiment140,unknown label here
4,1
5,1,Sentiment140,@only
6,1,Sentiment140,commas, inside, text
";

    fn reader() -> CorpusReader {
        CorpusReader::new(CorpusConfig::default()).unwrap()
    }

    #[test]
    fn test_label_set() {
        let labels = LabelSet::new(["neg", "pos", "neg"]);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.index_of("pos").unwrap(), 1);
        assert_eq!(labels.name(0), Some("neg"));
        assert!(matches!(
            labels.index_of("neutral"),
            Err(WindvecError::NotFound { kind: "label", .. })
        ));
    }

    #[test]
    fn test_read_csv() {
        let corpus = reader().read(CSV.as_bytes()).unwrap();

        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.sentences[0].label, 2);
        assert_eq!(corpus.sentences[0].tokens, vec!["i", "love", "this", "phone"]);
        assert_eq!(corpus.sentences[1].tokens, vec!["worst", "day", "ever"]);
        assert_eq!(corpus.sentences[2].tokens, vec!["commas", "inside", "text"]);

        assert_eq!(corpus.stats.lines, 6);
        assert_eq!(corpus.stats.unknown_labels, 1);
        assert_eq!(corpus.stats.malformed_lines, 1);
        assert_eq!(corpus.stats.empty_sentences, 1);
        assert_eq!(corpus.stats.tokens, 10);
    }

    #[test]
    fn test_custom_columns() {
        let config = CorpusConfig::default()
            .with_delimiter('\t')
            .with_columns(0, 1)
            .with_labels(LabelSet::new(["neg", "pos"]));
        let reader = CorpusReader::new(config).unwrap();
        let corpus = reader.read("pos\tgreat stuff\nneg\tmeh".as_bytes()).unwrap();

        assert_eq!(corpus.sentences[0].label, 1);
        assert_eq!(corpus.sentences[1].tokens, vec!["meh"]);
    }

    #[test]
    fn test_empty_corpus() {
        let result = reader().read("".as_bytes());
        assert!(matches!(result, Err(WindvecError::EmptyInput(_))));
    }

    #[test]
    fn test_invalid_reader_config() {
        let config = CorpusConfig::default().with_columns(2, 2);
        assert!(CorpusReader::new(config).is_err());

        let config = CorpusConfig::default().with_labels(LabelSet::new(Vec::<String>::new()));
        assert!(CorpusReader::new(config).is_err());
    }

    #[test]
    fn test_from_sentences_checks_labels() {
        let sentences = vec![LabeledSentence::new(5, vec!["a".into()])];
        let result = Corpus::from_sentences(LabelSet::default(), sentences);
        assert!(matches!(result, Err(WindvecError::InvalidConfig(_))));
    }
}
