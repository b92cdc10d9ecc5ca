//! # Tokenizer
//!
//! Splits sanitized text into tokens for vocabulary building and windowing.

/// A token extracted from sanitized text with positional information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text content
    pub text: String,
    /// Start byte position in the cleaned string
    pub start: usize,
    /// End byte position in the cleaned string
    pub end: usize,
    /// Token index in the sequence
    pub index: usize,
}

/// Whitespace tokenizer.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer;

impl Tokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Self {
        Self
    }

    /// Tokenize cleaned text into a sequence of tokens.
    ///
    /// # Examples
    /// ```
    /// use windvec_core::text::Tokenizer;
    ///
    /// let tokens = Tokenizer::new().tokenize("good morning  world");
    /// assert_eq!(tokens.len(), 3);
    /// assert_eq!(tokens[2].start, 14);
    /// ```
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut current_start = 0;

        for (idx, c) in input.char_indices() {
            if c.is_whitespace() {
                if idx > current_start {
                    tokens.push(Token {
                        text: input[current_start..idx].to_string(),
                        start: current_start,
                        end: idx,
                        index: tokens.len(),
                    });
                }
                current_start = idx + c.len_utf8();
            }
        }

        if current_start < input.len() {
            tokens.push(Token {
                text: input[current_start..].to_string(),
                start: current_start,
                end: input.len(),
                index: tokens.len(),
            });
        }

        tokens
    }

    /// Tokenize and keep only the token texts.
    pub fn words(&self, input: &str) -> Vec<String> {
        self.tokenize(input).into_iter().map(|t| t.text).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let tokens = Tokenizer::new().tokenize("the cat sat");

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "the");
        assert_eq!(tokens[1].start, 4);
        assert_eq!(tokens[1].end, 7);
        assert_eq!(tokens[2].index, 2);
    }

    #[test]
    fn test_tokenize_mixed_whitespace() {
        let words = Tokenizer::new().words("\tone\n two   three ");
        assert_eq!(words, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_tokenize_multibyte() {
        let tokens = Tokenizer::new().tokenize("café noir");
        assert_eq!(tokens[0].text, "café");
        assert_eq!(tokens[1].start, "café ".len());
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(Tokenizer::new().tokenize("").is_empty());
        assert!(Tokenizer::new().tokenize("   \n\t").is_empty());
    }
}
