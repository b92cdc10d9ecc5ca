//! # Input Sanitizer
//!
//! Homogenizes raw text (case, digits, punctuation) and strips noise such as
//! `@mentions` before tokenization.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Characters removed entirely during homogenization.
const STRIPPED: &[char] = &[
    '.', ',', '"', '\'', '(', ')', '\u{201c}', '\u{201d}', '\u{2026}', '|', '/', '\\', '[', ']',
    '\u{2018}', '\u{2019}',
];

/// Configuration for [`Sanitizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Regex whose matches are deleted from the text.
    pub noise_pattern: String,
    /// Lowercase, map digits to `d` and drop punctuation.
    pub homogenize: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            noise_pattern: r"@\S*".to_string(),
            homogenize: true,
        }
    }
}

impl SanitizerConfig {
    /// Set the noise pattern.
    pub fn with_noise_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.noise_pattern = pattern.into();
        self
    }

    /// Enable or disable homogenization.
    pub fn with_homogenize(mut self, enabled: bool) -> Self {
        self.homogenize = enabled;
        self
    }
}

/// Text sanitizer with a pre-compiled noise rule.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    noise: Regex,
    homogenize: bool,
}

impl Sanitizer {
    /// Compile a sanitizer.
    ///
    /// # Errors
    ///
    /// Returns `WindvecError::InvalidConfig` if the noise pattern does not compile.
    pub fn new(config: &SanitizerConfig) -> Result<Self> {
        Ok(Self {
            noise: Regex::new(&config.noise_pattern)?,
            homogenize: config.homogenize,
        })
    }

    /// Clean raw text. Never fails; empty input gives an empty string.
    pub fn sanitize(&self, raw: &str) -> String {
        let base = if self.homogenize {
            homogenize(raw)
        } else {
            raw.to_string()
        };
        self.noise.replace_all(&base, "").trim().to_string()
    }
}

/// Lowercase, replace ASCII digits with `d`, drop punctuation and collapse
/// runs of `!`.
fn homogenize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_bang = false;

    for c in raw.chars() {
        if STRIPPED.contains(&c) {
            continue;
        }
        if c == '!' {
            if !prev_bang {
                out.push('!');
            }
            prev_bang = true;
            continue;
        }
        prev_bang = false;

        if c.is_ascii_digit() {
            out.push('d');
        } else {
            out.extend(c.to_lowercase());
        }
    }

    out
}
