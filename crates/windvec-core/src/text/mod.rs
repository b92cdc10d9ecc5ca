pub mod sanitizer;
pub mod tokenizer;

pub use sanitizer::{Sanitizer, SanitizerConfig};
pub use tokenizer::{Token, Tokenizer};
