//! Token estimation by character ratio.
//!
//! No tokenizer is loaded: the estimate is `ceil(chars × tokens_per_char)`
//! for the selected model family. Characters are Unicode scalar values,
//! so multibyte text is not over-counted.

use serde::{Deserialize, Serialize};

/// Model family whose chars-to-tokens ratio drives the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// GPT-family default: 0.75 tokens per character.
    #[default]
    Gpt,
    /// Claude-family: 0.70 tokens per character.
    Claude,
    /// Explicit ratio.
    Custom(f64),
}

impl ModelFamily {
    pub fn tokens_per_char(&self) -> f64 {
        match self {
            ModelFamily::Gpt => 0.75,
            ModelFamily::Claude => 0.70,
            ModelFamily::Custom(ratio) => *ratio,
        }
    }

    /// Parse a config string (`"gpt"`, `"claude"`). Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gpt" | "openai" => Some(ModelFamily::Gpt),
            "claude" | "anthropic" => Some(ModelFamily::Claude),
            _ => None,
        }
    }
}

/// Maps text to an estimated token count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    tokens_per_char: f64,
}

impl TokenEstimator {
    pub fn new(family: ModelFamily) -> Self {
        Self {
            tokens_per_char: family.tokens_per_char(),
        }
    }

    pub fn with_ratio(tokens_per_char: f64) -> Self {
        Self::new(ModelFamily::Custom(tokens_per_char))
    }

    pub fn tokens_per_char(&self) -> f64 {
        self.tokens_per_char
    }

    /// Estimated token count. Empty text is 0; any non-empty text is at least 1.
    pub fn estimate(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        ((chars as f64) * self.tokens_per_char).ceil().max(1.0) as usize
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(ModelFamily::default())
    }
}

/// Number of whitespace-delimited words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(TokenEstimator::default().estimate(""), 0);
    }

    #[test]
    fn test_gpt_ratio() {
        let est = TokenEstimator::new(ModelFamily::Gpt);
        assert_eq!(est.estimate("abcd"), 3);
        assert_eq!(est.estimate("Hello world."), 9);
    }

    #[test]
    fn test_claude_ratio_rounds_up() {
        let est = TokenEstimator::new(ModelFamily::Claude);
        // 10 chars × 0.70 = 7.0
        assert_eq!(est.estimate("0123456789"), 7);
        // 1 char × 0.70 = 0.7 → 1
        assert_eq!(est.estimate("a"), 1);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let est = TokenEstimator::with_ratio(1.0);
        assert_eq!(est.estimate("┌──┐"), 4);
    }

    #[test]
    fn test_family_from_name() {
        assert_eq!(ModelFamily::from_name("GPT"), Some(ModelFamily::Gpt));
        assert_eq!(ModelFamily::from_name("claude"), Some(ModelFamily::Claude));
        assert_eq!(ModelFamily::from_name("llama"), None);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree  "), 3);
        assert_eq!(word_count(""), 0);
    }
}
