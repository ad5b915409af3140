//! Text preprocessing ahead of embedding
//!
//! Trims, applies the token budget and maps words to stable token ids.

use fxhash::hash64;

use crate::record::MAX_TOKEN_LENGTH;

/// Characters per token used to estimate the character budget
const CHARS_PER_TOKEN: usize = 4;

/// Size of the placeholder vocabulary token ids are folded into
const VOCABULARY_SIZE: u64 = 50_000;

/// Text ready for a generation strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedText {
    /// Trimmed text within the token budget
    pub text: String,
    /// Deterministic token ids, at most `MAX_TOKEN_LENGTH`
    pub tokens: Vec<u32>,
    /// Whether the budget cut anything off
    pub truncated: bool,
}

impl PreparedText {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Trim, truncate to the token budget and tokenize
pub fn prepare(text: &str) -> PreparedText {
    let trimmed = text.trim();
    let char_budget = MAX_TOKEN_LENGTH * CHARS_PER_TOKEN;

    let mut truncated = false;
    let mut text = match trimmed.char_indices().nth(char_budget) {
        Some((cut, _)) => {
            truncated = true;
            trimmed[..cut].to_string()
        }
        None => trimmed.to_string(),
    };

    let words: Vec<&str> = text.split_whitespace().collect();
    let tokens = words
        .iter()
        .take(MAX_TOKEN_LENGTH)
        .filter_map(|word| token_id(word))
        .collect();

    let kept = (words.len() > MAX_TOKEN_LENGTH).then(|| words[..MAX_TOKEN_LENGTH].join(" "));
    if let Some(kept) = kept {
        truncated = true;
        text = kept;
    }

    PreparedText {
        text,
        tokens,
        truncated,
    }
}

/// Stable id for one whitespace-delimited word; `None` for pure punctuation
pub fn token_id(word: &str) -> Option<u32> {
    let normalized = word
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    Some((hash64(normalized.as_str()) % VOCABULARY_SIZE) as u32 + 1)
}
