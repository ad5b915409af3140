//! Lexical helpers shared by routing, blending and personalization

use std::collections::HashSet;

/// Lowercase alphanumeric runs of at least two characters
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 2)
        .map(String::from)
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Fraction of distinct query tokens present in the content tokens.
/// 0 for a query without tokens.
pub fn overlap_ratio(query_tokens: &HashSet<String>, content_tokens: &HashSet<String>) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let shared = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    shared as f32 / query_tokens.len() as f32
}

/// Whether `phrase` occurs as consecutive tokens in `tokens`
pub fn contains_phrase(tokens: &[String], phrase: &[&str]) -> bool {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(phrase.len())
        .any(|window| window.iter().zip(phrase).all(|(t, p)| t == p))
}
