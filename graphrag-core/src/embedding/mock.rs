//! Deterministic mock embeddings
//!
//! Signed feature hashing over token ids: texts that share words land
//! on shared dimensions, so cosine similarity tracks word overlap.
//! Same input always yields the same vector.

use fxhash::hash64;

use super::preprocess::PreparedText;
use crate::record::{EmbeddingDomain, EMBEDDING_DIMENSION};

/// Hashed slots written per token
const SLOTS_PER_TOKEN: usize = 4;

/// Boost applied to the domain's dimension subset
const DOMAIN_BIAS: f32 = 0.05;

/// Width of each domain's biased dimension subset
const BIAS_WIDTH: usize = 32;

/// Raw (unbiased, unit-length) mock vector for prepared text
pub fn mock_embedding(prepared: &PreparedText) -> Vec<f32> {
    let mut vector = vec![0f32; EMBEDDING_DIMENSION];

    for token in &prepared.tokens {
        let h = hash64(token);
        for slot in 0..SLOTS_PER_TOKEN {
            let bits = h >> (slot * 16);
            let idx = (bits & 0x0fff) as usize % EMBEDDING_DIMENSION;
            let sign = if bits & 0x8000 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
    }

    // Empty input, or slots that cancelled out entirely. The low bit keeps
    // the seed non-zero, since the empty string hashes to 0.
    if vector.iter().all(|v| *v == 0.0) {
        let h = hash64(prepared.text.as_bytes()) | 1;
        for (idx, value) in vector.iter_mut().enumerate() {
            *value = ((h >> (idx % 32)) as f32 * 0.0001).sin();
        }
    }

    l2_normalize_in_place(&mut vector);
    vector
}

/// Dimensions boosted for a domain
pub fn bias_range(domain: EmbeddingDomain) -> std::ops::Range<usize> {
    match domain {
        EmbeddingDomain::Regulations => 0..BIAS_WIDTH,
        EmbeddingDomain::UserRecords => BIAS_WIDTH..2 * BIAS_WIDTH,
    }
}

/// Add the domain boost, then re-normalize
pub fn apply_domain_bias(vector: &mut [f32], domain: EmbeddingDomain) {
    let range = bias_range(domain);
    let end = range.end.min(vector.len());
    for value in &mut vector[range.start.min(end)..end] {
        *value += DOMAIN_BIAS;
    }
    l2_normalize_in_place(vector);
}

/// Scale to unit length; zero vectors are left untouched
pub fn l2_normalize_in_place(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
