//! Unified cross-domain search
//!
//! Vectorizes the query per targeted namespace, blends semantic and
//! lexical scores, merges, and optionally re-ranks for a user.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::lexical::{overlap_ratio, token_set};
use super::router::{QueryRouter, RoutingDecision};
use crate::embedding::EmbeddingGenerator;
use crate::error::{GraphRagError, Result};
use crate::index::VectorIndex;
use crate::record::{SearchDomain, SearchResult, UserSearchContext};

/// Search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum results when the caller does not say (default: 10)
    pub default_limit: usize,
    /// Minimum cosine similarity for a candidate (default: 0.15)
    pub similarity_threshold: f32,
    /// Weight for cosine similarity (default: 0.7)
    pub semantic_weight: f32,
    /// Weight for query/content token overlap (default: 0.3)
    pub lexical_weight: f32,
    /// Candidates fetched per namespace, as a multiple of the limit
    pub candidate_factor: usize,
    /// Candidate multiple used before personalized re-ranking
    pub personalization_factor: usize,
    pub preferred_type_boost: f32,
    /// Largest extra factor from recent-query overlap (0.2 means up to 1.2x)
    pub recent_query_boost: f32,
    pub recent_query_min_overlap: f32,
    pub preference_boost: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            similarity_threshold: 0.15,
            semantic_weight: 0.7,
            lexical_weight: 0.3,
            candidate_factor: 3,
            personalization_factor: 2,
            preferred_type_boost: 1.25,
            recent_query_boost: 0.2,
            recent_query_min_overlap: 0.3,
            preference_boost: 1.1,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(GraphRagError::configuration(
                "similarity_threshold must be within [0, 1]",
            ));
        }
        if self.semantic_weight < 0.0
            || self.lexical_weight < 0.0
            || self.semantic_weight + self.lexical_weight <= 0.0
        {
            return Err(GraphRagError::configuration(
                "search weights must be non-negative with a positive sum",
            ));
        }
        if self.candidate_factor == 0 || self.personalization_factor == 0 {
            return Err(GraphRagError::configuration("candidate factors must be positive"));
        }
        Ok(())
    }
}

/// Query entry point over both namespaces
pub struct UnifiedSearch {
    generator: Arc<EmbeddingGenerator>,
    index: Arc<VectorIndex>,
    router: QueryRouter,
    config: SearchConfig,
    contexts: DashMap<String, UserSearchContext>,
}

impl UnifiedSearch {
    pub fn new(generator: Arc<EmbeddingGenerator>, index: Arc<VectorIndex>, config: SearchConfig) -> Self {
        Self {
            generator,
            index,
            router: QueryRouter::new(),
            config,
            contexts: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn classify(&self, query: &str) -> RoutingDecision {
        self.router.classify(query)
    }

    /// Search the given domains and merge by blended relevance
    pub async fn search(
        &self,
        query: &str,
        domains: &[SearchDomain],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 || domains.is_empty() {
            return Ok(Vec::new());
        }

        let query_tokens = token_set(query);
        let candidate_limit = limit.saturating_mul(self.config.candidate_factor);
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for domain in domains.iter().filter(|d| seen.insert(**d)) {
            let namespace = domain.embedding_domain();
            let vector = self.generator.generate_embedding(query, namespace).await?;
            let hits = self.index.find_similar(
                namespace,
                &vector,
                candidate_limit,
                self.config.similarity_threshold,
            )?;

            results.extend(hits.into_iter().map(|hit| {
                let lexical = overlap_ratio(&query_tokens, &token_set(hit.record.content()));
                let score = self.blend(hit.similarity, lexical);
                SearchResult::from_record(&hit.record, score)
            }));
        }

        sort_by_relevance(&mut results);
        results.truncate(limit);

        log::debug!(
            "Search over {} domain(s) returned {} results",
            seen.len(),
            results.len()
        );
        Ok(results)
    }

    /// Search one domain when hinted, otherwise let the router decide
    pub async fn search_with_hint(
        &self,
        query: &str,
        hint: Option<SearchDomain>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        match hint {
            Some(domain) => self.search(query, &[domain], limit).await,
            None => {
                let decision = self.classify(query);
                self.search(query, &decision.domains, limit).await
            }
        }
    }

    /// Route, over-fetch, then re-rank for the user
    pub async fn search_personalized(
        &self,
        query: &str,
        context: &UserSearchContext,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let decision = self.classify(query);
        let candidate_limit = limit.saturating_mul(self.config.personalization_factor);
        let candidates = self.search(query, &decision.domains, candidate_limit).await?;

        let mut results = personalize(candidates, context, &self.config);
        results.truncate(limit);
        Ok(results)
    }

    /// Personalized search with the cached context for `user_id`, or a
    /// routed search when none has been recorded.
    pub async fn search_for_user(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        match self.user_context(user_id) {
            Some(context) => self.search_personalized(query, &context, limit).await,
            None => self.search_with_hint(query, None, limit).await,
        }
    }

    /// Cache a user's context; the latest write wins
    pub fn record_user_context(&self, context: UserSearchContext) {
        self.contexts.insert(context.user_id.clone(), context);
    }

    pub fn user_context(&self, user_id: &str) -> Option<UserSearchContext> {
        self.contexts.get(user_id).map(|c| c.clone())
    }

    pub fn cached_contexts(&self) -> usize {
        self.contexts.len()
    }

    fn blend(&self, similarity: f32, lexical: f32) -> f32 {
        let score = self.config.semantic_weight * similarity + self.config.lexical_weight * lexical;
        sanitize_score(score)
    }
}

/// Map non-finite scores to 0 and clamp into [0, 1]
pub fn sanitize_score(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn sort_by_relevance(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Apply the user's boosts and re-sort. Scores stay within [0, 1].
pub fn personalize(
    mut results: Vec<SearchResult>,
    context: &UserSearchContext,
    config: &SearchConfig,
) -> Vec<SearchResult> {
    let preferred_types: HashSet<String> = context
        .document_types
        .iter()
        .map(|t| t.to_lowercase())
        .collect();
    let recent_queries: Vec<HashSet<String>> = context
        .recent_queries
        .iter()
        .map(|q| token_set(q))
        .filter(|tokens| !tokens.is_empty())
        .collect();
    let keywords: Vec<String> = context
        .preferences
        .values()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();

    for result in &mut results {
        let mut factor = 1.0f32;

        if preferred_types.contains(&result.metadata.source_type.to_lowercase()) {
            factor *= config.preferred_type_boost;
        }

        let content_tokens = token_set(&result.content);
        let best_overlap = recent_queries
            .iter()
            .map(|q| overlap_ratio(q, &content_tokens))
            .fold(0.0f32, f32::max);
        if best_overlap > config.recent_query_min_overlap {
            factor *= 1.0 + config.recent_query_boost * best_overlap;
        }

        let content = result.content.to_lowercase();
        for keyword in &keywords {
            if content.contains(keyword.as_str()) {
                factor *= config.preference_boost;
            }
        }

        result.relevance_score = sanitize_score(result.relevance_score * factor);
    }

    sort_by_relevance(&mut results);
    results
}
