//! Unified search
//!
//! Keyword routing, blended semantic/lexical scoring across both
//! namespaces, and per-user re-ranking.

mod lexical;
mod router;
mod unified;

pub use lexical::{overlap_ratio, token_set, tokenize};
pub use router::{QueryRouter, RoutingDecision};
pub use unified::{personalize, sanitize_score, SearchConfig, UnifiedSearch};
