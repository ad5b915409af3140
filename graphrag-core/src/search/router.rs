//! Keyword query router
//!
//! Decides which namespaces a query should hit. It does not rank.

use serde::{Deserialize, Serialize};

use super::lexical::{contains_phrase, tokenize};
use crate::record::SearchDomain;

const REGULATION_TERMS: &[&str] = &[
    "far",
    "dfars",
    "cfr",
    "regulation",
    "regulations",
    "regulatory",
    "compliance",
    "compliant",
    "clause",
    "clauses",
    "requirement",
    "requirements",
    "statute",
    "statutory",
    "subpart",
    "provision",
    "provisions",
    "mandatory",
    "threshold",
    "policy",
    "law",
    "legal",
    "federal",
    "authority",
    "simplified acquisition",
    "full and open competition",
];

const WORKFLOW_TERMS: &[&str] = &[
    "workflow",
    "workflows",
    "template",
    "templates",
    "approval",
    "approvals",
    "approve",
    "approved",
    "my",
    "previous",
    "previously",
    "history",
    "draft",
    "drafts",
    "recent",
    "routing",
    "status",
    "task",
    "tasks",
    "checklist",
    "submitted",
    "last time",
];

/// Queries that read equally well against either namespace
const AMBIGUOUS_PHRASES: &[&str] = &[
    "contract",
    "contracts",
    "sole source",
    "small business",
    "market research",
    "statement of work",
    "source selection",
    "justification",
];

/// Which namespaces to query, and how sure the router is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub domains: Vec<SearchDomain>,
    pub confidence: f32,
    pub regulation_score: usize,
    pub workflow_score: usize,
}

impl RoutingDecision {
    pub fn includes(&self, domain: SearchDomain) -> bool {
        self.domains.contains(&domain)
    }
}

/// Lexical classifier over fixed keyword lists
#[derive(Debug, Clone)]
pub struct QueryRouter {
    regulation_terms: Vec<Vec<&'static str>>,
    workflow_terms: Vec<Vec<&'static str>>,
    ambiguous_phrases: Vec<Vec<&'static str>>,
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRouter {
    pub fn new() -> Self {
        let split = |terms: &[&'static str]| -> Vec<Vec<&'static str>> {
            terms.iter().map(|t| t.split(' ').collect()).collect()
        };
        Self {
            regulation_terms: split(REGULATION_TERMS),
            workflow_terms: split(WORKFLOW_TERMS),
            ambiguous_phrases: split(AMBIGUOUS_PHRASES),
        }
    }

    pub fn classify(&self, query: &str) -> RoutingDecision {
        let tokens = tokenize(query);
        let count = |terms: &[Vec<&str>]| terms.iter().filter(|t| contains_phrase(&tokens, t)).count();

        let regulation_score = count(&self.regulation_terms);
        let workflow_score = count(&self.workflow_terms);
        let ambiguous = count(&self.ambiguous_phrases) > 0;

        let both = (regulation_score >= 1 && workflow_score >= 1)
            || ambiguous
            || regulation_score == workflow_score;

        let (domains, confidence) = if both {
            let confidence = if regulation_score + workflow_score == 0 {
                0.5
            } else {
                0.6
            };
            (SearchDomain::ALL.to_vec(), confidence)
        } else {
            let (domain, winner) = if regulation_score > workflow_score {
                (SearchDomain::Regulations, regulation_score)
            } else {
                (SearchDomain::UserHistory, workflow_score)
            };
            let mut confidence = winner as f32 / (winner as f32 + 1.0);
            if regulation_score >= 2 || workflow_score >= 2 {
                confidence *= 1.2;
            }
            (vec![domain], confidence.min(1.0))
        };

        RoutingDecision {
            domains,
            confidence,
            regulation_score,
            workflow_score,
        }
    }
}
