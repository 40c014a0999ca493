//! Token-overlap retrieval under a label cap.
//!
//! Documents whose stored label cannot flow to the caller's cap are filtered
//! out silently; that is the access-control mechanism, not an error. The
//! survivors are ranked by query-token overlap.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use flowgent_labels::{Label, Lattice};
use flowgent_store::{Document, StoredTrustAssessment};

const TOKEN_PATTERN: &str = "[a-z0-9]+";

/// A ranked retrieval hit. `score` is the stored trust score, not the rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub url: String,
    pub text_snippet: String,
    pub label: Label,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct Retriever {
    lattice: Lattice,
    token_re: Regex,
}

impl Retriever {
    pub fn new(lattice: Lattice) -> Self {
        Self {
            lattice,
            token_re: Regex::new(TOKEN_PATTERN).unwrap(),
        }
    }

    /// Ranks `documents` against `query`, dropping documents without a
    /// paired assessment, documents whose label exceeds `label_cap`, and
    /// documents with zero overlap. Returns at most `top_k` hits, best
    /// first; ties keep input order.
    pub fn retrieve(
        &self,
        query: &str,
        documents: &[Document],
        assessments: &[StoredTrustAssessment],
        label_cap: Option<&Label>,
        top_k: usize,
    ) -> Vec<RetrievedDocument> {
        let assessment_by_doc: HashMap<&str, &StoredTrustAssessment> = assessments
            .iter()
            .map(|item| (item.document_id.as_str(), item))
            .collect();
        let query_tokens = self.tokenize(query);

        let mut scored: Vec<(f64, RetrievedDocument)> = Vec::new();
        for doc in documents {
            let Some(assessment) = assessment_by_doc.get(doc.id.as_str()) else {
                continue;
            };
            if let Some(cap) = label_cap {
                if !self.lattice.can_flow(&assessment.label, cap) {
                    continue;
                }
            }
            let rank_score = self.rank(&query_tokens, &doc.clean_text);
            if rank_score <= 0.0 {
                continue;
            }
            scored.push((
                rank_score,
                RetrievedDocument {
                    id: doc.id.clone(),
                    url: doc.url.clone(),
                    text_snippet: doc.clean_text.chars().take(500).collect(),
                    label: assessment.label.clone(),
                    score: assessment.score,
                },
            ));
        }

        // Stable sort: equal ranks keep insertion order.
        scored.sort_by(|(left, _), (right, _)| right.total_cmp(left));
        debug!(
            candidates = documents.len(),
            survivors = scored.len(),
            top_k,
            "retrieval pass complete"
        );
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, doc)| doc)
            .collect()
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token_re
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Overlap of the query token *list* with the document token set,
    /// divided by the unique query-token count. A query that repeats a
    /// matching token can therefore rank above 1.0.
    fn rank(&self, query_tokens: &[String], text: &str) -> f64 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let doc_tokens: HashSet<String> = self.tokenize(text).into_iter().collect();
        if doc_tokens.is_empty() {
            return 0.0;
        }
        let overlap = query_tokens
            .iter()
            .filter(|token| doc_tokens.contains(token.as_str()))
            .count();
        let unique: HashSet<&str> = query_tokens.iter().map(String::as_str).collect();
        overlap as f64 / unique.len().max(1) as f64
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
