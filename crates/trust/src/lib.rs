//! Heuristic trustworthiness assessment for scraped pages.
//!
//! Scoring model (weights sum to 1.0):
//! ```text
//! score = domain(0.30) + https(0.15) + provenance(0.20) + references(0.20) + substance(0.15)
//! ```
//! The score maps onto a default label: well-sourced pages come out `Public`,
//! middling ones `Internal`, and everything below that is quarantined as
//! `Confidential+Untrusted`. Level names are produced as-is; the orchestrator
//! validates them against the configured lattice when it joins labels.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use flowgent_labels::Label;

/// Tokens that mark navigation/consent boilerplate rather than content.
const BOILERPLATE_TOKENS: [&str; 6] = [
    "cookie",
    "privacy",
    "terms",
    "subscribe",
    "advertisement",
    "login",
];

/// Punctuation stripped from token edges before the boilerplate test.
const EDGE_PUNCTUATION: [char; 12] =
    ['.', ',', ':', ';', '!', '?', '(', ')', '[', ']', '{', '}'];

/// The parser's verdict on one page: a score in `[0, 1]`, the label it maps
/// to, and the raw signals for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustAssessment {
    pub score: f64,
    pub label: Label,
    pub signals: BTreeMap<String, Value>,
}

/// Derives a [`TrustAssessment`] from a page's URL, extracted text, and raw
/// HTML. Configured once with the trusted/blocked domain lists; immutable
/// afterwards and freely shareable.
#[derive(Debug, Clone, Default)]
pub struct TrustParser {
    trusted_domains: HashSet<String>,
    blocked_domains: HashSet<String>,
}

impl TrustParser {
    pub fn new<I, J, S, T>(trusted_domains: I, blocked_domains: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            trusted_domains: trusted_domains
                .into_iter()
                .map(|d| d.as_ref().to_ascii_lowercase())
                .collect(),
            blocked_domains: blocked_domains
                .into_iter()
                .map(|d| d.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn assess(&self, url: &str, clean_text: &str, raw_html: &str) -> TrustAssessment {
        let parsed = Url::parse(url).ok();
        let host = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let https = parsed.as_ref().is_some_and(|u| u.scheme() == "https");

        let html_lower = raw_html.to_lowercase();
        let text_lower = clean_text.to_lowercase();

        let author_present = html_lower.contains("author") || text_lower.contains("by ");
        let date_present = ["datetime", "published", "date"]
            .iter()
            .any(|token| html_lower.contains(token));
        let org_present = ["inc", "corp", "university", "government"]
            .iter()
            .any(|token| text_lower.contains(token));
        let refs = text_lower.matches("http").count() + text_lower.matches("www.").count();
        let boilerplate_ratio = boilerplate_ratio(clean_text);

        // Trusted wins over blocked when a host appears in both lists.
        let domain_signal = if self.trusted_domains.contains(&host) {
            1.0
        } else if self.blocked_domains.contains(&host) {
            0.0
        } else {
            0.5
        };

        let provenance = author_present || date_present || org_present;
        let score = 0.30 * domain_signal
            + 0.15 * if https { 1.0 } else { 0.0 }
            + 0.20 * if provenance { 1.0 } else { 0.0 }
            + 0.20 * (refs.min(5) as f64) / 5.0
            + 0.15 * (1.0 - boilerplate_ratio);
        let score = score.clamp(0.0, 1.0);

        let label = map_score_to_label(score);
        debug!(%host, score, label = %label, "assessed page trust");

        let signals = BTreeMap::from([
            ("domain".to_string(), json!(host)),
            ("domain_signal".to_string(), json!(domain_signal)),
            ("https".to_string(), json!(https)),
            ("author_present".to_string(), json!(author_present)),
            ("date_present".to_string(), json!(date_present)),
            ("org_present".to_string(), json!(org_present)),
            ("reference_count".to_string(), json!(refs)),
            (
                "boilerplate_ratio".to_string(),
                json!(round4(boilerplate_ratio)),
            ),
        ]);

        TrustAssessment {
            score,
            label,
            signals,
        }
    }
}

/// Default score → label thresholds.
pub fn map_score_to_label(score: f64) -> Label {
    if score >= 0.8 {
        Label::bare("Public")
    } else if score >= 0.5 {
        Label::bare("Internal")
    } else {
        Label::new("Confidential", ["Untrusted"])
    }
}

/// Share of whitespace tokens that are consent/navigation boilerplate.
/// Empty or whitespace-only text counts as all boilerplate.
fn boilerplate_ratio(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 1.0;
    }
    let matches = words
        .iter()
        .filter(|word| {
            let stripped = word
                .trim_matches(|c| EDGE_PUNCTUATION.contains(&c))
                .to_lowercase();
            BOILERPLATE_TOKENS.contains(&stripped.as_str())
        })
        .count();
    (matches as f64 / words.len() as f64).clamp(0.0, 1.0)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
