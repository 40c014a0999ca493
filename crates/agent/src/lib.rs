//! The label-propagating pipeline.
//!
//! One `run` walks scrape → assess → store → retrieve → generate, joining
//! labels at every mixing point and gating every egress. Nothing is ever
//! silently downgraded: the only silent filter is the retrieval label cap,
//! which is the access-control mechanism itself.

use thiserror::Error;
use tracing::{debug, info};

use flowgent_labels::{Label, LabelError, Lattice};
use flowgent_llm::{LlmClient, LlmError};
use flowgent_policy::Policy;
use flowgent_retrieval::{RetrievedDocument, Retriever};
use flowgent_scrape::{FetchError, Fetcher};
use flowgent_store::{JsonStorage, StorageError};
use flowgent_trust::{TrustAssessment, TrustParser};

/// How many ranked documents feed the summary prompt.
const TOP_K: usize = 3;

/// Per-source character budget inside the summary prompt.
const SNIPPET_LIMIT: usize = 2000;

const NO_RESULTS_MESSAGE: &str =
    "No relevant or authorized documents were found for this query.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// An egress gate denied the flow. The reason is user-facing and names
    /// the offending label.
    #[error("{0}")]
    PolicyViolation(String),
}

/// What a run hands back: the response text and the label it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResult {
    pub text: String,
    pub label: Label,
}

/// Orchestrates the pipeline. All configuration (lattice, policy, parser)
/// is fixed at construction; `run` itself is deterministic given its inputs
/// and the collaborators' responses.
pub struct WebAgent {
    lattice: Lattice,
    policy: Policy,
    parser: TrustParser,
    fetcher: Fetcher,
    storage: JsonStorage,
    retriever: Retriever,
    llm: LlmClient,
}

impl WebAgent {
    pub fn new(
        lattice: Lattice,
        policy: Policy,
        parser: TrustParser,
        fetcher: Fetcher,
        storage: JsonStorage,
        llm: LlmClient,
    ) -> Self {
        let retriever = Retriever::new(lattice.clone());
        Self {
            lattice,
            policy,
            parser,
            fetcher,
            storage,
            retriever,
            llm,
        }
    }

    /// Fetches `urls`, stores them with labels derived from the trust
    /// parser joined with `scrape_label`, retrieves against `user_prompt`
    /// under the user's clearance, and generates a gated answer.
    ///
    /// `scrape_label` defaults to `user_label`: everything scraped on the
    /// user's behalf is at least as sensitive as the user's own context.
    pub async fn run(
        &self,
        user_prompt: &str,
        user_label: &Label,
        urls: &[String],
        scrape_label: Option<Label>,
    ) -> Result<AgentResult, AgentError> {
        let scrape_label = scrape_label.unwrap_or_else(|| user_label.clone());
        if !self.lattice.is_valid_level(&scrape_label.level) {
            return Err(LabelError::UnknownLevel(scrape_label.level.clone()).into());
        }

        for url in urls {
            let content = self.fetcher.fetch(url).await?;
            let assessed = self
                .parser
                .assess(&content.url, &content.clean_text, &content.raw_html);

            // The stored label is the join of what the parser derived and
            // what the caller demanded as a floor.
            let level = self
                .lattice
                .join_level(&assessed.label.level, &scrape_label.level)?
                .to_string();
            let mut categories = assessed.label.categories.clone();
            categories.extend(scrape_label.categories.iter().cloned());
            let label = Label { level, categories };

            debug!(url, score = assessed.score, label = %label, "scraped and assessed");
            let assessment = TrustAssessment {
                score: assessed.score,
                label,
                signals: assessed.signals,
            };
            self.storage.store(&content, &assessment).await?;
        }

        let documents = self.storage.load_documents().await?;
        let assessments = self.storage.load_trust_assessments().await?;
        let retrieved = self.retriever.retrieve(
            user_prompt,
            &documents,
            &assessments,
            Some(user_label),
            TOP_K,
        );

        if retrieved.is_empty() {
            info!("no relevant or authorized documents; skipping generation");
            return Ok(AgentResult {
                text: NO_RESULTS_MESSAGE.to_string(),
                label: user_label.clone(),
            });
        }

        let mut labels: Vec<&Label> = vec![user_label];
        labels.extend(retrieved.iter().map(|doc| &doc.label));
        let combined_label = self.lattice.join_labels(labels)?;
        info!(sources = retrieved.len(), label = %combined_label, "retrieved context");

        let prompt = build_summary_prompt(user_prompt, &retrieved);

        if self.llm.is_external() {
            let decision = self.policy.can_send_to_external_llm(&combined_label);
            if !decision.allowed {
                return Err(AgentError::PolicyViolation(decision.reason));
            }
        }

        let response = self.llm.generate(&prompt, &combined_label).await?;

        let decision = self.policy.can_send_to_user(&response.label);
        if !decision.allowed {
            return Err(AgentError::PolicyViolation(decision.reason));
        }

        info!(label = %response.label, "response cleared for user egress");
        Ok(AgentResult {
            text: response.text,
            label: response.label,
        })
    }
}

/// Fixed header, the user request, numbered source snippets, fixed footer.
fn build_summary_prompt(user_prompt: &str, sources: &[RetrievedDocument]) -> String {
    let snippets = sources
        .iter()
        .enumerate()
        .map(|(idx, doc)| {
            let snippet: String = doc.text_snippet.chars().take(SNIPPET_LIMIT).collect();
            format!("[Source {}] ({})\n{}", idx + 1, doc.url, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are a cautious web agent. Use only the provided sources.\n\n\
         User request:\n{user_prompt}\n\n\
         Sources:\n{snippets}\n\n\
         Provide a concise answer and cite sources by number."
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
