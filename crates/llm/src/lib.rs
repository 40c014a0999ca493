//! LLM clients behind one `generate` operation.
//!
//! Two backends as a tagged variant: a local Ollama instance and an
//! OpenAI-compatible external service. Both return the caller's input label
//! unchanged on the response, the conservative end of the labeling
//! contract, which the orchestrator then gates at user egress.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::info;

use flowgent_labels::Label;

/// HTTP timeout for a single generation call.
const LLM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("missing API key for the external LLM")]
    MissingApiKey,
    #[error("LLM request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("LLM at {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unexpected LLM response shape: {0}")]
    MalformedResponse(String),
}

/// Generated text plus the label it carries.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub label: Label,
}

/// The LLM backends, as a tagged variant behind one `generate` operation.
#[derive(Debug, Clone)]
pub enum LlmClient {
    Ollama(OllamaClient),
    OpenAiCompatible(OpenAiCompatibleClient),
}

impl LlmClient {
    /// Local Ollama backend (`{base_url}/api/generate`).
    pub fn ollama(model: &str, base_url: &str) -> Result<Self, LlmError> {
        Ok(Self::Ollama(OllamaClient::new(model, base_url)?))
    }

    /// External OpenAI-compatible backend (`{base_url}/v1/chat/completions`).
    pub fn openai_compatible(
        model: &str,
        base_url: &str,
        api_key: Option<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self::OpenAiCompatible(OpenAiCompatibleClient::new(
            model, base_url, api_key,
        )?))
    }

    /// Whether generated prompts leave the local trust domain.
    pub fn is_external(&self) -> bool {
        match self {
            Self::Ollama(_) => false,
            Self::OpenAiCompatible(_) => true,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Ollama(client) => format!("ollama:{}", client.model),
            Self::OpenAiCompatible(client) => format!("openai:{}", client.model),
        }
    }

    pub async fn generate(&self, prompt: &str, label: &Label) -> Result<LlmResponse, LlmError> {
        match self {
            Self::Ollama(client) => client.generate(prompt, label).await,
            Self::OpenAiCompatible(client) => client.generate(prompt, label).await,
        }
    }
}

fn build_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(LLM_TIMEOUT)
        .build()
        .map_err(LlmError::Client)
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaClient {
    pub fn new(model: &str, base_url: &str) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client()?,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn generate(&self, prompt: &str, label: &Label) -> Result<LlmResponse, LlmError> {
        let endpoint = format!("{}/api/generate", self.base_url);
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|source| LlmError::Http {
                url: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                url: endpoint,
                status,
            });
        }

        let body: serde_json::Value =
            response.json().await.map_err(|source| LlmError::Http {
                url: endpoint,
                source,
            })?;
        let text = body
            .get("response")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                LlmError::MalformedResponse("Ollama body has no `response` field".to_string())
            })?;

        info!(model = %self.model, chars = text.len(), "local generation complete");
        Ok(LlmResponse {
            text: text.to_string(),
            label: label.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(model: &str, base_url: &str, api_key: Option<String>) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client()?,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    async fn generate(&self, prompt: &str, label: &Label) -> Result<LlmResponse, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let endpoint = format!("{}/v1/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}]
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|source| LlmError::Http {
                url: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                url: endpoint,
                status,
            });
        }

        let body: serde_json::Value =
            response.json().await.map_err(|source| LlmError::Http {
                url: endpoint,
                source,
            })?;
        let text = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| {
                LlmError::MalformedResponse(
                    "chat completion has no `choices[0].message.content`".to_string(),
                )
            })?;

        info!(model = %self.model, chars = text.len(), "external generation complete");
        Ok(LlmResponse {
            text: text.to_string(),
            label: label.clone(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
