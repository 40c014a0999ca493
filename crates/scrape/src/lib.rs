//! Page fetching: HTTP retrieval plus HTML → clean-text extraction.
//!
//! The rest of the pipeline only ever sees a [`ScrapedContent`]; swapping in
//! another backend (a headless browser, say) means adding a [`Fetcher`]
//! variant, not touching any consumer.

use std::time::Duration;

use chrono::Utc;
use scraper::Html;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// HTTP timeout for a single page fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not decode body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// One fetched page. `fetched_at` is RFC-3339 UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedContent {
    pub url: String,
    pub fetched_at: String,
    pub raw_html: String,
    pub clean_text: String,
}

/// The fetch backends, as a tagged variant behind one `fetch` operation.
#[derive(Debug, Clone)]
pub enum Fetcher {
    Http(HttpFetcher),
}

impl Fetcher {
    /// Plain-HTTP backend with the given user agent.
    pub fn http(user_agent: &str) -> Result<Self, FetchError> {
        Ok(Self::Http(HttpFetcher::new(user_agent)?))
    }

    pub async fn fetch(&self, url: &str) -> Result<ScrapedContent, FetchError> {
        match self {
            Self::Http(fetcher) => fetcher.fetch(url).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<ScrapedContent, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html")
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let raw_html = response.text().await.map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })?;
        let clean_text = extract_clean_text(&raw_html);
        info!(url, html_bytes = raw_html.len(), text_bytes = clean_text.len(), "fetched page");

        Ok(ScrapedContent {
            url: url.to_string(),
            fetched_at: Utc::now().to_rfc3339(),
            raw_html,
            clean_text,
        })
    }
}

/// Text content of the document with `script`/`style` subtrees dropped and
/// whitespace runs collapsed to single spaces.
pub fn extract_clean_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_skipped_subtree = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        });
        if !in_skipped_subtree {
            parts.push(text);
        }
    }
    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    #[test]
    fn clean_text_drops_script_and_style() {
        let html = r#"<html><head><style>body { color: red }</style></head>
            <body><p>Hello</p><script>var x = 1;</script><p>world</p></body></html>"#;
        assert_eq!(extract_clean_text(html), "Hello world");
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        let html = "<p>alpha\n\n   beta\t gamma</p>";
        assert_eq!(extract_clean_text(html), "alpha beta gamma");
    }

    #[test]
    fn clean_text_of_empty_document_is_empty() {
        assert_eq!(extract_clean_text(""), "");
    }

    #[tokio::test]
    async fn fetch_returns_content_with_rfc3339_timestamp() {
        let server = MockServer::start_async().await;
        let page = server
            .mock_async(|when, then| {
                when.method(GET).path("/article");
                then.status(200)
                    .header("content-type", "text/html")
                    .body("<html><body><p>alpha beta</p></body></html>");
            })
            .await;

        let fetcher = Fetcher::http("flowgent-test/0.2").unwrap();
        let content = fetcher.fetch(&server.url("/article")).await.unwrap();

        page.assert_async().await;
        assert_eq!(content.clean_text, "alpha beta");
        assert!(content.raw_html.contains("<p>alpha beta</p>"));
        assert!(chrono::DateTime::parse_from_rfc3339(&content.fetched_at).is_ok());
    }

    #[tokio::test]
    async fn fetch_surfaces_non_success_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let fetcher = Fetcher::http("flowgent-test/0.2").unwrap();
        let err = fetcher.fetch(&server.url("/missing")).await.unwrap_err();
        match err {
            FetchError::Status { status, .. } => assert_eq!(status.as_u16(), 404),
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
