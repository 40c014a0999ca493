//! End-to-end pipeline runs over mock HTTP: scraped pages and the local
//! LLM endpoint are both served by `httpmock`.

use httpmock::prelude::*;

use flowgent_agent::{AgentError, WebAgent};
use flowgent_labels::{Label, LabelError, Lattice};
use flowgent_llm::LlmClient;
use flowgent_policy::Policy;
use flowgent_scrape::Fetcher;
use flowgent_store::JsonStorage;
use flowgent_trust::TrustParser;

const LEVELS: [&str; 4] = ["Public", "Internal", "Confidential", "Secret"];

/// A page that scores `Internal` when its host is trusted: the author meta
/// adds the provenance term, and the clean body adds the substance term.
fn sourced_page(text: &str) -> String {
    format!(
        "<html><head><meta name=\"author\" content=\"Staff\"></head>\
         <body><p>{text}</p></body></html>"
    )
}

/// A bare page with no provenance markers; on an untrusted host it scores
/// below 0.5 and is quarantined as `Confidential+Untrusted`.
fn bare_page(text: &str) -> String {
    format!("<html><body><p>{text}</p></body></html>")
}

fn lattice() -> Lattice {
    Lattice::new(LEVELS).unwrap()
}

async fn storage(dir: &tempfile::TempDir) -> JsonStorage {
    JsonStorage::open(dir.path().join("store.json"))
        .await
        .unwrap()
}

async fn serve_page(server: &MockServer, path: &str, html: String) {
    server
        .mock_async(move |when, then| {
            when.method(GET).path(path.to_string());
            then.status(200)
                .header("content-type", "text/html")
                .body(html);
        })
        .await;
}

#[tokio::test]
async fn happy_path_with_local_llm_propagates_the_joined_label() {
    let server = MockServer::start_async().await;
    serve_page(&server, "/alpha", sourced_page("alpha beta")).await;
    serve_page(&server, "/gamma", sourced_page("gamma delta")).await;
    let llm_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_contains("[Source 1]");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"response": "Alpha is beta. [Source 1]"}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let agent = WebAgent::new(
        lattice(),
        Policy::new(lattice(), [], Label::bare("Secret")),
        TrustParser::new(["127.0.0.1"], Vec::<&str>::new()),
        Fetcher::http("flowgent-test/0.2").unwrap(),
        storage(&dir).await,
        LlmClient::ollama("llama3.1:8b", &server.base_url()).unwrap(),
    );

    let user_label = Label::bare("Internal");
    let urls = vec![server.url("/alpha"), server.url("/gamma")];
    let result = agent.run("alpha", &user_label, &urls, None).await.unwrap();

    llm_mock.assert_async().await;
    assert_eq!(result.text, "Alpha is beta. [Source 1]");
    assert_eq!(result.label, Label::bare("Internal"));
    // The result may always flow to the configured user clearance.
    assert!(lattice().can_flow(&result.label, &Label::bare("Secret")));

    let docs = storage(&dir).await.load_documents().await.unwrap();
    assert_eq!(docs.len(), 2);
}

#[tokio::test]
async fn label_cap_excluding_everything_skips_the_llm() {
    let server = MockServer::start_async().await;
    serve_page(&server, "/alpha", bare_page("alpha beta")).await;
    serve_page(&server, "/gamma", bare_page("gamma delta")).await;
    let llm_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"response": "never used"}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let agent = WebAgent::new(
        lattice(),
        Policy::new(lattice(), [], Label::bare("Secret")),
        TrustParser::default(),
        Fetcher::http("flowgent-test/0.2").unwrap(),
        storage(&dir).await,
        LlmClient::ollama("llama3.1:8b", &server.base_url()).unwrap(),
    );

    let user_label = Label::bare("Public");
    let urls = vec![server.url("/alpha"), server.url("/gamma")];
    let result = agent.run("alpha", &user_label, &urls, None).await.unwrap();

    assert_eq!(
        result.text,
        "No relevant or authorized documents were found for this query."
    );
    assert_eq!(result.label, Label::bare("Public"));
    assert_eq!(llm_mock.hits_async().await, 0);

    // The documents were still persisted, just not authorized for this user.
    let docs = storage(&dir).await.load_documents().await.unwrap();
    assert_eq!(docs.len(), 2);
}

#[tokio::test]
async fn external_llm_gate_blocks_before_any_call_leaves() {
    let server = MockServer::start_async().await;
    serve_page(&server, "/alpha", bare_page("alpha beta")).await;
    let llm_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "choices": [{"message": {"content": "never used"}}]
                }));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let agent = WebAgent::new(
        lattice(),
        Policy::new(lattice(), [Label::bare("Internal")], Label::bare("Secret")),
        TrustParser::default(),
        Fetcher::http("flowgent-test/0.2").unwrap(),
        storage(&dir).await,
        LlmClient::openai_compatible(
            "gpt-4o-mini",
            &server.base_url(),
            Some("test-key".to_string()),
        )
        .unwrap(),
    );

    // Clearance high enough to retrieve the quarantined document.
    let user_label = Label::new("Confidential", ["Untrusted"]);
    let urls = vec![server.url("/alpha")];
    let err = agent.run("alpha", &user_label, &urls, None).await.unwrap_err();

    match err {
        AgentError::PolicyViolation(reason) => {
            assert!(reason.contains("Confidential"), "reason: {reason}");
            assert!(reason.contains("exceeds external LLM policy"));
        }
        other => panic!("expected policy violation, got {other:?}"),
    }
    assert_eq!(llm_mock.hits_async().await, 0);
}

#[tokio::test]
async fn user_egress_gate_blocks_a_generated_response() {
    let server = MockServer::start_async().await;
    serve_page(&server, "/alpha", sourced_page("alpha beta")).await;
    let llm_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"response": "generated answer"}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let agent = WebAgent::new(
        lattice(),
        Policy::new(lattice(), [], Label::bare("Public")),
        TrustParser::new(["127.0.0.1"], Vec::<&str>::new()),
        Fetcher::http("flowgent-test/0.2").unwrap(),
        storage(&dir).await,
        LlmClient::ollama("llama3.1:8b", &server.base_url()).unwrap(),
    );

    let user_label = Label::bare("Internal");
    let urls = vec![server.url("/alpha")];
    let err = agent.run("alpha", &user_label, &urls, None).await.unwrap_err();

    // Generation happened, then the response label failed user egress.
    assert_eq!(llm_mock.hits_async().await, 1);
    match err {
        AgentError::PolicyViolation(reason) => {
            assert_eq!(reason, "Label Internal exceeds user clearance.");
        }
        other => panic!("expected policy violation, got {other:?}"),
    }
}

#[tokio::test]
async fn scrape_label_categories_reach_the_stored_documents() {
    let server = MockServer::start_async().await;
    serve_page(&server, "/alpha", sourced_page("alpha beta")).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({"response": "ok"}));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let agent = WebAgent::new(
        lattice(),
        Policy::new(lattice(), [], Label::new("Secret", ["Ops"])),
        TrustParser::new(["127.0.0.1"], Vec::<&str>::new()),
        Fetcher::http("flowgent-test/0.2").unwrap(),
        storage(&dir).await,
        LlmClient::ollama("llama3.1:8b", &server.base_url()).unwrap(),
    );

    let user_label = Label::new("Secret", ["Ops"]);
    let scrape_label = Label::new("Internal", ["Ops"]);
    let urls = vec![server.url("/alpha")];
    let result = agent
        .run("alpha", &user_label, &urls, Some(scrape_label))
        .await
        .unwrap();

    let assessments = storage(&dir).await.load_trust_assessments().await.unwrap();
    assert_eq!(assessments.len(), 1);
    // Parser said Internal; joined with the Internal+Ops scrape floor.
    assert_eq!(assessments[0].label, Label::new("Internal", ["Ops"]));
    // Combined label for the LLM call: join(Secret+Ops, Internal+Ops).
    assert_eq!(result.label, Label::new("Secret", ["Ops"]));
}

#[tokio::test]
async fn unknown_scrape_level_fails_fast() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let agent = WebAgent::new(
        lattice(),
        Policy::new(lattice(), [], Label::bare("Secret")),
        TrustParser::default(),
        Fetcher::http("flowgent-test/0.2").unwrap(),
        storage(&dir).await,
        LlmClient::ollama("llama3.1:8b", &server.base_url()).unwrap(),
    );

    let err = agent
        .run(
            "alpha",
            &Label::bare("Public"),
            &[server.url("/alpha")],
            Some(Label::bare("Cosmic")),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Label(LabelError::UnknownLevel(level)) if level == "Cosmic"
    ));
}

#[tokio::test]
async fn fetch_failure_aborts_the_run_with_url_context() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/gone");
            then.status(502);
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let agent = WebAgent::new(
        lattice(),
        Policy::new(lattice(), [], Label::bare("Secret")),
        TrustParser::default(),
        Fetcher::http("flowgent-test/0.2").unwrap(),
        storage(&dir).await,
        LlmClient::ollama("llama3.1:8b", &server.base_url()).unwrap(),
    );

    let err = agent
        .run("alpha", &Label::bare("Public"), &[server.url("/gone")], None)
        .await
        .unwrap_err();
    match err {
        AgentError::Fetch(fetch) => assert!(fetch.to_string().contains("/gone")),
        other => panic!("expected fetch error, got {other:?}"),
    }

    // Nothing was persisted for the failed run.
    let docs = storage(&dir).await.load_documents().await.unwrap();
    assert!(docs.is_empty());
}
