//! `run_agent`: scrape the given URLs and answer a prompt from them under
//! the configured information-flow policy.
//!
//! Policy denials are a normal outcome: they print as `[ERROR] <reason>`
//! and the process still exits 0. Only usage errors and malformed URLs
//! exit non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use flowgent_agent::WebAgent;
use flowgent_config::AppConfig;
use flowgent_labels::{Label, Lattice};
use flowgent_llm::{LlmClient, LlmError};
use flowgent_policy::Policy;
use flowgent_scrape::Fetcher;
use flowgent_store::JsonStorage;
use flowgent_trust::TrustParser;

#[derive(Debug, Parser)]
#[command(
    name = "run_agent",
    version,
    about = "Information-flow-controlled web agent"
)]
struct Cli {
    /// Path to the JSON configuration file.
    config: PathBuf,

    /// URLs to scrape; each needs a scheme and a host.
    #[arg(required = true)]
    urls: Vec<String>,

    /// The question answered from the scraped sources.
    #[arg(long, default_value = "Summarize the main points.")]
    prompt: String,

    /// The caller's clearance, e.g. `Secret` or `Confidential+PII`.
    #[arg(long, default_value = "Secret")]
    user_label: Label,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    for url in &cli.urls {
        if !is_well_formed(url) {
            println!("[ERROR] Invalid URL format: {url}");
            return ExitCode::FAILURE;
        }
    }

    match run(cli).await {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("[ERROR] {err}");
            ExitCode::SUCCESS
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let lattice = Lattice::new(config.lattice.clone())?;
    let policy = Policy::new(
        lattice.clone(),
        config
            .external_llm_allowed
            .iter()
            .map(|label| label.to_label()),
        config.user_output_max.to_label(),
    );
    let parser = TrustParser::new(
        &config.tools.trusted_domains,
        &config.tools.blocked_domains,
    );
    let fetcher = Fetcher::http(&config.tools.user_agent)?;
    let storage = JsonStorage::open(config.tools.storage_path.clone()).await?;
    let llm = build_llm(&config)?;
    info!(llm = %llm.name(), store = %config.tools.storage_path, "starting agent run");

    let agent = WebAgent::new(lattice, policy, parser, fetcher, storage, llm);
    let result = agent
        .run(&cli.prompt, &cli.user_label, &cli.urls, None)
        .await?;
    info!(label = %result.label, "run complete");
    Ok(result.text)
}

/// `OPENAI_API_KEY` set and non-empty selects the external client.
fn build_llm(config: &AppConfig) -> Result<LlmClient, LlmError> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());
    match api_key {
        Some(key) => LlmClient::openai_compatible(
            &config.openai_compatible.model,
            &config.openai_compatible.base_url,
            Some(key),
        ),
        None => LlmClient::ollama(&config.ollama.model, &config.ollama.base_url),
    }
}

fn is_well_formed(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| parsed.has_host())
        .unwrap_or(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
