use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use flowgent_labels::Label;

/// A label as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub level: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl LabelConfig {
    pub fn to_label(&self) -> Label {
        Label::new(self.level.clone(), self.categories.iter().cloned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub storage_path: String,
    pub trusted_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub user_agent: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            storage_path: "data/store.json".to_string(),
            trusted_domains: Vec::new(),
            blocked_domains: Vec::new(),
            user_agent: "flowgent/0.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub model: String,
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1:8b".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiCompatibleConfig {
    pub model: String,
    pub base_url: String,
}

impl Default for OpenAiCompatibleConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Lattice levels, lowest first.
    pub lattice: Vec<String>,
    pub user_output_max: LabelConfig,
    /// Upper-bound labels permitted to reach an external LLM. Empty means
    /// nothing may leave: deny by default.
    pub external_llm_allowed: Vec<LabelConfig>,
    pub tools: ToolsConfig,
    pub ollama: OllamaConfig,
    pub openai_compatible: OpenAiCompatibleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lattice: ["Public", "Internal", "Confidential", "Secret"]
                .map(str::to_string)
                .to_vec(),
            user_output_max: LabelConfig {
                level: "Secret".to_string(),
                categories: Vec::new(),
            },
            external_llm_allowed: Vec::new(),
            tools: ToolsConfig::default(),
            ollama: OllamaConfig::default(),
            openai_compatible: OpenAiCompatibleConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let raw = r#"{
            "lattice": ["Public", "Internal", "Confidential", "Secret"],
            "user_output_max": {"level": "Secret"},
            "external_llm_allowed": [{"level": "Internal", "categories": ["PII"]}],
            "tools": {
                "storage_path": "/tmp/store.json",
                "trusted_domains": ["example.com"],
                "blocked_domains": [],
                "user_agent": "agent/1.0"
            },
            "ollama": {"model": "llama3.1:8b", "base_url": "http://127.0.0.1:11434"},
            "openai_compatible": {"model": "gpt-4o-mini", "base_url": "https://api.openai.com"}
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.lattice.len(), 4);
        assert_eq!(config.user_output_max.to_label(), Label::bare("Secret"));
        assert_eq!(
            config.external_llm_allowed[0].to_label(),
            Label::new("Internal", ["PII"])
        );
        assert_eq!(config.tools.trusted_domains, vec!["example.com"]);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.lattice.last().map(String::as_str), Some("Secret"));
        assert!(config.external_llm_allowed.is_empty());
        assert_eq!(config.tools.storage_path, "data/store.json");
        assert_eq!(config.ollama.base_url, "http://127.0.0.1:11434");
    }

    #[test]
    fn load_from_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"lattice": ["Low", "High"]}"#).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.lattice, vec!["Low", "High"]);
    }

    #[test]
    fn load_from_missing_file_errors() {
        assert!(AppConfig::load_from("/nonexistent/config.json").is_err());
    }
}
