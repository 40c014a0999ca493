//! JSON-backed persistence for scraped documents and their trust assessments.
//!
//! One document on disk, two parallel arrays. A `store` call lands whole or
//! not at all: the new payload is written to a `.tmp` sibling, synced, then
//! renamed over the original.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use flowgent_labels::Label;
use flowgent_scrape::ScrapedContent;
use flowgent_trust::TrustAssessment;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed store file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A persisted page. `id` is assigned on first store and survives updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub url: String,
    pub fetched_at: String,
    pub raw_html: String,
    pub clean_text: String,
}

/// The persisted assessment paired 1-to-1 with a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrustAssessment {
    pub document_id: String,
    pub score: f64,
    pub label: Label,
    #[serde(default)]
    pub signals: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    trust_assessments: Vec<StoredTrustAssessment>,
}

/// Append/load storage over a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    /// Opens the store at `path`, creating parent directories and an empty
    /// store file when missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let storage = Self { path: path.into() };
        if let Some(parent) = storage.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| storage.io_err(source))?;
        }
        if tokio::fs::try_exists(&storage.path)
            .await
            .map_err(|source| storage.io_err(source))?
        {
            return Ok(storage);
        }
        storage.save(&StoreFile::default()).await?;
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `(content, assessment)`.
    ///
    /// Dedup rule: the first existing record (in insertion order) whose URL
    /// matches or whose `clean_text` hash matches is updated in place,
    /// keeping its id. Otherwise a fresh id is assigned and both records
    /// are appended.
    pub async fn store(
        &self,
        content: &ScrapedContent,
        assessment: &TrustAssessment,
    ) -> Result<(Document, StoredTrustAssessment), StorageError> {
        let mut payload = self.load().await?;
        let new_hash = content_hash(&content.clean_text);

        let matched = payload
            .documents
            .iter()
            .position(|doc| doc.url == content.url || content_hash(&doc.clean_text) == new_hash);

        let id = match matched {
            Some(idx) => payload.documents[idx].id.clone(),
            None => Uuid::new_v4().to_string(),
        };

        let document = Document {
            id: id.clone(),
            url: content.url.clone(),
            fetched_at: content.fetched_at.clone(),
            raw_html: content.raw_html.clone(),
            clean_text: content.clean_text.clone(),
        };
        let stored_assessment = StoredTrustAssessment {
            document_id: id.clone(),
            score: assessment.score,
            label: assessment.label.clone(),
            signals: assessment.signals.clone(),
        };

        match matched {
            Some(idx) => {
                payload.documents[idx] = document.clone();
                if let Some(slot) = payload
                    .trust_assessments
                    .iter_mut()
                    .find(|stored| stored.document_id == id)
                {
                    *slot = stored_assessment.clone();
                }
                debug!(%id, url = %content.url, "updated stored document");
            }
            None => {
                payload.documents.push(document.clone());
                payload.trust_assessments.push(stored_assessment.clone());
                debug!(%id, url = %content.url, "stored new document");
            }
        }

        self.save(&payload).await?;
        Ok((document, stored_assessment))
    }

    /// All documents, in insertion order.
    pub async fn load_documents(&self) -> Result<Vec<Document>, StorageError> {
        Ok(self.load().await?.documents)
    }

    /// All assessments, in insertion order.
    pub async fn load_trust_assessments(
        &self,
    ) -> Result<Vec<StoredTrustAssessment>, StorageError> {
        Ok(self.load().await?.trust_assessments)
    }

    async fn load(&self) -> Result<StoreFile, StorageError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| self.io_err(source))?;
        serde_json::from_slice(&raw).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Write to a `.tmp` sibling, sync, then rename over the original so a
    /// crash mid-write leaves the previous contents intact.
    async fn save(&self, payload: &StoreFile) -> Result<(), StorageError> {
        let rendered =
            serde_json::to_vec_pretty(payload).map_err(|source| StorageError::Json {
                path: self.path.clone(),
                source,
            })?;

        let tmp_path = {
            let filename = self
                .path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "store.json".to_string());
            self.path.with_file_name(format!("{filename}.tmp"))
        };

        let write_result: Result<(), std::io::Error> = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            file.write_all(&rendered).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(source) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(self.io_err(source));
        }

        if let Err(source) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(self.io_err(source));
        }

        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{digest:x}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
