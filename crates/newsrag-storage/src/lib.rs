//! Document store seam, credential-initialized file store and the article upsert gateway.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use newsrag_core::Article;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "newsrag-storage";

/// Collection every ingested article is written to.
pub const NEWS_COLLECTION: &str = "news";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("document store credentials {path}: {reason}")]
    Credentials { path: String, reason: String },
    #[error("invalid document id {0:?}")]
    InvalidId(String),
    #[error("encoding document {collection}/{id}: {source}")]
    Encode {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Collection-scoped, id-keyed document API.
///
/// `put` is create-or-fully-replace: no field of a previous document under the
/// same id survives.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, collection: &str, id: &str, document: &JsonValue) -> Result<(), StorageError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<JsonValue>, StorageError>;
}

/// Subset of a service-account key file the store needs.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreCredentials {
    pub project_id: String,
}

impl StoreCredentials {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let credentials_error = |reason: String| StorageError::Credentials {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| credentials_error(e.to_string()))?;
        let creds: StoreCredentials =
            serde_json::from_str(&text).map_err(|e| credentials_error(e.to_string()))?;
        if creds.project_id.trim().is_empty() {
            return Err(credentials_error("project_id is empty".to_string()));
        }
        Ok(creds)
    }
}

/// Longest encoded name used verbatim; longer ones are shortened and hashed.
const MAX_PLAIN_NAME_LEN: usize = 200;

/// Encoded prefix kept in front of the hash of an over-long name.
const HASHED_PREFIX_LEN: usize = 150;

/// Filesystem-safe rendering of a collection name or document id.
///
/// Names past `MAX_PLAIN_NAME_LEN` bytes become `<prefix>~<sha256 of the id>`,
/// which is always longer than any plain name, so the two forms never collide.
pub fn file_safe_id(id: &str) -> Result<String, StorageError> {
    let encoded = match id {
        "" => return Err(StorageError::InvalidId(id.to_string())),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(id).into_owned(),
    };
    if encoded.len() <= MAX_PLAIN_NAME_LEN {
        return Ok(encoded);
    }

    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    let digest = hex::encode(hasher.finalize());
    // Never cut through a %XX escape.
    let mut cut = HASHED_PREFIX_LEN;
    while let Some(pos) = encoded[..cut].rfind('%').filter(|p| p + 3 > cut) {
        cut = pos;
    }
    Ok(format!("{}~{digest}", &encoded[..cut]))
}

/// JSON documents on disk under `<root>/<collection>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Initialize from a credentials file; documents are scoped under the project id.
    pub fn from_credentials_file(
        credentials_path: impl AsRef<Path>,
        data_dir: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        let creds = StoreCredentials::from_file(credentials_path)?;
        let project_dir = file_safe_id(&creds.project_id)?;
        Ok(Self::new(data_dir.as_ref().join(project_dir)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf, StorageError> {
        Ok(self
            .root
            .join(file_safe_id(collection)?)
            .join(format!("{}.json", file_safe_id(id)?)))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    /// Replace atomically via a temp file in the target directory and a rename.
    async fn put(&self, collection: &str, id: &str, document: &JsonValue) -> Result<(), StorageError> {
        let path = self.document_path(collection, id)?;
        let bytes = serde_json::to_vec_pretty(document).map_err(|source| StorageError::Encode {
            collection: collection.to_string(),
            id: id.to_string(),
            source,
        })?;

        let parent = path
            .parent()
            .context("document path always has a parent")?
            .to_path_buf();
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating collection directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp document {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp document {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp document {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(anyhow::Error::new(err)
                .context(format!(
                    "replacing document {} -> {}",
                    temp_path.display(),
                    path.display()
                ))
                .into());
        }

        debug!(collection, id, path = %path.display(), "document written");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<JsonValue>, StorageError> {
        let path = self.document_path(collection, id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("reading document {}", path.display()))
                    .into())
            }
        };
        let value: JsonValue = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing document {}", path.display()))?;
        Ok(Some(value))
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<(String, String), JsonValue>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Sorted ids stored in `collection`.
    pub async fn ids(&self, collection: &str) -> Vec<String> {
        let documents = self.documents.read().await;
        let mut ids = documents
            .keys()
            .filter(|(c, _)| c == collection)
            .map(|(_, id)| id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, collection: &str, id: &str, document: &JsonValue) -> Result<(), StorageError> {
        if id.is_empty() {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        self.documents
            .write()
            .await
            .insert((collection.to_string(), id.to_string()), document.clone());
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<JsonValue>, StorageError> {
        Ok(self
            .documents
            .read()
            .await
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written { id: String },
    SkippedNoUrl,
}

/// Writes normalized articles into the `news` collection keyed by derived URL id.
#[derive(Clone)]
pub struct UpsertGateway {
    store: Arc<dyn DocumentStore>,
}

impl UpsertGateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn upsert(&self, article: &Article) -> Result<UpsertOutcome, StorageError> {
        let Some(id) = article.document_id() else {
            return Ok(UpsertOutcome::SkippedNoUrl);
        };
        let document = serde_json::to_value(article).map_err(|source| StorageError::Encode {
            collection: NEWS_COLLECTION.to_string(),
            id: id.clone(),
            source,
        })?;
        self.store.put(NEWS_COLLECTION, &id, &document).await?;
        Ok(UpsertOutcome::Written { id })
    }
}
