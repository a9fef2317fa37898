//! Environment-driven service configuration.

use std::path::PathBuf;
use std::time::Duration;

use newsrag_storage::{FsDocumentStore, StorageError};

pub const DEFAULT_GNEWS_BASE_URL: &str = "https://gnews.io/api/v4";

pub const GNEWS_API_KEY_VAR: &str = "GNEWS_API_KEY";
pub const CREDENTIALS_PATH_VAR: &str = "FIREBASE_CREDENTIALS_PATH";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub gnews_api_key: Option<String>,
    pub gnews_base_url: String,
    pub credentials_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub http_timeout_secs: Option<u64>,
    pub web_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            gnews_api_key: var(GNEWS_API_KEY_VAR),
            gnews_base_url: var("GNEWS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GNEWS_BASE_URL.to_string()),
            credentials_path: var(CREDENTIALS_PATH_VAR).map(PathBuf::from),
            data_dir: var("NEWSRAG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            http_timeout_secs: var("NEWSRAG_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()),
            web_port: var("NEWSRAG_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
        }
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    /// Open the credential-initialized document store.
    pub fn document_store(&self) -> Result<FsDocumentStore, StorageError> {
        let Some(path) = &self.credentials_path else {
            return Err(StorageError::Credentials {
                path: CREDENTIALS_PATH_VAR.to_string(),
                reason: "not set".to_string(),
            });
        };
        FsDocumentStore::from_credentials_file(path, &self.data_dir)
    }
}
