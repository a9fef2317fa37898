//! GNews top-headlines client and the provider seam the orchestrator calls through.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use newsrag_core::RawArticle;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{ServiceConfig, DEFAULT_GNEWS_BASE_URL};

pub const HEADLINES_LANG: &str = "en";
pub const HEADLINES_COUNTRY: &str = "us";
pub const HEADLINES_MAX: u32 = 10;

/// Query string of one top-headlines request.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct HeadlinesQuery {
    pub topic: String,
    pub lang: String,
    pub country: String,
    pub max: u32,
    pub apikey: String,
}

impl HeadlinesQuery {
    pub fn for_category(category: &str, api_key: &str) -> Self {
        Self {
            topic: category.to_string(),
            lang: HEADLINES_LANG.to_string(),
            country: HEADLINES_COUNTRY.to_string(),
            max: HEADLINES_MAX,
            apikey: api_key.to_string(),
        }
    }
}

impl std::fmt::Debug for HeadlinesQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlinesQuery")
            .field("topic", &self.topic)
            .field("lang", &self.lang)
            .field("country", &self.country)
            .field("max", &self.max)
            .field("apikey", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlinesResponse {
    #[serde(default)]
    pub total_articles: Option<u64>,
    #[serde(default)]
    pub articles: Vec<RawArticle>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned http status {status}")]
    Status { status: u16, body: String },
    #[error("request to provider failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decoding provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn top_headlines(&self, query: &HeadlinesQuery) -> Result<HeadlinesResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GNewsClientConfig {
    pub base_url: String,
    /// `None` keeps the transport default.
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl Default for GNewsClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GNEWS_BASE_URL.to_string(),
            timeout: None,
            user_agent: Some(concat!("newsrag/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl From<&ServiceConfig> for GNewsClientConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            base_url: config.gnews_base_url.clone(),
            timeout: config.http_timeout(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GNewsClient {
    client: reqwest::Client,
    headlines_url: String,
}

impl GNewsClient {
    pub fn new(config: GNewsClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            headlines_url: format!("{}/top-headlines", config.base_url.trim_end_matches('/')),
        })
    }

    pub fn headlines_url(&self) -> &str {
        &self.headlines_url
    }
}

#[async_trait]
impl NewsProvider for GNewsClient {
    async fn top_headlines(&self, query: &HeadlinesQuery) -> Result<HeadlinesResponse, ProviderError> {
        let resp = self
            .client
            .get(&self.headlines_url)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await?;
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let decoded: HeadlinesResponse = serde_json::from_slice(&bytes)?;
        debug!(
            topic = %query.topic,
            returned = decoded.articles.len(),
            total = decoded.total_articles,
            "top headlines fetched"
        );
        Ok(decoded)
    }
}
