//! Categorized news ingestion: provider fetch, normalization and upsert orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use newsrag_core::{normalize_article, Article};
use newsrag_storage::{DocumentStore, StorageError, UpsertGateway, UpsertOutcome};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub mod config;
pub mod gnews;

pub use config::ServiceConfig;
pub use gnews::{
    GNewsClient, GNewsClientConfig, HeadlinesQuery, HeadlinesResponse, NewsProvider, ProviderError,
};

pub const CRATE_NAME: &str = "newsrag-ingest";

pub const MISSING_API_KEY_DETAIL: &str = "GNEWS_API_KEY not found";

/// Number of articles echoed back in an update summary.
pub const SUMMARY_SAMPLE_SIZE: usize = 5;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Configuration(String),
    #[error("upstream returned http status {status}")]
    Upstream { status: u16, body: String },
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("malformed upstream response: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ProviderError> for IngestError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { status, body } => Self::Upstream { status, body },
            ProviderError::Transport(err) => Self::Transport(err),
            ProviderError::Decode(err) => Self::MalformedResponse(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub status: String,
    pub count: usize,
    pub articles: Vec<Article>,
}

impl UpdateSummary {
    /// Summary over every accumulated article, echoing only the first few.
    pub fn success(mut articles: Vec<Article>) -> Self {
        let count = articles.len();
        articles.truncate(SUMMARY_SAMPLE_SIZE);
        Self {
            status: "success".to_string(),
            count,
            articles,
        }
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct IngestionOrchestrator {
    provider: Arc<dyn NewsProvider>,
    api_key: Option<String>,
    gateway: Option<UpsertGateway>,
    clock: Clock,
}

impl IngestionOrchestrator {
    pub fn new(provider: Arc<dyn NewsProvider>, api_key: Option<String>) -> Self {
        Self {
            provider,
            api_key,
            gateway: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Production wiring: GNews client from config, storage when a store is supplied.
    pub fn from_config(
        config: &ServiceConfig,
        store: Option<Arc<dyn DocumentStore>>,
    ) -> anyhow::Result<Self> {
        let client = GNewsClient::new(GNewsClientConfig::from(config))?;
        let orchestrator = Self::new(Arc::new(client), config.gnews_api_key.clone());
        Ok(match store {
            Some(store) => orchestrator.with_storage(UpsertGateway::new(store)),
            None => orchestrator,
        })
    }

    pub fn with_storage(mut self, gateway: UpsertGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn storage_enabled(&self) -> bool {
        self.gateway.is_some()
    }

    /// Fetch, normalize and (when storage is enabled) upsert every category in order.
    ///
    /// The first failing category aborts the run. Writes made for earlier
    /// categories are kept, so a failed run may leave storage partially updated.
    pub async fn run(&self, categories: &[String]) -> Result<UpdateSummary, IngestError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| IngestError::Configuration(MISSING_API_KEY_DETAIL.to_string()))?;
        self.run_categories(api_key, categories).await
    }

    #[instrument(
        name = "update_news",
        skip_all,
        fields(categories = categories.len(), storage = self.storage_enabled())
    )]
    async fn run_categories(
        &self,
        api_key: &str,
        categories: &[String],
    ) -> Result<UpdateSummary, IngestError> {
        let mut articles = Vec::new();
        let mut persisted = 0usize;
        let mut skipped = 0usize;

        for category in categories {
            debug!(category = %category, "fetching top headlines");
            let query = HeadlinesQuery::for_category(category, api_key);
            let response = match self.provider.top_headlines(&query).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(category = %category, error = %err, "headline fetch failed, aborting update");
                    return Err(err.into());
                }
            };

            let now = (self.clock)();
            for raw in response.articles {
                let article = normalize_article(raw, category, now);
                if let Some(gateway) = &self.gateway {
                    match gateway.upsert(&article).await? {
                        UpsertOutcome::Written { .. } => persisted += 1,
                        UpsertOutcome::SkippedNoUrl => skipped += 1,
                    }
                }
                articles.push(article);
            }
        }

        info!(
            fetched = articles.len(),
            persisted, skipped, "news update complete"
        );
        Ok(UpdateSummary::success(articles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use newsrag_core::RawArticle;
    use newsrag_storage::{MemoryDocumentStore, NEWS_COLLECTION};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedProvider {
        responses: HashMap<String, Result<Vec<RawArticle>, (u16, String)>>,
        calls: Mutex<Vec<HeadlinesQuery>>,
    }

    impl ScriptedProvider {
        fn ok(mut self, topic: &str, articles: Vec<RawArticle>) -> Self {
            self.responses.insert(topic.to_string(), Ok(articles));
            self
        }

        fn failing(mut self, topic: &str, status: u16, body: &str) -> Self {
            self.responses
                .insert(topic.to_string(), Err((status, body.to_string())));
            self
        }

        fn topics_called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|q| q.topic.clone())
                .collect()
        }
    }

    #[async_trait]
    impl NewsProvider for ScriptedProvider {
        async fn top_headlines(
            &self,
            query: &HeadlinesQuery,
        ) -> Result<HeadlinesResponse, ProviderError> {
            self.calls.lock().unwrap().push(query.clone());
            match self.responses.get(&query.topic) {
                Some(Ok(articles)) => Ok(HeadlinesResponse {
                    total_articles: Some(articles.len() as u64),
                    articles: articles.clone(),
                }),
                Some(Err((status, body))) => Err(ProviderError::Status {
                    status: *status,
                    body: body.clone(),
                }),
                None => Ok(HeadlinesResponse::default()),
            }
        }
    }

    fn raw(url: Option<&str>, title: &str) -> RawArticle {
        RawArticle {
            title: Some(title.to_string()),
            url: url.map(ToString::to_string),
            ..Default::default()
        }
    }

    fn batch(prefix: &str, n: usize) -> Vec<RawArticle> {
        (0..n)
            .map(|i| {
                raw(
                    Some(&format!("https://news.example/{prefix}/{i}")),
                    &format!("{prefix} {i}"),
                )
            })
            .collect()
    }

    fn fixed_clock() -> Clock {
        let now = DateTime::parse_from_rfc3339("2026-02-24T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);
        Arc::new(move || now)
    }

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_fetch() {
        let provider = Arc::new(ScriptedProvider::default().ok("technology", batch("t", 2)));
        let orchestrator = IngestionOrchestrator::new(provider.clone(), None);

        let err = orchestrator
            .run(&categories(&["technology"]))
            .await
            .expect_err("must fail");

        assert!(matches!(err, IngestError::Configuration(ref d) if d == MISSING_API_KEY_DETAIL));
        assert!(provider.topics_called().is_empty());
    }

    #[tokio::test]
    async fn fetches_each_category_once_in_order() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .ok("science", batch("s", 2))
                .ok("technology", batch("t", 1)),
        );
        let orchestrator = IngestionOrchestrator::new(provider.clone(), Some("key".into()));

        orchestrator
            .run(&categories(&["science", "technology", "business"]))
            .await
            .expect("run");

        assert_eq!(
            provider.topics_called(),
            vec!["science", "technology", "business"]
        );
        assert!(provider
            .calls
            .lock()
            .unwrap()
            .iter()
            .all(|q| q.apikey == "key" && q.max == 10 && q.lang == "en" && q.country == "us"));
    }

    #[tokio::test]
    async fn summary_counts_everything_and_samples_first_five() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .ok("technology", batch("t", 4))
                .ok("science", batch("s", 3)),
        );
        let orchestrator = IngestionOrchestrator::new(provider, Some("key".into()));

        let summary = orchestrator
            .run(&categories(&["technology", "science"]))
            .await
            .expect("run");

        assert_eq!(summary.status, "success");
        assert_eq!(summary.count, 7);
        let titles = summary
            .articles
            .iter()
            .map(|a| a.title.clone().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["t 0", "t 1", "t 2", "t 3", "s 0"]);
        assert_eq!(summary.articles[4].category, "science");
    }

    #[tokio::test]
    async fn articles_without_url_are_returned_but_not_stored() {
        let provider = Arc::new(ScriptedProvider::default().ok(
            "business",
            vec![raw(None, "no link"), raw(Some("https://x.com/a/b"), "linked")],
        ));
        let store = Arc::new(MemoryDocumentStore::new());
        let orchestrator = IngestionOrchestrator::new(provider, Some("key".into()))
            .with_storage(UpsertGateway::new(store.clone()));

        let summary = orchestrator
            .run(&categories(&["business"]))
            .await
            .expect("run");

        assert_eq!(summary.count, 2);
        assert_eq!(summary.articles[0].title.as_deref(), Some("no link"));
        assert_eq!(store.ids(NEWS_COLLECTION).await, vec!["https_x.com_a_b"]);
    }

    #[tokio::test]
    async fn blank_url_is_returned_but_not_stored() {
        let provider = Arc::new(ScriptedProvider::default().ok(
            "science",
            vec![raw(Some(""), "blank link"), raw(Some("https://x.com/c"), "linked")],
        ));
        let store = Arc::new(MemoryDocumentStore::new());
        let orchestrator = IngestionOrchestrator::new(provider, Some("key".into()))
            .with_storage(UpsertGateway::new(store.clone()));

        let summary = orchestrator
            .run(&categories(&["science"]))
            .await
            .expect("blank url must not abort the run");

        assert_eq!(summary.count, 2);
        assert_eq!(summary.articles[0].url.as_deref(), Some(""));
        assert_eq!(store.ids(NEWS_COLLECTION).await, vec!["https_x.com_c"]);
    }

    #[tokio::test]
    async fn rerun_with_identical_data_is_idempotent() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .ok("technology", batch("t", 3))
                .ok("science", batch("s", 2)),
        );
        let store = Arc::new(MemoryDocumentStore::new());
        let orchestrator = IngestionOrchestrator::new(provider, Some("key".into()))
            .with_storage(UpsertGateway::new(store.clone()))
            .with_clock(fixed_clock());
        let cats = categories(&["technology", "science"]);

        orchestrator.run(&cats).await.expect("first run");
        let first_ids = store.ids(NEWS_COLLECTION).await;
        let first_doc = store
            .get(NEWS_COLLECTION, "https_news.example_t_0")
            .await
            .unwrap();

        orchestrator.run(&cats).await.expect("second run");

        assert_eq!(first_ids.len(), 5);
        assert_eq!(store.ids(NEWS_COLLECTION).await, first_ids);
        assert_eq!(
            store
                .get(NEWS_COLLECTION, "https_news.example_t_0")
                .await
                .unwrap(),
            first_doc
        );
    }

    #[tokio::test]
    async fn upstream_failure_aborts_remaining_categories_and_keeps_earlier_writes() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .ok("technology", batch("t", 2))
                .failing("science", 429, r#"{"errors":["quota"]}"#)
                .ok("business", batch("b", 2)),
        );
        let store = Arc::new(MemoryDocumentStore::new());
        let orchestrator = IngestionOrchestrator::new(provider.clone(), Some("key".into()))
            .with_storage(UpsertGateway::new(store.clone()));

        let err = orchestrator
            .run(&categories(&["technology", "science", "business"]))
            .await
            .expect_err("must fail");

        match err {
            IngestError::Upstream { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, r#"{"errors":["quota"]}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.topics_called(), vec!["technology", "science"]);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn later_category_overwrites_shared_key() {
        let shared = "https://news.example/shared";
        let provider = Arc::new(
            ScriptedProvider::default()
                .ok("technology", vec![raw(Some(shared), "tech take")])
                .ok("science", vec![raw(Some(shared), "science take")]),
        );
        let store = Arc::new(MemoryDocumentStore::new());
        let orchestrator = IngestionOrchestrator::new(provider, Some("key".into()))
            .with_storage(UpsertGateway::new(store.clone()));

        let summary = orchestrator
            .run(&categories(&["technology", "science"]))
            .await
            .expect("run");

        assert_eq!(summary.count, 2);
        let doc = store
            .get(NEWS_COLLECTION, "https_news.example_shared")
            .await
            .unwrap()
            .expect("stored");
        assert_eq!(doc["category"], "science");
        assert_eq!(doc["title"], "science take");
    }

    #[tokio::test]
    async fn empty_category_list_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::default());
        let orchestrator = IngestionOrchestrator::new(provider.clone(), Some("key".into()));

        let summary = orchestrator.run(&[]).await.expect("run");

        assert_eq!(summary.count, 0);
        assert!(summary.articles.is_empty());
        assert!(provider.topics_called().is_empty());
    }
}
