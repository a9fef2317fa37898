//! Axum HTTP surface for NewsRAG: status, news update trigger and placeholder query.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use newsrag_core::default_categories;
use newsrag_ingest::{IngestError, IngestionOrchestrator};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const CRATE_NAME: &str = "newsrag-web";

pub const ROOT_MESSAGE: &str = "NewsRAG API running";
pub const PLACEHOLDER_ANSWER: &str = "Sample response";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<IngestionOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: IngestionOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateNewsRequest {
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for UpdateNewsRequest {
    fn default() -> Self {
        Self {
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    query: String,
}

#[derive(Debug, Serialize)]
struct QueryAnswer {
    query: String,
    answer: &'static str,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/update-news", post(update_news_handler))
        .route("/query", post(query_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Serve until ctrl-c.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, storage = state.orchestrator.storage_enabled(), "newsrag api listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": ROOT_MESSAGE }))
}

async fn update_news_handler(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<UpdateNewsRequest>>,
) -> Response {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    match state.orchestrator.run(&request.categories).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => ingest_error(err),
    }
}

async fn query_handler(Query(params): Query<QueryParams>) -> Json<QueryAnswer> {
    Json(QueryAnswer {
        query: params.query,
        answer: PLACEHOLDER_ANSWER,
    })
}

fn detail(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": detail.into() }))).into_response()
}

/// Upstream error statuses pass through; anything that is not an error status
/// (e.g. a 204 or a redirect) becomes 502 so the detail body is kept.
fn upstream_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

fn ingest_error(err: IngestError) -> Response {
    match err {
        IngestError::Configuration(message) => detail(StatusCode::INTERNAL_SERVER_ERROR, message),
        IngestError::Upstream { status, body } => detail(upstream_status(status), body),
        err @ (IngestError::Transport(_) | IngestError::MalformedResponse(_)) => {
            detail(StatusCode::BAD_GATEWAY, err.to_string())
        }
        IngestError::Storage(err) => {
            error!(error = %err, "storage write failed during news update");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
