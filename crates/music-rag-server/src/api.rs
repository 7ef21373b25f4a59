//! HTTP API
//!
//! Endpoints:
//! - `GET /` - service info
//! - `GET /health` - store reachability and counts
//! - `POST /search` - retrieval with optional enhancement, reranking and explanation
//! - `POST /index`, `POST /index/batch` - index items
//! - `GET /stats` - store counts and catalog size
//! - `GET /item/{id}` - one catalogued item
//!
//! Core calls are synchronous and run on the blocking pool. Optional LLM
//! stages run under a timeout and degrade to their fallback payloads.

use std::time::Duration;

use axum::extract::{Path, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use music_rag_core::llm::{
    enhance_or_fallback, explain_or_fallback, ContextualEnhancer, EnhancedQuery,
    ResultExplanation,
};
use music_rag_core::store::Modality;
use music_rag_core::{MusicItem, QueryResult, RagError, RetrievalQuery, VERSION};

use crate::state::AppState;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Concurrent requests admitted before queueing
const CONCURRENCY_LIMIT: usize = 64;

// ============================================================================
// ERRORS
// ============================================================================

/// Error response carrying a JSON `detail`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid API key")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run a synchronous core call on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, RagError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}

/// Run an optional stage, substituting `fallback` on timeout or panic
async fn optional_stage<T, F>(
    stage: &'static str,
    timeout: Duration,
    f: F,
    fallback: impl FnOnce() -> T,
) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(stage, error = %e, "Optional stage failed, using fallback");
            fallback()
        }
        Err(_) => {
            warn!(stage, timeout_secs = timeout.as_secs(), "Optional stage timed out, using fallback");
            fallback()
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.is_production() {
        CorsLayer::new()
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/index", post(index_item))
        .route("/index/batch", post(index_batch))
        .route("/stats", get(stats))
        .route("/item/{id}", get(get_item))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(
            ServiceBuilder::new()
                .concurrency_limit(CONCURRENCY_LIMIT)
                .layer(cors),
        )
        .with_state(state)
}

/// Reject requests without the configured API key.
/// `/` and `/health` stay open for liveness checks.
async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let open = matches!(request.uri().path(), "/" | "/health");
    if let (Some(expected), false) = (state.config.api_key.as_deref(), open) {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            warn!(path = %request.uri().path(), "Rejected request with invalid API key");
            return Err(ApiError::Forbidden);
        }
    }
    Ok(next.run(request).await)
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": state.config.app_name,
        "version": VERSION,
        "environment": state.config.environment,
        "status": "healthy",
    }))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let stats = tokio::task::spawn_blocking(move || store.stats())
        .await
        .map_err(|e| ApiError::Unavailable(format!("health check failed: {e}")))?
        .map_err(|e| {
            error!(error = %e, "Health check failed");
            ApiError::Unavailable("Service unhealthy".to_string())
        })?;

    Ok(Json(json!({
        "status": "healthy",
        "database": "connected",
        "stats": stats_json(&stats),
    })))
}

fn stats_json(stats: &music_rag_core::StoreStats) -> serde_json::Map<String, Value> {
    Modality::ALL
        .iter()
        .map(|m| {
            (
                format!("{}_embeddings_count", m),
                json!(stats.get(m).copied().unwrap_or(0)),
            )
        })
        .collect()
}

/// Search request: a retrieval query plus per-request stage switches.
/// Unset switches follow the server configuration.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(flatten)]
    pub query: RetrievalQuery,
    #[serde(default)]
    pub enhance: Option<bool>,
    #[serde(default)]
    pub explain: Option<bool>,
    #[serde(default)]
    pub rerank: Option<bool>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// One result row
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchResultRow {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub mood: Vec<String>,
    pub cultural_origin: Option<String>,
    pub tempo: Option<f32>,
    pub score: f32,
    pub retrieval_type: String,
    pub rerank_score: Option<f32>,
}

impl From<QueryResult> for SearchResultRow {
    fn from(result: QueryResult) -> Self {
        let item = result.music_item;
        Self {
            id: item.id,
            title: item.title,
            artist: item.artist,
            description: item.description,
            genre: item.metadata.genre,
            mood: item.metadata.mood,
            cultural_origin: item.metadata.cultural_origin,
            tempo: item.metadata.tempo,
            score: result.score,
            retrieval_type: result.retrieval_type.to_string(),
            rerank_score: result.rerank_score,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: usize,
    pub results: Vec<SearchResultRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<EnhancedQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<ResultExplanation>,
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    let SearchRequest {
        mut query,
        enhance,
        explain,
        rerank,
        session_id,
    } = request;
    query
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    info!(
        text = query.text_query().unwrap_or(""),
        audio = query.audio_path.is_some(),
        top_k = query.top_k,
        "Search request"
    );

    // Enhancement
    let original_text = query.text_query().map(str::to_string);
    let mut enhancement = None;
    if enhance.unwrap_or(state.config.enable_query_enhancement) {
        if let (Some(enhancer), Some(text)) = (state.enhancer.clone(), original_text.clone()) {
            let sessions = state.sessions.clone();
            let fallback_text = text.clone();
            let enhanced = optional_stage(
                "enhancement",
                state.llm_timeout(),
                move || match session_id {
                    Some(id) => ContextualEnhancer::new(enhancer, sessions).enhance(&id, &text),
                    None => enhance_or_fallback(enhancer.as_ref(), &text, None),
                },
                move || EnhancedQuery::fallback(&fallback_text),
            )
            .await;
            enhanced.apply_to(&mut query);
            enhancement = Some(enhanced);
        }
    }

    // Retrieval, with reranking when requested and available
    let use_rerank = rerank.unwrap_or(state.config.enable_reranking) && state.engine.has_reranker();
    let engine = state.engine.clone();
    let catalog = state.catalog.clone();
    let retrieval_query = query.clone();
    let results = blocking(move || {
        if use_rerank {
            engine.retrieve_with_rerank(&retrieval_query, catalog.as_ref())
        } else {
            engine.retrieve(&retrieval_query, catalog.as_ref())
        }
    })
    .await?;

    // Explanation
    let mut explanation = None;
    if explain.unwrap_or(state.config.enable_result_explanation) {
        if let (Some(explainer), Some(text)) = (state.explainer.clone(), original_text) {
            let for_stage = results.clone();
            let for_fallback = results.clone();
            let fallback_text = text.clone();
            explanation = Some(
                optional_stage(
                    "explanation",
                    state.llm_timeout(),
                    move || explain_or_fallback(explainer.as_ref(), &text, &for_stage),
                    move || ResultExplanation::fallback(&fallback_text, &for_fallback),
                )
                .await,
            );
        }
    }

    let rows: Vec<SearchResultRow> = results.into_iter().map(SearchResultRow::from).collect();
    info!(results = rows.len(), "Returning search results");
    Ok(Json(SearchResponse {
        total: rows.len(),
        results: rows,
        enhancement,
        explanation,
    }))
}

async fn index_item(State(state): State<AppState>, Json(item): Json<MusicItem>) -> ApiResult<Value> {
    info!(id = %item.id, title = %item.title, artist = %item.artist, "Index request");
    let indexer = state.indexer.clone();
    let indexed = blocking(move || {
        let indexed = indexer.index(item)?;
        indexer.flush()?;
        Ok(indexed)
    })
    .await?;

    Ok(Json(json!({
        "status": "success",
        "id": indexed.id,
        "message": format!("Indexed {} by {}", indexed.title, indexed.artist),
    })))
}

async fn index_batch(
    State(state): State<AppState>,
    Json(items): Json<Vec<MusicItem>>,
) -> ApiResult<Value> {
    info!(items = items.len(), "Batch index request");
    let indexer = state.indexer.clone();
    let count = blocking(move || {
        let indexed = indexer.index_batch(items)?;
        indexer.flush()?;
        Ok(indexed.len())
    })
    .await?;

    Ok(Json(json!({
        "status": "success",
        "count": count,
        "message": format!("Indexed {} music items", count),
    })))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Value> {
    let store = state.store.clone();
    let catalog = state.catalog.clone();
    let (stats, cached) = blocking(move || Ok((store.stats()?, catalog.count()?))).await?;

    let mut body = stats_json(&stats);
    body.insert("cached_items".to_string(), json!(cached));
    Ok(Json(Value::Object(body)))
}

async fn get_item(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<MusicItem> {
    let catalog = state.catalog.clone();
    let lookup_id = id.clone();
    let item = blocking(move || Ok(catalog.get_item(&lookup_id)?)).await?;
    item.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Item not found: {}", id)))
}

// ============================================================================
// TESTS
// ============================================================================
