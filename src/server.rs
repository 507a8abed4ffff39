//! HTTP server.
//!
//! A thin JSON wrapper over [`crate::pipeline`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/split` | Split text into chunks |
//! | `POST` | `/transform` | Split, transform and recombine text |
//! | `POST` | `/recombine` | Recombine a list of chunk results |
//! | `POST` | `/summarize` | Build and store a summary hierarchy |
//! | `GET`  | `/lineage/{id}` | A stored node with ancestors and children |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "budget must be > 0" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `llm_disabled` (400),
//! `internal` (500). Re-using a `run_id` in `/summarize` is a `bad_request`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use narrative_chunker_core::error::ChunkError;
use narrative_chunker_core::models::{Chunk, ChunkResult, RecombinedResult, TransformParams};
use narrative_chunker_core::provenance::ProvenanceStore;
use narrative_chunker_core::traits::{Embedder, Summarizer, Transformer};

use crate::cache::TransformCache;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::LlmClient;
use crate::migrate;
use crate::pipeline;
use crate::sqlite_store::SqliteProvenanceStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when `llm.provider = "disabled"`.
    pub transformer: Option<Arc<dyn Transformer>>,
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub store: Arc<dyn ProvenanceStore>,
    pub cache: Arc<TransformCache>,
}

impl AppState {
    /// State with providers built from `config`.
    pub fn from_config(config: Config, store: Arc<dyn ProvenanceStore>) -> anyhow::Result<Self> {
        let (transformer, summarizer) = if config.llm.is_enabled() {
            let llm = Arc::new(LlmClient::new(&config.llm)?);
            let transformer: Arc<dyn Transformer> = llm.clone();
            let summarizer: Arc<dyn Summarizer> = llm;
            (Some(transformer), Some(summarizer))
        } else {
            (None, None)
        };
        let embedder = match create_embedder(&config.embedding)? {
            Some(e) => Some(Arc::new(e) as Arc<dyn Embedder>),
            None => None,
        };
        let cache = Arc::new(TransformCache::new(config.processing.cache_capacity));

        Ok(Self {
            config: Arc::new(config),
            transformer,
            summarizer,
            embedder,
            store,
            cache,
        })
    }
}

/// Starts the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let store: Arc<dyn ProvenanceStore> = Arc::new(SqliteProvenanceStore::new(pool));
    let state = AppState::from_config(config.clone(), store)?;

    let app = build_router(state);

    println!("nchunk server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/split", post(handle_split))
        .route("/transform", post(handle_transform))
        .route("/recombine", post(handle_recombine))
        .route("/summarize", post(handle_summarize))
        .route("/lineage/{id}", get(handle_lineage))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn llm_disabled() -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "llm_disabled",
        message: "no LLM provider configured (llm.provider = \"disabled\")".to_string(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::warn!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

/// A reused run id is the caller's mistake; anything else is ours.
fn summarize_error(err: anyhow::Error) -> AppError {
    let duplicate = err
        .chain()
        .any(|e| matches!(e.downcast_ref::<ChunkError>(), Some(ChunkError::DuplicateId(_))));
    if duplicate {
        bad_request(format!("{:#}", err))
    } else {
        internal(err)
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /split ============

#[derive(Deserialize)]
struct SplitRequest {
    text: String,
    #[serde(default)]
    budget: Option<usize>,
    #[serde(default)]
    run_id: Option<String>,
}

#[derive(Serialize)]
struct SplitResponse {
    run_id: String,
    chunks: Vec<Chunk>,
}

async fn handle_split(
    State(state): State<AppState>,
    payload: Result<Json<SplitRequest>, JsonRejection>,
) -> Result<Json<SplitResponse>, AppError> {
    let req = body(payload)?;
    let budget = req
        .budget
        .unwrap_or(state.config.chunking.safe_token_budget);
    if budget == 0 {
        return Err(bad_request("budget must be > 0"));
    }
    let run_id = req.run_id.unwrap_or_else(pipeline::new_run_id);

    let chunks = pipeline::split_with_budget(&state.config, &run_id, &req.text, budget)
        .map_err(internal)?;

    Ok(Json(SplitResponse { run_id, chunks }))
}

// ============ POST /transform ============

#[derive(Deserialize)]
struct TransformRequest {
    text: String,
    #[serde(default)]
    persona: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    style: String,
}

async fn handle_transform(
    State(state): State<AppState>,
    payload: Result<Json<TransformRequest>, JsonRejection>,
) -> Result<Json<pipeline::TransformReport>, AppError> {
    let req = body(payload)?;
    let transformer = state.transformer.as_deref().ok_or_else(llm_disabled)?;
    let params = TransformParams::new(&req.persona, &req.namespace, &req.style);

    let report = pipeline::transform_text(
        &state.config,
        transformer,
        &req.text,
        &params,
        Some(state.cache.as_ref()),
    )
    .await
    .map_err(internal)?;

    Ok(Json(report))
}

// ============ POST /recombine ============

#[derive(Deserialize)]
struct RecombineRequest {
    results: Vec<ChunkResult>,
}

async fn handle_recombine(
    State(state): State<AppState>,
    payload: Result<Json<RecombineRequest>, JsonRejection>,
) -> Result<Json<RecombinedResult>, AppError> {
    let req = body(payload)?;
    let result = pipeline::recombine_results(&state.config, req.results)
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(result))
}

// ============ POST /summarize ============

#[derive(Deserialize)]
struct SummarizeRequest {
    text: String,
    #[serde(default)]
    run_id: Option<String>,
}

async fn handle_summarize(
    State(state): State<AppState>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<pipeline::SummaryReport>, AppError> {
    let req = body(payload)?;
    let summarizer = state.summarizer.as_deref().ok_or_else(llm_disabled)?;

    let report = pipeline::summarize_text(
        &state.config,
        summarizer,
        state.embedder.as_deref(),
        state.store.as_ref(),
        &req.text,
        req.run_id.as_deref(),
    )
    .await
    .map_err(summarize_error)?;

    Ok(Json(report))
}

// ============ GET /lineage/{id} ============

async fn handle_lineage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<pipeline::Lineage>, AppError> {
    let lineage = pipeline::lineage(state.store.as_ref(), &id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("no node with chunk id: {}", id)))?;
    Ok(Json(lineage))
}
